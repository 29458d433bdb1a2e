//! Landmark types, joint-angle geometry, and the pose-estimator boundary
//! shared by the capture pipeline.

pub mod estimator;
pub mod geometry;
pub mod landmarks;

pub use estimator::{
    EstimatorError, NullEstimator, PoseEstimator, ScriptedEstimator, SubprocessEstimator,
};
pub use geometry::{JointAngles, angle_at, elbow_angle, shoulder_angle};
pub use landmarks::{Joint, LandmarkSet, Point2D};
