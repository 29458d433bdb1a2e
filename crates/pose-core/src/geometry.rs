//! Joint-angle computation over normalized 2-D landmarks.

use crate::landmarks::{Joint, LandmarkSet, Point2D};

/// Interior angle in degrees at vertex `b`, formed by rays `b→a` and `b→c`.
///
/// Computed from the difference of the two rays' polar angles, with reflex
/// angles folded back so the result is always in `[0, 180]`. Symmetric in
/// `a` and `c`. Callers must not pass `a == b` or `c == b`.
pub fn angle_at(a: Point2D, b: Point2D, c: Point2D) -> f32 {
    let radians = (c.y - b.y).atan2(c.x - b.x) - (a.y - b.y).atan2(a.x - b.x);
    let degrees = radians.to_degrees().abs();
    if degrees > 180.0 { 360.0 - degrees } else { degrees }
}

/// Shoulder angle relative to the torso line: the angle between the
/// shoulder→hip and shoulder→elbow segments.
///
/// 0° is an arm hanging at the side, 90° horizontal, 180° straight overhead.
pub fn shoulder_angle(shoulder: Point2D, elbow: Point2D, hip: Point2D) -> f32 {
    angle_at(hip, shoulder, elbow)
}

/// Elbow angle between the upper arm and the forearm.
pub fn elbow_angle(shoulder: Point2D, elbow: Point2D, wrist: Point2D) -> f32 {
    angle_at(shoulder, elbow, wrist)
}

/// The four published joint angles, in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JointAngles {
    pub left_shoulder: f32,
    pub right_shoulder: f32,
    pub left_elbow: f32,
    pub right_elbow: f32,
}

impl JointAngles {
    /// Measure all four angles from a detected landmark set.
    pub fn measure(set: &LandmarkSet) -> Self {
        Self {
            left_shoulder: shoulder_angle(
                set.get(Joint::LeftShoulder),
                set.get(Joint::LeftElbow),
                set.get(Joint::LeftHip),
            ),
            right_shoulder: shoulder_angle(
                set.get(Joint::RightShoulder),
                set.get(Joint::RightElbow),
                set.get(Joint::RightHip),
            ),
            left_elbow: elbow_angle(
                set.get(Joint::LeftShoulder),
                set.get(Joint::LeftElbow),
                set.get(Joint::LeftWrist),
            ),
            right_elbow: elbow_angle(
                set.get(Joint::RightShoulder),
                set.get(Joint::RightElbow),
                set.get(Joint::RightWrist),
            ),
        }
    }
}
