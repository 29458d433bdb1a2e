//! The pose-estimation boundary.
//!
//! The model itself is an external collaborator: an estimator takes a raw BGR
//! frame and either returns the eight tracked landmarks or reports that
//! nothing was detected. [`SubprocessEstimator`] speaks a line-delimited JSON
//! protocol to a worker process (see `scripts/pose_worker.py`), so this crate
//! never links a model runtime.

use std::{
    io::{BufRead, BufReader, Write},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::landmarks::{Joint, LandmarkSet, Point2D};

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("failed to launch pose worker {command:?}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("pose worker closed its pipes")]
    WorkerGone,
    #[error("frame buffer is {got} bytes, expected {expected} for {width}x{height} bgr8")]
    BadFrame {
        got: usize,
        expected: usize,
        width: i32,
        height: i32,
    },
    #[error("pose worker i/o failed")]
    Io(#[from] std::io::Error),
    #[error("pose worker sent malformed landmarks")]
    Decode(#[from] serde_json::Error),
}

/// Maps a frame to a set of named landmarks, or to "no detection".
pub trait PoseEstimator: Send {
    fn estimate(
        &mut self,
        bgr: &[u8],
        width: i32,
        height: i32,
    ) -> Result<Option<LandmarkSet>, EstimatorError>;
}

/// Estimator that never detects anything. Keeps the pipeline runnable when no
/// worker command is configured.
#[derive(Debug, Default)]
pub struct NullEstimator;

impl PoseEstimator for NullEstimator {
    fn estimate(
        &mut self,
        _bgr: &[u8],
        _width: i32,
        _height: i32,
    ) -> Result<Option<LandmarkSet>, EstimatorError> {
        Ok(None)
    }
}

/// Replays a fixed sequence of results; the final entry repeats once the
/// script is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedEstimator {
    script: Vec<Option<LandmarkSet>>,
    cursor: usize,
}

impl ScriptedEstimator {
    pub fn new(script: Vec<Option<LandmarkSet>>) -> Self {
        Self { script, cursor: 0 }
    }
}

impl PoseEstimator for ScriptedEstimator {
    fn estimate(
        &mut self,
        _bgr: &[u8],
        _width: i32,
        _height: i32,
    ) -> Result<Option<LandmarkSet>, EstimatorError> {
        let result = self
            .script
            .get(self.cursor)
            .or_else(|| self.script.last())
            .copied()
            .flatten();
        if self.cursor < self.script.len() {
            self.cursor += 1;
        }
        Ok(result)
    }
}

/// Header line written to the worker before each raw frame.
#[derive(Serialize)]
struct FrameHeader {
    width: i32,
    height: i32,
    format: &'static str,
    len: usize,
}

/// One reply line from the worker.
#[derive(Deserialize)]
struct WorkerReply {
    landmarks: Option<WireLandmarks>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLandmarks {
    left_shoulder: [f32; 2],
    right_shoulder: [f32; 2],
    left_elbow: [f32; 2],
    right_elbow: [f32; 2],
    left_wrist: [f32; 2],
    right_wrist: [f32; 2],
    left_hip: [f32; 2],
    right_hip: [f32; 2],
}

impl From<WireLandmarks> for LandmarkSet {
    fn from(wire: WireLandmarks) -> Self {
        let pairs = [
            (Joint::LeftShoulder, wire.left_shoulder),
            (Joint::RightShoulder, wire.right_shoulder),
            (Joint::LeftElbow, wire.left_elbow),
            (Joint::RightElbow, wire.right_elbow),
            (Joint::LeftWrist, wire.left_wrist),
            (Joint::RightWrist, wire.right_wrist),
            (Joint::LeftHip, wire.left_hip),
            (Joint::RightHip, wire.right_hip),
        ];
        let mut set = LandmarkSet::default();
        for (joint, [x, y]) in pairs {
            set.set(joint, Point2D::new(x, y));
        }
        set
    }
}

/// Bridges to an external worker process over stdin/stdout.
///
/// Per frame: one JSON header line plus the raw pixel buffer out, one JSON
/// landmark line back. The worker is killed when the estimator is dropped.
pub struct SubprocessEstimator {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    line: String,
}

impl SubprocessEstimator {
    /// Launch `command` (split on whitespace) with piped stdio.
    pub fn launch(command: &str) -> Result<Self, EstimatorError> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| EstimatorError::Launch {
            command: command.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;
        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| EstimatorError::Launch {
                command: command.to_string(),
                source,
            })?;
        let stdin = child.stdin.take().ok_or(EstimatorError::WorkerGone)?;
        let stdout = child.stdout.take().ok_or(EstimatorError::WorkerGone)?;
        debug!("pose worker started: {command}");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            line: String::new(),
        })
    }
}

impl PoseEstimator for SubprocessEstimator {
    fn estimate(
        &mut self,
        bgr: &[u8],
        width: i32,
        height: i32,
    ) -> Result<Option<LandmarkSet>, EstimatorError> {
        let expected = (width.max(0) as usize) * (height.max(0) as usize) * 3;
        if bgr.len() != expected {
            return Err(EstimatorError::BadFrame {
                got: bgr.len(),
                expected,
                width,
                height,
            });
        }

        let header = serde_json::to_string(&FrameHeader {
            width,
            height,
            format: "bgr8",
            len: bgr.len(),
        })?;
        self.stdin.write_all(header.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.write_all(bgr)?;
        self.stdin.flush()?;

        self.line.clear();
        if self.stdout.read_line(&mut self.line)? == 0 {
            return Err(EstimatorError::WorkerGone);
        }
        let reply: WorkerReply = serde_json::from_str(self.line.trim())?;
        Ok(reply.landmarks.map(LandmarkSet::from))
    }
}

impl Drop for SubprocessEstimator {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_estimator_replays_then_repeats_the_tail() {
        let detected = LandmarkSet::default();
        let mut estimator = ScriptedEstimator::new(vec![Some(detected), None]);
        assert!(estimator.estimate(&[], 0, 0).unwrap().is_some());
        assert!(estimator.estimate(&[], 0, 0).unwrap().is_none());
        // Exhausted scripts keep returning the last entry.
        assert!(estimator.estimate(&[], 0, 0).unwrap().is_none());
    }

    #[test]
    fn worker_reply_parses_named_landmarks() {
        let json = r#"{"landmarks":{
            "leftShoulder":[0.4,0.3],"rightShoulder":[0.6,0.3],
            "leftElbow":[0.35,0.45],"rightElbow":[0.65,0.45],
            "leftWrist":[0.3,0.6],"rightWrist":[0.7,0.6],
            "leftHip":[0.45,0.62],"rightHip":[0.55,0.62]}}"#;
        let reply: WorkerReply = serde_json::from_str(json).unwrap();
        let set = LandmarkSet::from(reply.landmarks.unwrap());
        assert_eq!(set.get(Joint::LeftShoulder), Point2D::new(0.4, 0.3));
        assert_eq!(set.get(Joint::RightHip), Point2D::new(0.55, 0.62));
    }

    #[test]
    fn worker_reply_parses_no_detection() {
        let reply: WorkerReply = serde_json::from_str(r#"{"landmarks":null}"#).unwrap();
        assert!(reply.landmarks.is_none());
    }

    #[test]
    fn subprocess_estimator_rejects_truncated_frames() {
        // `cat` never gets to reply; the size check fires first.
        let mut estimator = SubprocessEstimator::launch("cat").unwrap();
        let err = estimator.estimate(&[0u8; 5], 2, 2).unwrap_err();
        assert!(matches!(err, EstimatorError::BadFrame { expected: 12, .. }));
    }
}
