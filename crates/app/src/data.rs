//! Shared structs passed between the producer loop and the HTTP read paths.

use std::sync::{Arc, Mutex};

use pose_core::JointAngles;
use serde::Serialize;
use tokio::sync::watch;

/// Placeholder hand classification. No classifier is implemented; the
/// published value is constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub(crate) enum HandShape {
    #[serde(rename = "open")]
    Open,
}

/// Placeholder foot state, constant like [`HandShape`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub(crate) enum FootState {
    M,
}

/// Joint angles and placeholder classifications for one measurement cycle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PoseReport {
    pub(crate) left_shoulder_angle: f32,
    pub(crate) right_shoulder_angle: f32,
    pub(crate) left_elbow_angle: f32,
    pub(crate) right_elbow_angle: f32,
    pub(crate) left_hand_shape: HandShape,
    pub(crate) right_hand_shape: HandShape,
    pub(crate) left_foot: FootState,
    pub(crate) right_foot: FootState,
}

impl Default for PoseReport {
    fn default() -> Self {
        Self {
            left_shoulder_angle: 0.0,
            right_shoulder_angle: 0.0,
            left_elbow_angle: 180.0,
            right_elbow_angle: 180.0,
            left_hand_shape: HandShape::Open,
            right_hand_shape: HandShape::Open,
            left_foot: FootState::M,
            right_foot: FootState::M,
        }
    }
}

/// The complete, atomically replaced record of the most recent measurement.
/// `time` counts seconds since the pipeline started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub(crate) struct PoseSnapshot {
    pub(crate) time: f64,
    pub(crate) pose: PoseReport,
}

impl PoseSnapshot {
    pub(crate) fn new(time: f64, angles: JointAngles) -> Self {
        Self {
            time,
            pose: PoseReport {
                left_shoulder_angle: round2(angles.left_shoulder),
                right_shoulder_angle: round2(angles.right_shoulder),
                left_elbow_angle: round2(angles.left_elbow),
                right_elbow_angle: round2(angles.right_elbow),
                ..PoseReport::default()
            },
        }
    }
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Annotated pixels from the most recently completed cycle.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AnnotatedFrame {
    pub(crate) rgb: Vec<u8>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) frame_number: u64,
}

/// Latest-wins slot shared by the producer loop and every reader.
///
/// Both published fields are replaced under one lock so readers never observe
/// a torn update. The watch channel carries only a sequence number; it exists
/// to wake streaming clients without busy-polling.
pub(crate) struct PublishedState {
    inner: Mutex<Published>,
    publish_seq: watch::Sender<u64>,
}

#[derive(Default)]
struct Published {
    snapshot: PoseSnapshot,
    frame: Option<Arc<AnnotatedFrame>>,
}

impl PublishedState {
    pub(crate) fn new() -> Self {
        let (publish_seq, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Published::default()),
            publish_seq,
        }
    }

    /// Replace the published frame — and the snapshot, when this cycle
    /// produced a new measurement — then wake streaming clients.
    pub(crate) fn publish(&self, frame: AnnotatedFrame, snapshot: Option<PoseSnapshot>) {
        let seq = frame.frame_number;
        if let Ok(mut guard) = self.inner.lock() {
            guard.frame = Some(Arc::new(frame));
            if let Some(snapshot) = snapshot {
                guard.snapshot = snapshot;
            }
        }
        self.publish_seq.send_replace(seq);
    }

    pub(crate) fn snapshot(&self) -> PoseSnapshot {
        match self.inner.lock() {
            Ok(guard) => guard.snapshot,
            Err(_) => PoseSnapshot::default(),
        }
    }

    pub(crate) fn latest_frame(&self) -> Option<Arc<AnnotatedFrame>> {
        match self.inner.lock() {
            Ok(guard) => guard.frame.clone(),
            Err(_) => None,
        }
    }

    /// Subscribe to publish wake-ups. The observed value is a sequence number
    /// with no payload guarantee beyond "something changed".
    pub(crate) fn watch_publishes(&self) -> watch::Receiver<u64> {
        self.publish_seq.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn tiny_frame(frame_number: u64) -> AnnotatedFrame {
        AnnotatedFrame {
            rgb: vec![0; 2 * 2 * 3],
            width: 2,
            height: 2,
            frame_number,
        }
    }

    fn uniform_snapshot(k: f32) -> PoseSnapshot {
        PoseSnapshot::new(
            k as f64,
            JointAngles {
                left_shoulder: k,
                right_shoulder: k,
                left_elbow: k,
                right_elbow: k,
            },
        )
    }

    #[test]
    fn pose_json_matches_the_wire_schema() {
        let value = serde_json::to_value(PoseSnapshot::default()).unwrap();
        assert!(value.get("time").unwrap().is_number());
        let pose = value.get("pose").unwrap();
        for key in [
            "leftShoulderAngle",
            "rightShoulderAngle",
            "leftElbowAngle",
            "rightElbowAngle",
        ] {
            assert!(pose.get(key).unwrap().is_number(), "missing {key}");
        }
        assert_eq!(pose.get("leftHandShape").unwrap(), "open");
        assert_eq!(pose.get("rightHandShape").unwrap(), "open");
        assert_eq!(pose.get("leftFoot").unwrap(), "M");
        assert_eq!(pose.get("rightFoot").unwrap(), "M");
    }

    #[test]
    fn snapshot_angles_are_rounded_to_centidegrees() {
        let snapshot = PoseSnapshot::new(
            1.0,
            JointAngles {
                left_shoulder: 45.6789,
                right_shoulder: 0.004,
                left_elbow: 179.999,
                right_elbow: 90.0,
            },
        );
        assert_eq!(snapshot.pose.left_shoulder_angle, 45.68);
        assert_eq!(snapshot.pose.right_shoulder_angle, 0.0);
        assert_eq!(snapshot.pose.left_elbow_angle, 180.0);
        assert_eq!(snapshot.pose.right_elbow_angle, 90.0);
    }

    #[test]
    fn publish_without_snapshot_keeps_the_previous_measurement() {
        let state = PublishedState::new();
        let measured = uniform_snapshot(42.0);
        state.publish(tiny_frame(1), Some(measured));
        state.publish(tiny_frame(2), None);

        assert_eq!(state.snapshot(), measured);
        assert_eq!(state.latest_frame().unwrap().frame_number, 2);
    }

    #[test]
    fn publish_wakes_watchers() {
        let state = PublishedState::new();
        let mut watcher = state.watch_publishes();
        assert!(!watcher.has_changed().unwrap());

        state.publish(tiny_frame(7), None);
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), 7);
    }

    #[test]
    fn readers_never_observe_torn_snapshots() {
        let state = Arc::new(PublishedState::new());

        let writer = {
            let state = state.clone();
            thread::spawn(move || {
                for k in 1..=500 {
                    state.publish(tiny_frame(k as u64), Some(uniform_snapshot(k as f32)));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        let snap = state.snapshot();
                        if snap == PoseSnapshot::default() {
                            continue;
                        }
                        let k = snap.pose.left_shoulder_angle;
                        assert_eq!(snap.pose.right_shoulder_angle, k);
                        assert_eq!(snap.pose.left_elbow_angle, k);
                        assert_eq!(snap.pose.right_elbow_angle, k);
                        assert_eq!(snap.time, k as f64);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
