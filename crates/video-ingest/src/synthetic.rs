//! Deterministic frame source for demos and tests.

use std::{thread, time::Duration};

use chrono::Utc;
use crossbeam_channel::{Receiver, bounded};

use crate::types::{CaptureError, Frame, FrameFormat};

/// Spawns a generator producing a moving-gradient test pattern at `fps`.
///
/// The generator stops as soon as the receiving side is dropped.
pub fn spawn_synthetic_reader(
    target_size: (i32, i32),
    fps: u32,
) -> Result<Receiver<Result<Frame, CaptureError>>, CaptureError> {
    let (tx, rx) = bounded(2);
    let (width, height) = target_size;
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);

    thread::spawn(move || {
        let mut tick: u64 = 0;
        loop {
            let frame = Frame {
                data: test_pattern(width, height, tick),
                width,
                height,
                timestamp_ms: Utc::now().timestamp_millis(),
                format: FrameFormat::Bgr8,
            };
            if tx.send(Ok(frame)).is_err() {
                break;
            }
            tick = tick.wrapping_add(1);
            thread::sleep(period);
        }
    });

    Ok(rx)
}

fn test_pattern(width: i32, height: i32, tick: u64) -> Vec<u8> {
    let w = width.max(0) as usize;
    let h = height.max(0) as usize;
    let mut data = vec![0u8; w * h * 3];
    let band = if w > 0 { (tick as usize * 4) % w } else { 0 };
    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) * 3;
            data[i] = (x * 255 / w.max(1)) as u8;
            data[i + 1] = (y * 255 / h.max(1)) as u8;
            data[i + 2] = if x.abs_diff(band) < 8 { 255 } else { 32 };
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_reader_yields_complete_frames() {
        let rx = spawn_synthetic_reader((32, 24), 120).unwrap();
        let first = rx.recv().unwrap().unwrap();
        assert_eq!((first.width, first.height), (32, 24));
        assert!(first.is_complete());

        let second = rx.recv().unwrap().unwrap();
        assert!(second.timestamp_ms >= first.timestamp_ms);
        assert_ne!(first.data, second.data, "pattern must move between frames");
    }
}
