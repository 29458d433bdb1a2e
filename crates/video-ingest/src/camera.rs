//! OpenCV-backed device capture, built with the `with-opencv` feature.

use std::thread;

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded};
use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};

use crate::{
    ffmpeg::parse_device_index,
    types::{CaptureError, Frame, FrameFormat},
};

/// Spawns a background thread that continually reads frames from `uri` via
/// OpenCV, resizing them to `target_size` before forwarding.
pub fn spawn_camera_reader(
    uri: &str,
    target_size: (i32, i32),
) -> Result<Receiver<Result<Frame, CaptureError>>, CaptureError> {
    let (tx, rx) = bounded(2);
    let uri = uri.to_string();

    thread::spawn(move || {
        if let Err(err) = capture_loop(&uri, target_size, tx.clone()) {
            let _ = tx.send(Err(err));
        }
    });

    Ok(rx)
}

fn capture_loop(
    uri: &str,
    target_size: (i32, i32),
    tx: Sender<Result<Frame, CaptureError>>,
) -> Result<(), CaptureError> {
    let mut cap = open_capture(uri)?;
    let (target_w, target_h) = target_size;

    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, target_w as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, target_h as f64);

    let mut raw = Mat::default();
    let mut scratch = Mat::default();

    loop {
        cap.read(&mut raw)
            .map_err(|e| CaptureError::Other(e.into()))?;

        let size = raw.size().map_err(|e| CaptureError::Other(e.into()))?;
        // An empty read is retried straight away.
        if size.width <= 0 {
            continue;
        }

        let working = if size.width != target_w || size.height != target_h {
            opencv::imgproc::resize(
                &raw,
                &mut scratch,
                core::Size {
                    width: target_w,
                    height: target_h,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            &scratch
        } else {
            &raw
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        let frame = Frame {
            data,
            width: target_w,
            height: target_h,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        };
        if tx.send(Ok(frame)).is_err() {
            break;
        }
    }

    Ok(())
}

fn open_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            if let Ok(cap) = VideoCapture::new(index, backend) {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
        }
    } else if let Ok(cap) = VideoCapture::from_file(uri, videoio::CAP_ANY) {
        if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
            return Ok(cap);
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}
