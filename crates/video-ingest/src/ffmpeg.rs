use std::{
    io::{self, Read},
    process::{Child, Command, Stdio},
    thread,
};

use anyhow::anyhow;
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::types::{CaptureError, Frame, FrameFormat};

/// Spawns an FFmpeg process decoding `uri` into raw BGR frames on stdout and
/// a background thread forwarding them over the returned [`Receiver`].
///
/// Frames are scaled to `target_size` (width, height) by the decoder. The
/// channel is intentionally small so a slow consumer backpressures the
/// decoder instead of accumulating stale frames.
pub fn spawn_ffmpeg_reader(
    uri: &str,
    target_size: (i32, i32),
) -> Result<Receiver<Result<Frame, CaptureError>>, CaptureError> {
    let (tx, rx) = bounded(2);
    let scale_arg = format!("scale={}:{}", target_size.0, target_size.1);

    let (is_v4l, ffmpeg_uri) = if let Some(index) = parse_device_index(uri) {
        (true, format!("/dev/video{index}"))
    } else if uri.starts_with("/dev/video") {
        (true, uri.to_string())
    } else {
        (false, uri.to_string())
    };

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner").arg("-loglevel").arg("error");
    if is_v4l {
        cmd.arg("-f").arg("video4linux2");
    } else {
        // Pace pre-recorded files at their native frame rate.
        cmd.arg("-re");
    }
    cmd.arg("-i")
        .arg(&ffmpeg_uri)
        .arg("-vf")
        .arg(&scale_arg)
        .arg("-pix_fmt")
        .arg("bgr24")
        .arg("-f")
        .arg("rawvideo")
        .arg("-")
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = cmd.spawn().map_err(|err| CaptureError::Other(err.into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CaptureError::Other(anyhow!("failed to capture ffmpeg stdout")))?;

    let uri = uri.to_string();
    thread::spawn(move || read_loop(stdout, child, uri, target_size, tx));

    Ok(rx)
}

/// Interpret `uri` as a local capture device index ("0" or "/dev/video0").
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    uri.strip_prefix("/dev/video")
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .and_then(|rest| rest.parse::<i32>().ok())
}

fn read_loop(
    mut stdout: impl Read,
    mut child: Child,
    uri: String,
    target_size: (i32, i32),
    tx: Sender<Result<Frame, CaptureError>>,
) {
    let frame_bytes = (target_size.0.max(0) as usize)
        * (target_size.1.max(0) as usize)
        * FrameFormat::Bgr8.bytes_per_pixel();
    let mut buffer = vec![0u8; frame_bytes];

    loop {
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                let frame = Frame {
                    data: buffer.clone(),
                    width: target_size.0,
                    height: target_size.1,
                    timestamp_ms: Utc::now().timestamp_millis(),
                    format: FrameFormat::Bgr8,
                };
                if tx.send(Ok(frame)).is_err() {
                    break;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                let _ = tx.send(Err(CaptureError::Eof { uri }));
                break;
            }
            Err(err) => {
                let _ = tx.send(Err(CaptureError::Other(err.into())));
                break;
            }
        }
    }

    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_indices_parse() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("clip.mp4"), None);
        assert_eq!(parse_device_index("rtsp://host/stream"), None);
    }
}
