//! JPEG encoding and multipart framing for the streaming read path.
//!
//! Unlike a pre-encoded pipeline, encoding happens per client tick: the
//! published state holds raw annotated pixels and each stream session
//! compresses the copy it pulled. A failed encode skips that tick only.

use anyhow::{Result, anyhow};
use image::{ExtendedColorType, ImageEncoder, codecs::jpeg::JpegEncoder};

use crate::data::AnnotatedFrame;

/// Content type of the unbounded multipart stream.
pub(crate) const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Encode the annotated frame as JPEG at the given quality.
pub(crate) fn encode_jpeg(frame: &AnnotatedFrame, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .write_image(
            &frame.rgb,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|err| anyhow!("JPEG encode failed for frame #{}: {err}", frame.frame_number))?;
    Ok(buffer)
}

/// Wrap encoded bytes as one part of the multipart stream: boundary marker,
/// part header, blank line, payload, trailing CRLF.
pub(crate) fn mjpeg_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(b"--frame\r\n");
    part.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame() -> AnnotatedFrame {
        AnnotatedFrame {
            rgb: vec![200; 16 * 12 * 3],
            width: 16,
            height: 12,
            frame_number: 3,
        }
    }

    #[test]
    fn encode_produces_a_jpeg_payload() {
        let jpeg = encode_jpeg(&solid_frame(), 85).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8], "missing SOI marker");
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9], "missing EOI marker");
    }

    #[test]
    fn encode_rejects_mismatched_buffers() {
        let mut frame = solid_frame();
        frame.rgb.truncate(7);
        assert!(encode_jpeg(&frame, 85).is_err());
    }

    #[test]
    fn parts_are_framed_for_mixed_replace() {
        let part = mjpeg_part(b"jpegdata");
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(part.ends_with(b"jpegdata\r\n"));
    }
}
