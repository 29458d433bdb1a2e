//! Skeleton and label overlay drawing for the producer loop.

use anyhow::{Result, anyhow};
use image::{ImageBuffer, Rgb};
use pose_core::{Joint, JointAngles, LandmarkSet};
use video_ingest::Frame;

use crate::data::AnnotatedFrame;

/// Overlay inputs for a cycle that produced a detection.
pub(crate) struct PoseOverlay<'a> {
    pub(crate) landmarks: &'a LandmarkSet,
    pub(crate) angles: &'a JointAngles,
}

/// Upper-body bone segments drawn between the tracked joints.
const SKELETON_SEGMENTS: [(Joint, Joint); 8] = [
    (Joint::LeftShoulder, Joint::RightShoulder),
    (Joint::LeftShoulder, Joint::LeftElbow),
    (Joint::LeftElbow, Joint::LeftWrist),
    (Joint::RightShoulder, Joint::RightElbow),
    (Joint::RightElbow, Joint::RightWrist),
    (Joint::LeftShoulder, Joint::LeftHip),
    (Joint::RightShoulder, Joint::RightHip),
    (Joint::LeftHip, Joint::RightHip),
];

const BONE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const JOINT_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BACKING_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

type Canvas = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Copy the captured frame and draw the skeleton, angle labels, and the
/// frame/fps info line. Without an overlay the pixels pass through untouched
/// apart from the info line.
pub(crate) fn annotate_frame(
    frame: &Frame,
    frame_number: u64,
    fps: f32,
    overlay: Option<PoseOverlay<'_>>,
) -> Result<AnnotatedFrame> {
    let width = frame.width.max(0) as u32;
    let height = frame.height.max(0) as u32;
    let rgb = bgr_to_rgb(&frame.data);
    let mut image = Canvas::from_vec(width, height, rgb)
        .ok_or_else(|| anyhow!("frame buffer does not match {width}x{height} bgr8"))?;

    if let Some(overlay) = overlay {
        for (from, to) in SKELETON_SEGMENTS {
            let (x0, y0) = overlay.landmarks.get(from).to_pixel(width, height);
            let (x1, y1) = overlay.landmarks.get(to).to_pixel(width, height);
            draw_segment(&mut image, x0, y0, x1, y1, BONE_COLOR);
        }
        for joint in Joint::ALL {
            let (x, y) = overlay.landmarks.get(joint).to_pixel(width, height);
            fill_rect(&mut image, x - 1, y - 1, x + 1, y + 1, JOINT_COLOR);
        }

        let labels = [
            (Joint::LeftShoulder, "L SHOULDER", overlay.angles.left_shoulder),
            (Joint::RightShoulder, "R SHOULDER", overlay.angles.right_shoulder),
            (Joint::LeftElbow, "L ELBOW", overlay.angles.left_elbow),
            (Joint::RightElbow, "R ELBOW", overlay.angles.right_elbow),
        ];
        for (joint, name, degrees) in labels {
            let (x, y) = overlay.landmarks.get(joint).to_pixel(width, height);
            draw_angle_label(&mut image, x, y, name, degrees);
        }
    }

    let info = format!("FRAME {:06}  FPS {:4.1}", frame_number, fps);
    let info_width = (info.chars().count() as i32 * 6).min(width as i32);
    let info_x = (width as i32 - info_width - 4).max(0);
    let info_y = (height as i32 - 12).max(0);
    fill_rect(
        &mut image,
        info_x,
        info_y,
        info_x + info_width + 4,
        info_y + 8,
        BACKING_COLOR,
    );
    draw_label(&mut image, info_x + 2, info_y, &info, LABEL_COLOR);

    Ok(AnnotatedFrame {
        rgb: image.into_raw(),
        width,
        height,
        frame_number,
    })
}

fn bgr_to_rgb(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
    }
    output
}

fn draw_angle_label(image: &mut Canvas, x: i32, y: i32, name: &str, degrees: f32) {
    let text = format!("{} {:.0}", name, degrees);
    let label_y = (y - 12).max(0);
    let text_width = text.chars().count() as i32 * 6;
    fill_rect(image, x, label_y, x + text_width, label_y + 8, BACKING_COLOR);
    draw_label(image, x + 1, label_y, &text, LABEL_COLOR);
}

/// Bresenham segment clipped to the image bounds.
fn draw_segment(image: &mut Canvas, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let (mut x, mut y) = (x0, y0);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x >= 0 && x < width && y >= 0 && y < height {
            *image.get_pixel_mut(x as u32, y as u32) = color;
        }
        if x == x1 && y == y1 {
            break;
        }
        let doubled = 2 * err;
        if doubled >= dy {
            err += dy;
            x += sx;
        }
        if doubled <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn fill_rect(image: &mut Canvas, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width <= 0 || height <= 0 {
        return;
    }
    let left = left.clamp(0, width - 1);
    let right = right.clamp(0, width - 1);
    let top = top.clamp(0, height - 1);
    let bottom = bottom.clamp(0, height - 1);

    for y in top..=bottom {
        for x in left..=right {
            *image.get_pixel_mut(x as u32, y as u32) = color;
        }
    }
}

fn draw_label(image: &mut Canvas, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = x + col as i32;
                        if px >= 0 && px < width {
                            *image.get_pixel_mut(px as u32, py as u32) = color;
                        }
                    }
                }
            }
        }
        x += 6;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'A' => Some([
            0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'B' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110,
        ]),
        'D' => Some([
            0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110,
        ]),
        'E' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'F' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000,
        ]),
        'H' => Some([
            0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'L' => Some([
            0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'M' => Some([
            0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001,
        ]),
        'O' => Some([
            0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'P' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000,
        ]),
        'R' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001,
        ]),
        'S' => Some([
            0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        'U' => Some([
            0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'W' => Some([
            0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010,
        ]),
        '0' => Some([
            0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110,
        ]),
        '1' => Some([
            0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        '2' => Some([
            0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111,
        ]),
        '3' => Some([
            0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110,
        ]),
        '4' => Some([
            0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010,
        ]),
        '5' => Some([
            0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        '6' => Some([
            0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110,
        ]),
        '7' => Some([
            0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000,
        ]),
        '8' => Some([
            0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110,
        ]),
        '9' => Some([
            0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100,
        ]),
        '.' => Some([0, 0, 0, 0, 0, 0b00110, 0b00110]),
        ' ' => Some([0, 0, 0, 0, 0, 0, 0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pose_core::Point2D;
    use video_ingest::FrameFormat;

    use super::*;

    fn test_frame(width: i32, height: i32) -> Frame {
        Frame {
            data: vec![96; (width * height * 3) as usize],
            width,
            height,
            timestamp_ms: 0,
            format: FrameFormat::Bgr8,
        }
    }

    fn centered_landmarks() -> LandmarkSet {
        let mut set = LandmarkSet::default();
        set.set(Joint::LeftShoulder, Point2D::new(0.6, 0.3));
        set.set(Joint::RightShoulder, Point2D::new(0.4, 0.3));
        set.set(Joint::LeftElbow, Point2D::new(0.7, 0.45));
        set.set(Joint::RightElbow, Point2D::new(0.3, 0.45));
        set.set(Joint::LeftWrist, Point2D::new(0.75, 0.6));
        set.set(Joint::RightWrist, Point2D::new(0.25, 0.6));
        set.set(Joint::LeftHip, Point2D::new(0.55, 0.65));
        set.set(Joint::RightHip, Point2D::new(0.45, 0.65));
        set
    }

    #[test]
    fn passthrough_keeps_dimensions() {
        let frame = test_frame(64, 48);
        let annotated = annotate_frame(&frame, 1, 0.0, None).unwrap();
        assert_eq!((annotated.width, annotated.height), (64, 48));
        assert_eq!(annotated.rgb.len(), 64 * 48 * 3);
        assert_eq!(annotated.frame_number, 1);
    }

    #[test]
    fn overlay_marks_the_skeleton() {
        let frame = test_frame(128, 96);
        let landmarks = centered_landmarks();
        let angles = JointAngles::measure(&landmarks);

        let plain = annotate_frame(&frame, 1, 30.0, None).unwrap();
        let overlaid = annotate_frame(
            &frame,
            1,
            30.0,
            Some(PoseOverlay {
                landmarks: &landmarks,
                angles: &angles,
            }),
        )
        .unwrap();
        assert_ne!(plain.rgb, overlaid.rgb);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let mut frame = test_frame(64, 48);
        frame.data.truncate(10);
        assert!(annotate_frame(&frame, 1, 0.0, None).is_err());
    }

    #[test]
    fn conversion_swaps_blue_and_red() {
        // The info line only touches the bottom rows; probe the top one.
        let mut frame = test_frame(2, 16);
        frame.data[0..6].copy_from_slice(&[255, 0, 0, 0, 0, 255]);
        let annotated = annotate_frame(&frame, 1, 0.0, None).unwrap();
        assert_eq!(&annotated.rgb[0..3], &[0, 0, 255]);
        assert_eq!(&annotated.rgb[3..6], &[255, 0, 0]);
    }
}
