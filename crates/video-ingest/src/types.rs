use thiserror::Error;

/// Raw pixel frame captured from a video source.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

impl Frame {
    /// Buffer length implied by the frame's dimensions and format.
    pub fn expected_len(&self) -> usize {
        (self.width.max(0) as usize)
            * (self.height.max(0) as usize)
            * self.format.bytes_per_pixel()
    }

    /// Whether the pixel buffer matches the declared dimensions.
    pub fn is_complete(&self) -> bool {
        self.data.len() == self.expected_len()
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source {uri:?} ended")]
    Eof { uri: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_completeness_tracks_dimensions() {
        let frame = Frame {
            data: vec![0; 4 * 2 * 3],
            width: 4,
            height: 2,
            timestamp_ms: 0,
            format: FrameFormat::Bgr8,
        };
        assert!(frame.is_complete());

        let short = Frame { data: vec![0; 5], ..frame };
        assert!(!short.is_complete());
    }
}
