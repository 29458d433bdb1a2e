//! CLI parsing into the canonical runtime configuration.

use anyhow::{Result, bail};
use clap::Parser;
use video_ingest::SourceKind;

/// CLI arguments accepted by the `posewatch` binary.
#[derive(Debug, Parser)]
#[command(name = "posewatch", about = "Pose angle capture and MJPEG preview server")]
pub(crate) struct AppArgs {
    /// Video source: device index, /dev/video* path, file/URL, or "synthetic".
    #[arg(value_name = "SOURCE")]
    pub(crate) source: Option<String>,
    /// Video source flag (overrides positional).
    #[arg(long = "source", value_name = "URI")]
    pub(crate) source_flag: Option<String>,
    /// Capture width in pixels.
    #[arg(long, value_name = "PX", default_value_t = 640)]
    pub(crate) width: i32,
    /// Capture height in pixels.
    #[arg(long, value_name = "PX", default_value_t = 480)]
    pub(crate) height: i32,
    /// HTTP listen port.
    #[arg(long, value_name = "PORT", default_value_t = 5000)]
    pub(crate) port: u16,
    /// JPEG quality used by the stream encoder (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = 85)]
    pub(crate) jpeg_quality: i32,
    /// Pose worker command (e.g. "python3 scripts/pose_worker.py"), or "none"
    /// to serve frames without detection.
    #[arg(long = "estimator", value_name = "CMD", default_value = "none")]
    pub(crate) estimator: String,
    /// Frame rate of the synthetic test-pattern source.
    #[arg(long = "synthetic-fps", value_name = "FPS", default_value_t = 30)]
    pub(crate) synthetic_fps: u32,
    /// Emit verbose logging (per-cycle detection results).
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub(crate) verbose: bool,
}

/// How pose landmarks are produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum EstimatorKind {
    /// No estimator configured; every cycle reports "no detection".
    Disabled,
    /// External worker process speaking the stdin/stdout bridge protocol.
    Worker(String),
}

impl EstimatorKind {
    fn from_spec(spec: &str) -> Self {
        let trimmed = spec.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            EstimatorKind::Disabled
        } else {
            EstimatorKind::Worker(trimmed.to_string())
        }
    }
}

/// Canonical configuration shared by every stage.
#[derive(Clone, Debug)]
pub(crate) struct AppConfig {
    pub(crate) source: String,
    pub(crate) source_kind: SourceKind,
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) port: u16,
    pub(crate) jpeg_quality: u8,
    pub(crate) estimator: EstimatorKind,
    pub(crate) synthetic_fps: u32,
    pub(crate) verbose: bool,
}

impl TryFrom<AppArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: AppArgs) -> Result<Self> {
        let source = args
            .source_flag
            .or(args.source)
            .unwrap_or_else(|| "0".to_string());

        if args.width <= 0 || args.height <= 0 {
            bail!("Capture width and height must be positive integers");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        if args.synthetic_fps == 0 {
            bail!("--synthetic-fps must be at least 1");
        }

        let source_kind = SourceKind::from_uri(&source);

        Ok(Self {
            source,
            source_kind,
            width: args.width,
            height: args.height,
            port: args.port,
            jpeg_quality: args.jpeg_quality as u8,
            estimator: EstimatorKind::from_spec(&args.estimator),
            synthetic_fps: args.synthetic_fps,
            verbose: args.verbose,
        })
    }
}
