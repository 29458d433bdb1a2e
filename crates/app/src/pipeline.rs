//! Producer pipeline: capture → estimate → measure → annotate → publish.
//!
//! The loop owns the capture receiver and the estimator exclusively; every
//! other component observes it only through [`PublishedState`].

use std::{
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use pose_core::{JointAngles, NullEstimator, PoseEstimator, SubprocessEstimator};
use tracing::{debug, error, info, warn};
use video_ingest::{CaptureError, Frame, SourceKind};

use crate::{
    annotation::{PoseOverlay, annotate_frame},
    config::{AppConfig, EstimatorKind},
    data::{AnnotatedFrame, PoseSnapshot, PublishedState},
    server::spawn_server,
    telemetry,
    watchdog::{HealthComponent, PipelineHealth, WatchdogState, spawn_watchdog},
};

/// Run the capture/publish pipeline, restarting on recoverable faults.
pub(crate) fn run(config: AppConfig) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    telemetry::init_tracing(config.verbose);
    let _ = telemetry::init_metrics_recorder();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler({
            let handler_shutdown = handler_shutdown.clone();
            move || handler_shutdown.store(true, Ordering::SeqCst)
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    // One clock and one published slot for the process lifetime: a restart
    // keeps the last good snapshot and the time axis stays monotonic.
    let started = Instant::now();
    let state = Arc::new(PublishedState::new());

    let mut attempt: u32 = 0;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        match run_pipeline_once(&config, state.clone(), started, shutdown.clone()) {
            Ok(PipelineOutcome::Graceful) => break,
            Ok(PipelineOutcome::Restart(reason)) => {
                attempt = attempt.saturating_add(1);
                warn!("Pipeline restart requested (reason: {reason}), attempt #{attempt}");
                thread::sleep(Duration::from_secs(1));
            }
            Err(err) => {
                error!("Pose pipeline error: {err:?}");
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                attempt = attempt.saturating_add(1);
                thread::sleep(Duration::from_secs(1));
            }
        }
    }

    Ok(())
}

/// Result of a single pipeline attempt.
enum PipelineOutcome {
    Graceful,
    Restart(&'static str),
}

fn spawn_reader(config: &AppConfig) -> Result<Receiver<Result<Frame, CaptureError>>> {
    let target = (config.width, config.height);
    match config.source_kind {
        SourceKind::Synthetic => {
            video_ingest::spawn_synthetic_reader(target, config.synthetic_fps)
                .context("Failed to start synthetic source")
        }
        SourceKind::Device => {
            #[cfg(feature = "with-opencv")]
            match video_ingest::spawn_camera_reader(&config.source, target) {
                Ok(receiver) => return Ok(receiver),
                Err(err) => warn!("OpenCV capture failed ({err}); falling back to ffmpeg"),
            }
            video_ingest::spawn_ffmpeg_reader(&config.source, target)
                .context("Failed to start device capture")
        }
        SourceKind::File => video_ingest::spawn_ffmpeg_reader(&config.source, target)
            .context("Failed to start file capture"),
    }
}

fn build_estimator(kind: &EstimatorKind) -> Result<Box<dyn PoseEstimator>> {
    match kind {
        EstimatorKind::Disabled => Ok(Box::new(NullEstimator)),
        EstimatorKind::Worker(command) => {
            let estimator = SubprocessEstimator::launch(command)
                .with_context(|| format!("Failed to launch pose worker `{command}`"))?;
            Ok(Box::new(estimator))
        }
    }
}

/// Execute the pipeline once, returning whether to exit or restart.
fn run_pipeline_once(
    config: &AppConfig,
    state: Arc<PublishedState>,
    started: Instant,
    shutdown: Arc<AtomicBool>,
) -> Result<PipelineOutcome> {
    if shutdown.load(Ordering::SeqCst) {
        return Ok(PipelineOutcome::Graceful);
    }

    let pipeline_span = tracing::info_span!(
        "pose.pipeline",
        source = %config.source,
        width = config.width,
        height = config.height,
        port = config.port,
    );
    let _pipeline_guard = pipeline_span.enter();

    let receiver = spawn_reader(config)?;
    let mut estimator = build_estimator(&config.estimator)?;

    let health = Arc::new(PipelineHealth::new());
    let pipeline_running = Arc::new(AtomicBool::new(true));
    let watchdog_state = Arc::new(WatchdogState::new());
    let watchdog_handle = spawn_watchdog(
        health.clone(),
        pipeline_running.clone(),
        shutdown.clone(),
        watchdog_state.clone(),
    );

    let server = spawn_server(state.clone(), config.port, config.jpeg_quality)
        .context("Failed to start HTTP server")?;
    info!(
        "Pose snapshots at http://0.0.0.0:{}/pose, video at /video_feed",
        config.port
    );

    let mut frame_number: u64 = 0;
    let mut smoothed_fps: f32 = 0.0;
    let mut last_instant = Instant::now();
    let mut restart_reason: Option<&'static str> = None;

    while pipeline_running.load(Ordering::Relaxed) {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match receiver.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(frame)) => {
                health.beat(HealthComponent::Capture);
                frame_number = frame_number.wrapping_add(1);

                let now = Instant::now();
                let elapsed = now.duration_since(last_instant).as_secs_f32();
                last_instant = now;
                if elapsed > 0.0 {
                    let instant = 1.0 / elapsed;
                    smoothed_fps = if smoothed_fps == 0.0 {
                        instant
                    } else {
                        0.9 * smoothed_fps + 0.1 * instant
                    };
                    metrics::histogram!("pose_capture_frame_interval_seconds")
                        .record(elapsed as f64);
                }
                metrics::gauge!("pose_pipeline_fps").set(smoothed_fps as f64);

                if frame_number % 30 == 0 {
                    debug!("Capture heartbeat: frame #{frame_number}, {smoothed_fps:.1} fps");
                }

                match run_cycle(
                    &frame,
                    frame_number,
                    smoothed_fps,
                    started.elapsed().as_secs_f64(),
                    estimator.as_mut(),
                    &health,
                    config.verbose,
                ) {
                    Ok((annotated, snapshot)) => {
                        state.publish(annotated, snapshot);
                        health.beat(HealthComponent::Publisher);
                    }
                    Err(err) => {
                        error!("Cycle failed: {err:?}");
                        restart_reason = Some("cycle error");
                        break;
                    }
                }
            }
            Ok(Err(err)) => {
                error!("Capture error: {err}");
                restart_reason = Some("capture error");
                break;
            }
            // Nothing captured this tick; re-check shutdown and watchdog flags.
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                error!("Frame channel closed");
                restart_reason = Some("capture channel closed");
                break;
            }
        }
    }

    info!("Stopping pose pipeline");
    pipeline_running.store(false, Ordering::SeqCst);
    drop(receiver);
    let _ = watchdog_handle.join();
    server.stop();

    if watchdog_state.is_triggered() {
        let reason = watchdog_state
            .reason()
            .map(|component| component.label())
            .unwrap_or("watchdog");
        return Ok(PipelineOutcome::Restart(reason));
    }
    if let Some(reason) = restart_reason {
        return Ok(PipelineOutcome::Restart(reason));
    }

    Ok(PipelineOutcome::Graceful)
}

/// One capture cycle: estimate, measure, annotate. Returns the frame to
/// publish and, when landmarks were detected, the new snapshot. A cycle with
/// no detection carries no overlay and leaves the snapshot untouched.
fn run_cycle(
    frame: &Frame,
    frame_number: u64,
    fps: f32,
    elapsed_seconds: f64,
    estimator: &mut dyn PoseEstimator,
    health: &PipelineHealth,
    verbose: bool,
) -> Result<(AnnotatedFrame, Option<PoseSnapshot>)> {
    let estimate_start = Instant::now();
    let landmarks = estimator
        .estimate(&frame.data, frame.width, frame.height)
        .context("Pose estimation failed")?;
    health.beat(HealthComponent::Estimator);
    metrics::histogram!("pose_stage_latency_seconds", "stage" => "estimate")
        .record(estimate_start.elapsed().as_secs_f64());

    let annotate_start = Instant::now();
    let result = match landmarks {
        Some(set) => {
            let angles = JointAngles::measure(&set);
            if verbose {
                debug!(
                    "frame #{frame_number}: shoulders {:.1}/{:.1}, elbows {:.1}/{:.1}",
                    angles.left_shoulder,
                    angles.right_shoulder,
                    angles.left_elbow,
                    angles.right_elbow
                );
            }
            metrics::counter!("pose_detection_cycles_total", "result" => "detected").increment(1);
            let overlay = PoseOverlay {
                landmarks: &set,
                angles: &angles,
            };
            (
                annotate_frame(frame, frame_number, fps, Some(overlay))?,
                Some(PoseSnapshot::new(elapsed_seconds, angles)),
            )
        }
        None => {
            if verbose {
                debug!("frame #{frame_number}: no detection");
            }
            metrics::counter!("pose_detection_cycles_total", "result" => "empty").increment(1);
            (annotate_frame(frame, frame_number, fps, None)?, None)
        }
    };
    metrics::histogram!("pose_stage_latency_seconds", "stage" => "annotate")
        .record(annotate_start.elapsed().as_secs_f64());

    Ok(result)
}
