//! Actix Web server exposing the pose snapshot, the MJPEG stream, and
//! pipeline metrics.
//!
//! The server runs on a dedicated thread so the producer loop never contends
//! with the HTTP runtime. Handlers only ever copy out of [`PublishedState`].

use std::sync::Arc;

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use tokio::sync::oneshot;
use tracing::{error, warn};

use crate::{
    data::PublishedState,
    encoding::{MJPEG_CONTENT_TYPE, encode_jpeg, mjpeg_part},
    telemetry,
};

/// Shared state backing HTTP handlers.
struct ServerState {
    published: Arc<PublishedState>,
    jpeg_quality: u8,
}

#[derive(Default)]
/// Handle for the server thread.
pub(crate) struct PreviewServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl PreviewServer {
    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(self) {
        if let Some(tx) = self.shutdown {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle {
            let _ = handle.join();
        }
    }
}

/// Spawn the HTTP server thread and return a handle that can stop it.
pub(crate) fn spawn_server(
    published: Arc<PublishedState>,
    port: u16,
    jpeg_quality: u8,
) -> Result<PreviewServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = telemetry::spawn_thread("posewatch-http", move || {
        if let Err(err) = actix_web::rt::System::new().block_on(async move {
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(ServerState {
                        published: published.clone(),
                        jpeg_quality,
                    }))
                    .route("/pose", web::get().to(pose_handler))
                    .route("/video_feed", web::get().to(video_feed_handler))
                    .route("/frame.jpg", web::get().to(frame_handler))
                    .route("/metrics", web::get().to(metrics_handler))
            })
            .bind(("0.0.0.0", port))?
            .run();

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        }) {
            error!("HTTP server error: {err}");
        }
    })
    .context("Failed to spawn HTTP server thread")?;
    Ok(PreviewServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

/// Return the latest pose snapshot as JSON.
async fn pose_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header(("Cache-Control", "no-cache"))
        .json(state.published.snapshot())
}

/// Return the latest annotated frame as a single JPEG.
async fn frame_handler(state: web::Data<ServerState>) -> HttpResponse {
    let Some(frame) = state.published.latest_frame() else {
        return HttpResponse::NoContent().finish();
    };
    match encode_jpeg(&frame, state.jpeg_quality) {
        Ok(jpeg) => HttpResponse::Ok().content_type("image/jpeg").body(jpeg),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

/// Stream annotated frames as an unbounded multipart response.
///
/// Each publish wakes the generator; a client that falls behind skips
/// straight to the latest frame, and a disconnect drops the stream which ends
/// the session. An encode failure skips that tick only.
async fn video_feed_handler(state: web::Data<ServerState>) -> HttpResponse {
    let published = state.published.clone();
    let quality = state.jpeg_quality;
    let mut publishes = published.watch_publishes();
    let stream = stream! {
        loop {
            if let Some(frame) = published.latest_frame() {
                match encode_jpeg(&frame, quality) {
                    Ok(jpeg) => yield Ok::<Bytes, actix_web::Error>(Bytes::from(mjpeg_part(&jpeg))),
                    Err(err) => warn!("Stream encode failed: {err}"),
                }
            }
            if publishes.changed().await.is_err() {
                break;
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", MJPEG_CONTENT_TYPE))
        .streaming(stream)
}

/// Prometheus text exposition of pipeline metrics.
async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not initialised"),
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test;

    use super::*;
    use crate::data::{AnnotatedFrame, PoseSnapshot};
    use pose_core::JointAngles;

    fn state_data(published: Arc<PublishedState>) -> web::Data<ServerState> {
        web::Data::new(ServerState {
            published,
            jpeg_quality: 80,
        })
    }

    fn small_frame(frame_number: u64) -> AnnotatedFrame {
        AnnotatedFrame {
            rgb: vec![120; 8 * 8 * 3],
            width: 8,
            height: 8,
            frame_number,
        }
    }

    #[actix_web::test]
    async fn pose_endpoint_matches_the_wire_schema() {
        let published = Arc::new(PublishedState::new());
        published.publish(
            small_frame(1),
            Some(PoseSnapshot::new(
                2.5,
                JointAngles {
                    left_shoulder: 45.0,
                    right_shoulder: 30.0,
                    left_elbow: 120.0,
                    right_elbow: 150.0,
                },
            )),
        );
        let app = test::init_service(
            App::new()
                .app_data(state_data(published))
                .route("/pose", web::get().to(pose_handler)),
        )
        .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/pose").to_request()).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body.get("time").unwrap().as_f64().unwrap(), 2.5);
        let pose = body.get("pose").unwrap();
        for key in [
            "leftShoulderAngle",
            "rightShoulderAngle",
            "leftElbowAngle",
            "rightElbowAngle",
        ] {
            let angle = pose.get(key).unwrap().as_f64().unwrap();
            assert!((0.0..=180.0).contains(&angle), "{key} out of range");
        }
        assert_eq!(pose.get("leftHandShape").unwrap(), "open");
        assert_eq!(pose.get("rightHandShape").unwrap(), "open");
        assert_eq!(pose.get("leftFoot").unwrap(), "M");
        assert_eq!(pose.get("rightFoot").unwrap(), "M");
    }

    #[actix_web::test]
    async fn frame_endpoint_is_empty_before_the_first_publish() {
        let published = Arc::new(PublishedState::new());
        let app = test::init_service(
            App::new()
                .app_data(state_data(published))
                .route("/frame.jpg", web::get().to(frame_handler)),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/frame.jpg").to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NO_CONTENT);
    }

    #[actix_web::test]
    async fn frame_endpoint_serves_the_latest_jpeg() {
        let published = Arc::new(PublishedState::new());
        published.publish(small_frame(9), None);
        let app = test::init_service(
            App::new()
                .app_data(state_data(published))
                .route("/frame.jpg", web::get().to(frame_handler)),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/frame.jpg").to_request(),
        )
        .await;
        assert!(resp.status().is_success());
        let body = test::read_body(resp).await;
        assert_eq!(&body[0..2], &[0xFF, 0xD8]);
    }
}
