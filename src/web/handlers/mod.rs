use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::media::FrameReceiver;
use crate::session::SessionStatus;
use crate::state::AppState;
use crate::video::{enumerate_devices, JpegEncoder, VideoDeviceInfo, VideoFrame};

// ============================================================================
// Health
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Session control
// ============================================================================

/// Session status wrapped in the unified success envelope
#[derive(Serialize)]
pub struct SessionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub status: SessionStatus,
}

pub async fn session_status(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(SessionResponse {
        success: true,
        status: state.session.status().await,
    })
}

/// Start the capture session (no-op while active)
pub async fn session_start(State(state): State<Arc<AppState>>) -> Result<Json<SessionResponse>> {
    state.session.start().await?;
    Ok(Json(SessionResponse {
        success: true,
        status: state.session.status().await,
    }))
}

/// Stop the capture session (no-op while inactive)
pub async fn session_stop(State(state): State<Arc<AppState>>) -> Result<Json<SessionResponse>> {
    state.session.stop().await?;
    Ok(Json(SessionResponse {
        success: true,
        status: state.session.status().await,
    }))
}

#[derive(Serialize)]
pub struct LabelResponse {
    pub label: String,
}

pub async fn get_label(State(state): State<Arc<AppState>>) -> Json<LabelResponse> {
    Json(LabelResponse {
        label: state.session.label().get(),
    })
}

// ============================================================================
// Live preview
// ============================================================================

fn preview_encoder(state: &AppState) -> JpegEncoder {
    JpegEncoder::new(state.config.get().camera.quality)
}

fn no_frame() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "No frame available").into_response()
}

/// Latest frame as a single JPEG
pub async fn snapshot(State(state): State<Arc<AppState>>) -> Response {
    let Some(frames) = state.session.preview().await else {
        return no_frame();
    };
    let latest = frames.borrow().clone();
    let Some(frame) = latest.filter(VideoFrame::has_pixels) else {
        return no_frame();
    };

    match preview_encoder(&state).encode_async(frame).await {
        Ok(jpeg) => (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            jpeg,
        )
            .into_response(),
        Err(e) => {
            warn!("Snapshot encoding failed: {}", e);
            no_frame()
        }
    }
}

/// MJPEG live preview attached to the active session's stream.
///
/// The response ends when the session stops or the camera goes away.
pub async fn mjpeg_preview(State(state): State<Arc<AppState>>) -> Response {
    let Some(frames) = state.session.preview().await else {
        return no_frame();
    };
    let encoder = preview_encoder(&state);
    let mut shutdown = state.shutdown_signal();

    info!("MJPEG preview client connected");
    let body_stream = async_stream::stream! {
        let mut frames: FrameReceiver = frames;
        loop {
            tokio::select! {
                changed = frames.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown.recv() => break,
            }

            let latest = frames.borrow_and_update().clone();
            let Some(frame) = latest.filter(VideoFrame::has_pixels) else {
                continue;
            };
            match encoder.encode_async(frame).await {
                Ok(jpeg) => yield Ok::<Bytes, std::io::Error>(create_mjpeg_part(&jpeg)),
                Err(e) => debug!("Skipping preview frame: {}", e),
            }
        }
        info!("MJPEG preview client finished");
    };

    (
        [
            (
                header::CONTENT_TYPE,
                "multipart/x-mixed-replace; boundary=frame",
            ),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Body::from_stream(body_stream),
    )
        .into_response()
}

/// Create MJPEG multipart frame bytes
fn create_mjpeg_part(jpeg_data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(128 + jpeg_data.len());

    buf.put_slice(b"--frame\r\n");
    buf.put_slice(b"Content-Type: image/jpeg\r\n");
    buf.put_slice(format!("Content-Length: {}\r\n", jpeg_data.len()).as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(jpeg_data);
    buf.put_slice(b"\r\n");

    buf.freeze()
}

// ============================================================================
// Devices & configuration
// ============================================================================

#[derive(Serialize)]
pub struct DeviceList {
    pub video: Vec<VideoDeviceInfo>,
}

pub async fn list_devices() -> Result<Json<DeviceList>> {
    let video = tokio::task::spawn_blocking(enumerate_devices)
        .await
        .map_err(|e| AppError::Internal(format!("Device scan task failed: {}", e)))??;
    Ok(Json(DeviceList { video }))
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<AppConfig> {
    Json((*state.config.get()).clone())
}
