use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::debug;

use crate::cache::FrameCache;
use crate::AppState;

/// Multipart boundary baked into the wire format; viewers parse chunks
/// delimited by `--frame`.
pub const BOUNDARY: &str = "frame";

pub async fn index_handler() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

/// `GET /video_feed` — the default camera's live stream.
pub async fn video_feed(State(state): State<AppState>) -> Response {
    match state.default_camera {
        Some(camera_id) => mjpeg_response(state.cache.clone(), camera_id, state.stream_quality),
        None => (StatusCode::NOT_FOUND, "no cameras configured").into_response(),
    }
}

/// `GET /video_feed/:camera_id` — one specific camera's live stream. A camera
/// that never sent a frame produces an open response with no chunks yet.
pub async fn video_feed_for_camera(
    Path(camera_id): Path<u32>,
    State(state): State<AppState>,
) -> Response {
    mjpeg_response(state.cache.clone(), camera_id, state.stream_quality)
}

fn mjpeg_response(cache: FrameCache, camera_id: u32, jpeg_quality: u8) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        )
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from_stream(mjpeg_stream(cache, camera_id, jpeg_quality)))
        .expect("failed to build MJPEG response")
}

struct FeedState {
    cache: FrameCache,
    changed: Arc<Notify>,
    camera_id: u32,
    jpeg_quality: u8,
    last_seq: Option<u64>,
}

/// Infinite chunk sequence for one viewer: each cache update for the target
/// camera becomes one `--frame` part. An absent entry emits nothing and keeps
/// waiting; an encode failure skips that frame. The stream only ends when the
/// viewer drops the response.
pub fn mjpeg_stream(
    cache: FrameCache,
    camera_id: u32,
    jpeg_quality: u8,
) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> {
    let changed = cache.change_listener();
    let feed = FeedState { cache, changed, camera_id, jpeg_quality, last_seq: None };

    stream::unfold(feed, |mut feed| async move {
        loop {
            // register before reading so an update landing mid-encode is not
            // missed; the sequence check below drops duplicates
            let notified = feed.changed.notified();
            match feed.cache.latest_versioned(feed.camera_id).await {
                Some((seq, frame)) if feed.last_seq != Some(seq) => {
                    feed.last_seq = Some(seq);
                    match frame.to_jpeg(feed.jpeg_quality) {
                        Ok(jpeg) => {
                            drop(notified);
                            return Some((Ok(multipart_chunk(&jpeg)), feed));
                        }
                        Err(e) => {
                            debug!("Skipping frame for camera {}: {}", feed.camera_id, e);
                        }
                    }
                }
                _ => notified.await,
            }
        }
    })
}

fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let head = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut chunk = Vec::with_capacity(head.len() + jpeg.len() + 2);
    chunk.extend_from_slice(head.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    Bytes::from(chunk)
}

#[derive(Debug, Serialize)]
pub struct CameraStatus {
    pub camera_id: u32,
    pub port: u16,
    pub has_frame: bool,
    pub last_frame_at: Option<DateTime<Utc>>,
}

/// `GET /api/status` — configured cameras and when each last delivered a
/// frame. A camera that went silent simply stops advancing its timestamp.
pub async fn api_status(State(state): State<AppState>) -> Json<Vec<CameraStatus>> {
    let mut cameras = Vec::with_capacity(state.cameras.len());
    for camera in state.cameras.iter() {
        let last_frame_at = state.cache.last_received(camera.id).await;
        cameras.push(CameraStatus {
            camera_id: camera.id,
            port: camera.port,
            has_frame: last_frame_at.is_some(),
            last_frame_at,
        });
    }
    Json(cameras)
}
