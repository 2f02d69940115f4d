use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

use crate::cache::FrameCache;
use crate::codec::FrameCodec;
use crate::config::CameraConfig;
use crate::errors::{IngestError, Result};
use crate::frame::Frame;
use crate::recorder::{DayTracker, VideoRecorder};

/// Everything a connection handler needs, passed in by handle rather than
/// reached for globally.
#[derive(Clone)]
pub struct IngestState {
    pub cache: FrameCache,
    pub day: Arc<DayTracker>,
    pub videos_root: PathBuf,
    pub jpeg_quality: u8,
}

/// Binds the camera's listen socket and accepts connections until the process
/// exits. A bind failure kills this camera's ingestion path only.
pub fn spawn_camera_listener(
    host: String,
    camera: CameraConfig,
    state: IngestState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_listener(&host, camera, state).await {
            error!("Listener for camera {} stopped: {}", camera.id, e);
        }
    })
}

async fn run_listener(host: &str, camera: CameraConfig, state: IngestState) -> Result<()> {
    let addr = format!("{}:{}", host, camera.port);
    let listener = TcpListener::bind(&addr).await.map_err(|source| IngestError::Bind {
        camera_id: camera.id,
        port: camera.port,
        source,
    })?;
    info!("Camera {} listening on {}", camera.id, addr);

    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                info!("Camera {} connected from {}", camera.id, peer);
                let state = state.clone();
                tokio::spawn(async move {
                    run_connection(socket, camera.id, state).await;
                });
            }
            Err(e) => {
                warn!("Accept failed for camera {}: {}", camera.id, e);
            }
        }
    }
}

/// Runs one camera connection to completion. Every exit goes through the same
/// teardown: log the cause, release the open video segment, end the task.
pub async fn run_connection<S>(socket: S, camera_id: u32, state: IngestState)
where
    S: AsyncRead + Unpin,
{
    let mut recorder = VideoRecorder::new(
        camera_id,
        state.videos_root.clone(),
        state.day.clone(),
        state.jpeg_quality,
    );

    let err = ingest_frames(socket, camera_id, &state.cache, &mut recorder).await;
    match &err {
        IngestError::ConnectionClosed { .. } => info!("Camera {} disconnected", camera_id),
        IngestError::MalformedFrame { .. } => {
            warn!("Dropping camera {} connection: {}", camera_id, err)
        }
        other => error!("Camera {} connection failed: {}", camera_id, other),
    }
    recorder.close();
}

/// The per-connection loop: deframe, deserialize, then apply each frame's
/// side effects in order (rollover check, cache write, segment open, segment
/// append). Runs until the stream fails; the returned error is the reason.
async fn ingest_frames<S>(
    socket: S,
    camera_id: u32,
    cache: &FrameCache,
    recorder: &mut VideoRecorder,
) -> IngestError
where
    S: AsyncRead + Unpin,
{
    let mut messages = FramedRead::new(socket, FrameCodec::new());

    loop {
        let payload = match messages.next().await {
            Some(Ok(payload)) => payload,
            Some(Err(e)) => return classify_read_error(camera_id, e),
            None => return IngestError::ConnectionClosed { camera_id },
        };

        let frame: Frame = match bincode::deserialize(&payload) {
            Ok(frame) => frame,
            Err(e) => return IngestError::malformed(camera_id, e.to_string()),
        };
        if !frame.is_well_formed() {
            return IngestError::malformed(
                camera_id,
                format!(
                    "{}x{} frame with a {} byte buffer",
                    frame.width,
                    frame.height,
                    frame.data.len()
                ),
            );
        }

        if let Err(e) = recorder.rotate_if_new_day(Local::now().date_naive()) {
            return e;
        }
        cache.set(camera_id, frame.clone()).await;
        if let Err(e) = recorder.write(&frame, Local::now()) {
            return e;
        }
        debug!(
            "Camera {}: {}x{} frame, {} payload bytes",
            camera_id,
            frame.width,
            frame.height,
            payload.len()
        );
    }
}

/// A framing-level InvalidData error means the peer spoke garbage; anything
/// else on the socket is a disconnect, including EOF mid-message.
fn classify_read_error(camera_id: u32, e: io::Error) -> IngestError {
    if e.kind() == io::ErrorKind::InvalidData {
        IngestError::malformed(camera_id, e.to_string())
    } else {
        IngestError::ConnectionClosed { camera_id }
    }
}
