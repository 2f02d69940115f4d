use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

mod cache;
mod cleanup;
mod codec;
mod config;
mod errors;
mod frame;
mod ingest;
mod recorder;
mod stream;
mod utils;

use cache::FrameCache;
use config::Config;
use ingest::IngestState;
use recorder::DayTracker;

#[derive(Parser, Debug)]
#[command(name = "camera-streaming-server")]
#[command(about = "Ingests camera frames over TCP, records daily video segments, and restreams MJPEG to browsers")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

/// Shared state handed to the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: FrameCache,
    pub cameras: Arc<Vec<config::CameraConfig>>,
    pub default_camera: Option<u32>,
    pub stream_quality: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("camera_streaming_server=debug,info")
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config).unwrap_or_else(|e| {
        warn!("Could not load {} ({}), using default configuration", args.config, e);
        Config::default()
    });

    if config.cameras.is_empty() {
        error!("No cameras configured");
        return Err(anyhow::anyhow!("No cameras configured"));
    }

    info!(
        "Starting camera streaming server on {}:{}",
        config.server.host, config.server.port
    );

    let cache = FrameCache::new();
    let day = Arc::new(DayTracker::startup());
    let ingest_state = IngestState {
        cache: cache.clone(),
        day,
        videos_root: PathBuf::from(&config.recording.root),
        jpeg_quality: config.recording.jpeg_quality,
    };

    for camera in config.cameras.iter().copied() {
        info!("Configuring camera {} on port {}...", camera.id, camera.port);
        ingest::spawn_camera_listener(config.ingest.host.clone(), camera, ingest_state.clone());
    }

    if let Some(retention) = config.recording.retention.as_deref() {
        match utils::parse_duration(retention) {
            Ok(horizon) => {
                cleanup::spawn_retention_task(
                    PathBuf::from(&config.recording.root),
                    horizon,
                    config.recording.cleanup_interval_hours,
                );
            }
            Err(e) => warn!("Ignoring invalid recording.retention '{}': {}", retention, e),
        }
    }

    let state = AppState {
        cache,
        cameras: Arc::new(config.cameras.clone()),
        default_camera: config.stream_default_camera(),
        stream_quality: config.streaming.jpeg_quality,
    };

    let cors_layer = match config.server.cors_allow_origin.as_deref() {
        Some("*") | None => tower_http::cors::CorsLayer::permissive(),
        Some(origin) => match origin.parse::<axum::http::HeaderValue>() {
            Ok(origin_header) => tower_http::cors::CorsLayer::new()
                .allow_origin(origin_header)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
            Err(_) => {
                warn!("Invalid CORS origin '{}', falling back to permissive", origin);
                tower_http::cors::CorsLayer::permissive()
            }
        },
    };

    let app = axum::Router::new()
        .route("/", axum::routing::get(stream::index_handler))
        .route("/video_feed", axum::routing::get(stream::video_feed))
        .route("/video_feed/:camera_id", axum::routing::get(stream::video_feed_for_camera))
        .route("/api/status", axum::routing::get(stream::api_status))
        .layer(cors_layer)
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
