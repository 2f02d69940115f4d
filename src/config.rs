use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;

use crate::errors::{IngestError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allow_origin: Option<String>,
}

/// Bind host shared by every camera listen socket. Each camera still gets its
/// own port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_host")]
    pub host: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: u32,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    #[serde(default = "default_videos_root")]
    pub root: String,
    #[serde(default = "default_record_quality")]
    pub jpeg_quality: u8,
    /// Max age for recorded day directories (e.g. "10m", "5h", "30d").
    /// Absent means recordings are kept forever.
    pub retention: Option<String>,
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Camera served by the bare /video_feed route. Defaults to the first
    /// configured camera.
    pub default_camera: Option<u32>,
    #[serde(default = "default_stream_quality")]
    pub jpeg_quality: u8,
}

fn default_ingest_host() -> String {
    "0.0.0.0".to_string()
}

fn default_videos_root() -> String {
    "videos".to_string()
}

fn default_record_quality() -> u8 {
    85
}

fn default_stream_quality() -> u8 {
    80
}

fn default_cleanup_interval_hours() -> u64 {
    1
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { host: default_ingest_host() }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            root: default_videos_root(),
            jpeg_quality: default_record_quality(),
            retention: None,
            cleanup_interval_hours: default_cleanup_interval_hours(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            default_camera: None,
            jpeg_quality: default_stream_quality(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 1234,
                cors_allow_origin: Some("*".to_string()),
            },
            ingest: IngestConfig::default(),
            cameras: vec![
                CameraConfig { id: 1, port: 8098 },
                CameraConfig { id: 2, port: 8010 },
            ],
            recording: RecordingConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = if path.ends_with(".json") {
            serde_json::from_str(&content)
                .map_err(|e| IngestError::config(format!("{path}: {e}")))?
        } else {
            toml::from_str(&content)
                .map_err(|e| IngestError::config(format!("{path}: {e}")))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        let mut ports = HashSet::new();
        for camera in &self.cameras {
            if !ids.insert(camera.id) {
                return Err(IngestError::config(format!("Duplicate camera id {}", camera.id)));
            }
            if !ports.insert(camera.port) {
                return Err(IngestError::config(format!(
                    "Camera port {} is used more than once",
                    camera.port
                )));
            }
        }
        for quality in [self.recording.jpeg_quality, self.streaming.jpeg_quality] {
            if !(1..=100).contains(&quality) {
                return Err(IngestError::config(format!(
                    "JPEG quality {quality} is out of range (1-100)"
                )));
            }
        }
        Ok(())
    }

    /// Camera id served by the bare /video_feed route.
    pub fn stream_default_camera(&self) -> Option<u32> {
        self.streaming
            .default_camera
            .or_else(|| self.cameras.first().map(|camera| camera.id))
    }
}
