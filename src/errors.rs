use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Camera {camera_id} connection closed")]
    ConnectionClosed { camera_id: u32 },

    #[error("Camera {camera_id} sent a malformed frame: {message}")]
    MalformedFrame { camera_id: u32, message: String },

    #[error("Failed to bind port {port} for camera {camera_id}: {source}")]
    Bind {
        camera_id: u32,
        port: u16,
        source: std::io::Error,
    },

    #[error("JPEG encode failed: {message}")]
    Encode { message: String },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl IngestError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn malformed(camera_id: u32, message: impl Into<String>) -> Self {
        Self::MalformedFrame { camera_id, message: message.into() }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
