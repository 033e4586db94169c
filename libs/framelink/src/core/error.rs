use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Connect failed: {0}")]
    ConnectFailure(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection closed unexpectedly: {0}")]
    UnexpectedClose(String),

    #[error("Malformed inbound message: {0}")]
    MalformedMessage(String),

    #[error("Frame encoding failed: {0}")]
    EncodingError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
