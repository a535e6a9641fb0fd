use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("GIF encoding error: {0}")]
    Encoding(#[from] gif::EncodingError),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("encoder misuse: {0}")]
    EncoderState(&'static str),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("encode worker panicked")]
    WorkerPanicked,
}

impl RecorderError {
    /// Resource errors end the session; everything else is a local failure.
    pub fn is_resource(&self) -> bool {
        matches!(self, RecorderError::Io(_) | RecorderError::Encoding(_))
    }
}

impl From<anyhow::Error> for RecorderError {
    fn from(err: anyhow::Error) -> Self {
        RecorderError::Capture(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
