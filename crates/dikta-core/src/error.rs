//! Error types shared across the pipeline.
//!
//! Construction and resource errors abort the attempted operation and leave
//! prior state intact; correction errors are always recovered by the caller.
//! Events carry [`ErrorKind`] across the core boundary instead of display
//! strings, so observers can localize however they like.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiktaError>;

#[derive(Debug, Error)]
pub enum DiktaError {
    #[error("model not found in registry: {0}")]
    ModelNotFound(String),

    #[error("model not downloaded: {0}")]
    ModelNotDownloaded(String),

    #[error("engine initialization failed: {0}")]
    EngineInit(String),

    #[error("no recognition engine loaded")]
    EngineNotLoaded,

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("text correction failed: {0}")]
    Correction(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("download already in progress for model: {0}")]
    DownloadInProgress(String),

    #[error("download cancelled")]
    Cancelled,

    #[error("hotkey registration failed: {0}")]
    HotkeyRegistration(String),

    #[error("audio capture error: {0}")]
    Audio(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse error category surfaced on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ModelNotFound,
    ModelNotDownloaded,
    EngineInit,
    EngineNotLoaded,
    Transcription,
    Correction,
    Download,
    DownloadInProgress,
    Cancelled,
    Hotkey,
    Audio,
    Io,
}

impl DiktaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiktaError::ModelNotFound(_) => ErrorKind::ModelNotFound,
            DiktaError::ModelNotDownloaded(_) => ErrorKind::ModelNotDownloaded,
            DiktaError::EngineInit(_) => ErrorKind::EngineInit,
            DiktaError::EngineNotLoaded => ErrorKind::EngineNotLoaded,
            DiktaError::Transcription(_) => ErrorKind::Transcription,
            DiktaError::Correction(_) => ErrorKind::Correction,
            DiktaError::Download(_) => ErrorKind::Download,
            DiktaError::DownloadInProgress(_) => ErrorKind::DownloadInProgress,
            DiktaError::Cancelled => ErrorKind::Cancelled,
            DiktaError::HotkeyRegistration(_) => ErrorKind::Hotkey,
            DiktaError::Audio(_) => ErrorKind::Audio,
            DiktaError::Io(_) => ErrorKind::Io,
        }
    }
}
