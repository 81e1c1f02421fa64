//! Typed event stream emitted by the pipeline.
//!
//! Observers (UI, tray, notifier) subscribe to a broadcast of these events
//! instead of registering per-purpose callbacks. Events carry error kinds,
//! never display strings.

use crate::error::ErrorKind;
use crate::model::store::DownloadProgress;
use crate::session::machine::SessionState;

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The capture session moved to a new state.
    StateChanged(SessionState),
    /// Audio capture has begun.
    RecordingStarted,
    /// Capture stopped, transcription (and possibly correction) underway.
    Processing,
    /// A finished session cycle. `corrected` is present only when the
    /// correction stage produced a different text.
    Result {
        original: String,
        corrected: Option<String>,
    },
    /// Transcription produced no text.
    Empty,
    /// A user-visible failure; the session is back in a usable state.
    Error(ErrorKind),
    /// Streaming progress for a model download started via the pipeline.
    Download(DownloadProgress),
    /// A new recognition engine was published as current.
    ModelSwapped { model_id: String },
}

impl PipelineEvent {
    /// Final text of a `Result` event (corrected if available).
    pub fn final_text(&self) -> Option<&str> {
        match self {
            PipelineEvent::Result {
                original,
                corrected,
            } => Some(corrected.as_deref().unwrap_or(original)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_text_prefers_corrected() {
        let ev = PipelineEvent::Result {
            original: "helo wrld".into(),
            corrected: Some("hello world".into()),
        };
        assert_eq!(ev.final_text(), Some("hello world"));

        let ev = PipelineEvent::Result {
            original: "hello world".into(),
            corrected: None,
        };
        assert_eq!(ev.final_text(), Some("hello world"));
        assert_eq!(PipelineEvent::Empty.final_text(), None);
    }
}
