//! Speech and correction engines.
//!
//! Engines are constructed through an [`EngineFactory`] so the rest of the
//! pipeline never names a concrete backend; tests substitute fakes the same
//! way.

pub mod correction;
pub mod ollama;
pub mod recognizer;
#[cfg(feature = "vosk")]
pub mod vosk;
#[cfg(feature = "whisper")]
pub mod whisper;

use std::path::Path;

use crate::error::{DiktaError, Result};
use crate::model::registry::{EngineKind, ModelDescriptor};

/// A loaded speech-to-text backend. Implementations hold whatever native
/// context their model needs; transcription is CPU-bound and synchronous.
pub trait SpeechEngine: Send + Sync {
    fn kind(&self) -> EngineKind;
    fn model_id(&self) -> &str;
    /// Transcribe 16 kHz mono samples. `language` is an ISO 639-1 code, or
    /// `None` for auto-detection where the backend supports it.
    fn transcribe(&self, samples: &[f32], language: Option<&str>) -> Result<String>;
}

/// A text-correction backend that rewrites raw transcripts.
pub trait CorrectionEngine: Send + Sync {
    fn model_id(&self) -> &str;
    fn correct(&self, text: &str, prompt: &str) -> Result<String>;
}

/// Builds engines from model descriptors.
pub trait EngineFactory: Send + Sync {
    fn create_speech(
        &self,
        desc: &ModelDescriptor,
        model_path: &Path,
    ) -> Result<Box<dyn SpeechEngine>>;

    fn create_correction(&self, desc: &ModelDescriptor) -> Result<Box<dyn CorrectionEngine>>;
}

/// Factory for the compiled-in backends. Speech backends are feature-gated;
/// asking for one that was not compiled in fails with an init error rather
/// than a panic.
#[derive(Debug, Default, Clone)]
pub struct NativeEngineFactory;

impl EngineFactory for NativeEngineFactory {
    fn create_speech(
        &self,
        desc: &ModelDescriptor,
        model_path: &Path,
    ) -> Result<Box<dyn SpeechEngine>> {
        match desc.engine {
            #[cfg(feature = "whisper")]
            EngineKind::Whisper => Ok(Box::new(whisper::WhisperEngine::load(
                desc.id, model_path,
            )?)),
            #[cfg(not(feature = "whisper"))]
            EngineKind::Whisper => {
                let _ = model_path;
                Err(DiktaError::EngineInit(
                    "built without whisper support (enable the `whisper` feature)".into(),
                ))
            }
            #[cfg(feature = "vosk")]
            EngineKind::Vosk => Ok(Box::new(vosk::VoskEngine::load(desc.id, model_path)?)),
            #[cfg(not(feature = "vosk"))]
            EngineKind::Vosk => {
                let _ = model_path;
                Err(DiktaError::EngineInit(
                    "built without vosk support (enable the `vosk` feature)".into(),
                ))
            }
            EngineKind::Llm => Err(DiktaError::EngineInit(format!(
                "{} is a correction model, not a speech model",
                desc.id
            ))),
        }
    }

    fn create_correction(&self, desc: &ModelDescriptor) -> Result<Box<dyn CorrectionEngine>> {
        match desc.engine {
            EngineKind::Llm => Ok(Box::new(ollama::OllamaCorrector::new(desc)?)),
            other => Err(DiktaError::EngineInit(format!(
                "{} is a {other} model, not a correction model",
                desc.id
            ))),
        }
    }
}
