//! Optional LLM correction pass over raw transcripts.
//!
//! Correction never blocks a result: any failure, timeout, or empty output
//! falls back to the raw transcript. The deadline bounds the whole pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::engine::ollama::DEFAULT_CORRECTION_PROMPT;
use crate::error::{DiktaError, Result};
use crate::model::registry;
use crate::model::store::ModelStore;
use crate::verbose;

use super::{CorrectionEngine, EngineFactory};

/// Upper bound on one correction pass, including model warm-up.
pub const CORRECTION_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CorrectionStage {
    factory: Arc<dyn EngineFactory>,
    store: Arc<ModelStore>,
    current: RwLock<Option<Arc<dyn CorrectionEngine>>>,
    prompt: RwLock<String>,
    enabled: AtomicBool,
    timeout: Duration,
}

impl CorrectionStage {
    pub fn new(factory: Arc<dyn EngineFactory>, store: Arc<ModelStore>) -> Self {
        Self::with_timeout(factory, store, CORRECTION_TIMEOUT)
    }

    pub fn with_timeout(
        factory: Arc<dyn EngineFactory>,
        store: Arc<ModelStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            factory,
            store,
            current: RwLock::new(None),
            prompt: RwLock::new(DEFAULT_CORRECTION_PROMPT.to_string()),
            enabled: AtomicBool::new(false),
            timeout,
        }
    }

    /// Load a correction model and enable the stage.
    pub fn load(&self, model_id: &str) -> Result<()> {
        let desc = registry::get(model_id)
            .filter(|d| d.engine == registry::EngineKind::Llm)
            .ok_or_else(|| DiktaError::ModelNotFound(model_id.to_string()))?;

        if !self.store.is_downloaded(desc) {
            return Err(DiktaError::ModelNotDownloaded(model_id.to_string()));
        }

        let engine = self.factory.create_correction(desc)?;
        *self.current.write().expect("correction slot poisoned") = Some(Arc::from(engine));
        self.enabled.store(true, Ordering::SeqCst);
        verbose!("Correction model loaded: {model_id}");
        Ok(())
    }

    /// Drop the model and disable the stage.
    pub fn unload(&self) {
        *self.current.write().expect("correction slot poisoned") = None;
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_loaded(&self) -> bool {
        self.current
            .read()
            .expect("correction slot poisoned")
            .is_some()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn loaded_model_id(&self) -> Option<String> {
        self.current
            .read()
            .expect("correction slot poisoned")
            .as_ref()
            .map(|e| e.model_id().to_string())
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        *self.prompt.write().expect("prompt poisoned") = prompt.into();
    }

    /// Run the correction pass. Returns `None` whenever the raw transcript
    /// should be used instead: stage disabled or unloaded, engine error,
    /// empty output, or deadline exceeded.
    pub async fn correct(&self, text: &str) -> Option<String> {
        if !self.is_enabled() || text.trim().is_empty() {
            return None;
        }
        let engine = self
            .current
            .read()
            .expect("correction slot poisoned")
            .clone()?;

        let prompt = self.prompt.read().expect("prompt poisoned").clone();
        let owned = text.to_string();
        let task = tokio::task::spawn_blocking(move || engine.correct(&owned, &prompt));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(corrected))) if !corrected.trim().is_empty() => Some(corrected),
            Ok(Ok(Ok(_))) => {
                verbose!("Correction returned empty text, keeping raw transcript");
                None
            }
            Ok(Ok(Err(e))) => {
                verbose!("Correction failed, keeping raw transcript: {e}");
                None
            }
            Ok(Err(e)) => {
                verbose!("Correction task failed, keeping raw transcript: {e}");
                None
            }
            Err(_) => {
                verbose!("Correction timed out, keeping raw transcript");
                None
            }
        }
    }
}
