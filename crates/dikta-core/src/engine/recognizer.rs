//! Current-recognizer slot with hot swapping.
//!
//! The active speech engine is handed out as `Arc<dyn SpeechEngine>`; a swap
//! installs the replacement only after it has been constructed, and the old
//! engine is freed when the last in-flight transcription drops its handle.
//! A failed load or swap leaves the previous engine in place.

use std::sync::{Arc, RwLock};
use std::thread;

use crate::error::{DiktaError, Result};
use crate::model::registry;
use crate::model::store::ModelStore;
use crate::verbose;

use super::{EngineFactory, SpeechEngine};

pub struct RecognizerRegistry {
    factory: Arc<dyn EngineFactory>,
    store: Arc<ModelStore>,
    current: RwLock<Option<Arc<dyn SpeechEngine>>>,
}

impl RecognizerRegistry {
    pub fn new(factory: Arc<dyn EngineFactory>, store: Arc<ModelStore>) -> Self {
        Self {
            factory,
            store,
            current: RwLock::new(None),
        }
    }

    /// Load a recognizer into the slot, dropping any previous one in place.
    pub fn load(&self, model_id: &str) -> Result<()> {
        let engine = self.build(model_id)?;
        let mut slot = self.current.write().expect("recognizer slot poisoned");
        *slot = Some(engine);
        verbose!("Recognizer loaded: {model_id}");
        Ok(())
    }

    /// Replace the active recognizer without interrupting in-flight work.
    ///
    /// The new engine is fully constructed before the old one is retired;
    /// transcriptions already running keep their handle to the old engine.
    /// Freeing a native context can be slow, so the swapped-out engine is
    /// released off the caller's thread.
    pub fn swap(&self, model_id: &str) -> Result<()> {
        let engine = self.build(model_id)?;
        let old = {
            let mut slot = self.current.write().expect("recognizer slot poisoned");
            slot.replace(engine)
        };
        if let Some(old) = old {
            let old_id = old.model_id().to_string();
            thread::spawn(move || {
                drop(old);
                verbose!("Recognizer retired: {old_id}");
            });
        }
        verbose!("Recognizer swapped to: {model_id}");
        Ok(())
    }

    /// Handle to the active engine for one transcription. The handle stays
    /// valid across a concurrent swap or close.
    pub fn current(&self) -> Option<Arc<dyn SpeechEngine>> {
        self.current
            .read()
            .expect("recognizer slot poisoned")
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current
            .read()
            .expect("recognizer slot poisoned")
            .is_some()
    }

    pub fn loaded_model_id(&self) -> Option<String> {
        self.current
            .read()
            .expect("recognizer slot poisoned")
            .as_ref()
            .map(|e| e.model_id().to_string())
    }

    /// Empty the slot. In-flight transcriptions finish on their own handles.
    pub fn close(&self) {
        let mut slot = self.current.write().expect("recognizer slot poisoned");
        *slot = None;
    }

    fn build(&self, model_id: &str) -> Result<Arc<dyn SpeechEngine>> {
        let desc = registry::get(model_id)
            .filter(|d| d.engine.is_speech())
            .ok_or_else(|| DiktaError::ModelNotFound(model_id.to_string()))?;

        if !self.store.is_downloaded(desc) {
            return Err(DiktaError::ModelNotDownloaded(model_id.to_string()));
        }

        let path = self.store.model_path(desc);
        let engine = self.factory.create_speech(desc, &path)?;
        Ok(Arc::from(engine))
    }
}
