//! Top-level pipeline facade.
//!
//! Wires the store, recognizer registry, correction stage and capture
//! session together, and exposes the command surface a frontend needs:
//! toggle/cancel via the session, `swap`, `download`,
//! `set_correction_enabled`. Everything observable flows out through one
//! broadcast event stream.

use std::sync::Arc;
use std::thread;

use tokio::sync::broadcast;

use crate::audio::AudioSource;
use crate::config::Settings;
use crate::engine::correction::CorrectionStage;
use crate::engine::recognizer::RecognizerRegistry;
use crate::engine::{EngineFactory, NativeEngineFactory};
use crate::error::{DiktaError, Result};
use crate::events::PipelineEvent;
use crate::model::registry;
use crate::model::store::{CancelToken, DownloadProgress, ModelStore};
use crate::session::CaptureSession;
use crate::verbose;

const EVENT_CAPACITY: usize = 256;

pub struct Pipeline {
    store: Arc<ModelStore>,
    recognizer: Arc<RecognizerRegistry>,
    correction: Arc<CorrectionStage>,
    session: CaptureSession,
    events: broadcast::Sender<PipelineEvent>,
}

impl Pipeline {
    /// Build with the compiled-in engine backends and the default models
    /// directory. Must be called from within a tokio runtime.
    pub fn new(settings: &Settings, audio: Box<dyn AudioSource>) -> Result<Self> {
        let store = Arc::new(ModelStore::new()?);
        Self::with_parts(Arc::new(NativeEngineFactory), store, audio, settings)
    }

    pub fn with_parts(
        factory: Arc<dyn EngineFactory>,
        store: Arc<ModelStore>,
        audio: Box<dyn AudioSource>,
        settings: &Settings,
    ) -> Result<Self> {
        let recognizer = Arc::new(RecognizerRegistry::new(factory.clone(), store.clone()));
        let correction = Arc::new(CorrectionStage::new(factory, store.clone()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session = CaptureSession::new(
            audio,
            recognizer.clone(),
            correction.clone(),
            events.clone(),
        );
        session.set_language(settings.recognition_language().map(String::from));

        Ok(Self {
            store,
            recognizer,
            correction,
            session,
            events,
        })
    }

    /// Load the configured recognition model (and correction model when
    /// enabled). Call once at startup, after the artifacts are on disk.
    pub fn load_initial_engine(&self, settings: &Settings) -> Result<()> {
        let model_id = if settings.model_id.is_empty() {
            registry::default_model_id()
        } else {
            &settings.model_id
        };
        self.recognizer.load(model_id)?;

        if settings.correction.enabled {
            // A broken correction setup must not take dictation down.
            if let Err(e) = self.correction.load(&settings.correction.model_id) {
                verbose!("Correction unavailable: {e}");
            }
        }
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    pub fn recognizer(&self) -> &Arc<RecognizerRegistry> {
        &self.recognizer
    }

    /// Hot-swap the recognition model. In-flight transcriptions finish on
    /// the engine they started with.
    pub fn swap(&self, model_id: &str) -> Result<()> {
        self.recognizer.swap(model_id)?;
        let _ = self.events.send(PipelineEvent::ModelSwapped {
            model_id: model_id.to_string(),
        });
        Ok(())
    }

    /// Start a model download in the background. Progress and the terminal
    /// outcome are reported on the event stream; a duplicate request for a
    /// model already downloading fails immediately.
    pub fn download(&self, model_id: &str, cancel: CancelToken) -> Result<()> {
        let desc = registry::get(model_id)
            .ok_or_else(|| DiktaError::ModelNotFound(model_id.to_string()))?;

        let (tx, rx) = crossbeam_channel::bounded::<DownloadProgress>(64);
        let events = self.events.clone();
        thread::spawn(move || {
            for progress in rx {
                let _ = events.send(PipelineEvent::Download(progress));
            }
        });

        let store = self.store.clone();
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.download(desc, &cancel, Some(&tx)) {
                verbose!("Download of {} failed: {e}", desc.id);
                let _ = events.send(PipelineEvent::Error(e.kind()));
            }
        });
        Ok(())
    }

    /// Enable or disable the correction pass. Enabling loads the given
    /// model (or keeps the one already loaded).
    pub fn set_correction_enabled(&self, enabled: bool, model_id: Option<&str>) -> Result<()> {
        if !enabled {
            self.correction.set_enabled(false);
            return Ok(());
        }
        match model_id {
            Some(id) if self.correction.loaded_model_id().as_deref() != Some(id) => {
                self.correction.load(id)?;
            }
            None if !self.correction.is_loaded() => {
                self.correction.load(registry::default_correction_model_id())?;
            }
            _ => self.correction.set_enabled(true),
        }
        Ok(())
    }

    pub fn correction(&self) -> &Arc<CorrectionStage> {
        &self.correction
    }

    /// Release engines at shutdown. In-flight work finishes on its own
    /// handles.
    pub fn close(&self) {
        self.recognizer.close();
        self.correction.unload();
    }
}
