//! Capture session orchestration.
//!
//! [`CaptureSession`] owns the state machine and its collaborators. Every
//! external stimulus becomes a [`machine::SessionEvent`]; the machine decides
//! the transition under its lock, and the returned effects (start capture,
//! run transcription, publish a result) are executed here with the lock
//! released. Background work reports back by dispatching follow-up events
//! tagged with the generation that spawned it.

pub mod machine;

use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tokio::sync::broadcast;

use crate::audio::{pad_silence, AudioSource};
use crate::engine::correction::CorrectionStage;
use crate::engine::recognizer::RecognizerRegistry;
use crate::events::PipelineEvent;
use crate::verbose;

use machine::{Effect, MachineCtx, SessionEvent, SessionMachine, SessionState};

pub use machine::{MIN_RECORDING_DURATION, MIN_SAMPLES};

pub struct CaptureSession {
    inner: Arc<Inner>,
}

struct Inner {
    machine: Mutex<SessionMachine>,
    audio: Mutex<Box<dyn AudioSource>>,
    recognizer: Arc<RecognizerRegistry>,
    correction: Arc<CorrectionStage>,
    events: broadcast::Sender<PipelineEvent>,
    language: RwLock<Option<String>>,
    runtime: tokio::runtime::Handle,
}

impl CaptureSession {
    /// Must be called from within a tokio runtime; background transcription
    /// and correction tasks are spawned on it.
    pub fn new(
        audio: Box<dyn AudioSource>,
        recognizer: Arc<RecognizerRegistry>,
        correction: Arc<CorrectionStage>,
        events: broadcast::Sender<PipelineEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                machine: Mutex::new(SessionMachine::new()),
                audio: Mutex::new(audio),
                recognizer,
                correction,
                events,
                language: RwLock::new(None),
                runtime: tokio::runtime::Handle::current(),
            }),
        }
    }

    /// Hotkey press edge: starts a recording, or stops the current one.
    pub fn toggle(&self) {
        self.inner.dispatch(SessionEvent::TogglePressed);
    }

    /// Hotkey release edge. Ignored; captured only so callers need no
    /// edge filtering of their own.
    pub fn release(&self) {
        self.inner.dispatch(SessionEvent::ToggleReleased);
    }

    /// Abort whatever is in flight and return to idle immediately. Results
    /// of already-running background work are discarded.
    pub fn cancel(&self) {
        self.inner.dispatch(SessionEvent::Cancel);
    }

    /// The result consumer took (or dismissed) the pending result.
    pub fn accept_result(&self) {
        self.inner.dispatch(SessionEvent::ResultTaken);
    }

    pub fn state(&self) -> SessionState {
        self.inner.machine.lock().expect("session poisoned").state()
    }

    /// Language hint passed to the recognizer (ISO 639-1), `None` for auto.
    pub fn set_language(&self, language: Option<String>) {
        *self.inner.language.write().expect("language poisoned") = language;
    }
}

impl Inner {
    fn dispatch(self: &Arc<Self>, event: SessionEvent) {
        let effects = {
            let ctx = MachineCtx {
                recognizer_loaded: self.recognizer.is_loaded(),
                correction_ready: self.correction.is_enabled() && self.correction.is_loaded(),
            };
            let mut machine = self.machine.lock().expect("session poisoned");
            machine.handle(event, Instant::now(), &ctx)
        };
        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(self: &Arc<Self>, effect: Effect) {
        match effect {
            Effect::StartCapture => {
                let started = self.audio.lock().expect("audio poisoned").start();
                if let Err(e) = started {
                    verbose!("Capture failed to start: {e}");
                    self.dispatch(SessionEvent::CaptureFailed);
                }
            }
            Effect::AbortCapture => {
                let _ = self.audio.lock().expect("audio poisoned").stop();
            }
            Effect::Transcribe { generation } => self.transcribe(generation),
            Effect::Correct { generation, text } => self.correct(generation, text),
            Effect::PublishResult {
                original,
                corrected,
            } => {
                self.send(PipelineEvent::Result {
                    original,
                    corrected,
                });
            }
            Effect::NotifyStateChanged(state) => self.send(PipelineEvent::StateChanged(state)),
            Effect::NotifyRecordingStarted => self.send(PipelineEvent::RecordingStarted),
            Effect::NotifyProcessing => self.send(PipelineEvent::Processing),
            Effect::NotifyEmpty => self.send(PipelineEvent::Empty),
            Effect::NotifyError(kind) => self.send(PipelineEvent::Error(kind)),
        }
    }

    fn transcribe(self: &Arc<Self>, generation: u64) {
        let samples = match self.audio.lock().expect("audio poisoned").stop() {
            Ok(samples) => samples,
            Err(e) => {
                verbose!("Capture stop failed: {e}");
                self.dispatch(SessionEvent::TranscriptionFailed { generation });
                return;
            }
        };

        if samples.is_empty() {
            // Nothing captured; skip the engine and report an empty result.
            self.dispatch(SessionEvent::TranscriptionSucceeded {
                generation,
                text: String::new(),
            });
            return;
        }

        let Some(engine) = self.recognizer.current() else {
            self.dispatch(SessionEvent::TranscriptionFailed { generation });
            return;
        };

        let language = self.language.read().expect("language poisoned").clone();
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let mut samples = samples;
            pad_silence(&mut samples);

            let result = tokio::task::spawn_blocking(move || {
                engine.transcribe(&samples, language.as_deref())
            })
            .await;

            let event = match result {
                Ok(Ok(text)) => SessionEvent::TranscriptionSucceeded { generation, text },
                Ok(Err(e)) => {
                    verbose!("Transcription failed: {e}");
                    SessionEvent::TranscriptionFailed { generation }
                }
                Err(e) => {
                    verbose!("Transcription task failed: {e}");
                    SessionEvent::TranscriptionFailed { generation }
                }
            };
            inner.dispatch(event);
        });
    }

    fn correct(self: &Arc<Self>, generation: u64, text: String) {
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let corrected = inner.correction.correct(&text).await;
            inner.dispatch(SessionEvent::CorrectionDone {
                generation,
                corrected,
            });
        });
    }

    fn send(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CorrectionEngine, EngineFactory, SpeechEngine};
    use crate::error::{DiktaError, ErrorKind, Result};
    use crate::model::registry::{self, EngineKind, ModelDescriptor};
    use crate::model::store::ModelStore;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeAudio {
        samples: Vec<f32>,
        capturing: bool,
        fail_start: bool,
    }

    impl FakeAudio {
        fn with_samples(samples: Vec<f32>) -> Box<Self> {
            Box::new(Self {
                samples,
                capturing: false,
                fail_start: false,
            })
        }

        fn failing() -> Box<Self> {
            Box::new(Self {
                samples: Vec::new(),
                capturing: false,
                fail_start: true,
            })
        }
    }

    impl crate::audio::AudioSource for FakeAudio {
        fn start(&mut self) -> Result<()> {
            if self.fail_start {
                return Err(DiktaError::Audio("no device".into()));
            }
            self.capturing = true;
            Ok(())
        }

        fn stop(&mut self) -> Result<Vec<f32>> {
            self.capturing = false;
            Ok(self.samples.clone())
        }

        fn is_capturing(&self) -> bool {
            self.capturing
        }

        fn snapshot(&self) -> Vec<f32> {
            self.samples.clone()
        }
    }

    struct FakeSpeech {
        id: String,
        reply: Option<String>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
        seen_samples: Arc<AtomicUsize>,
    }

    impl SpeechEngine for FakeSpeech {
        fn kind(&self) -> EngineKind {
            EngineKind::Whisper
        }

        fn model_id(&self) -> &str {
            &self.id
        }

        fn transcribe(&self, samples: &[f32], _language: Option<&str>) -> Result<String> {
            std::thread::sleep(self.delay);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_samples.store(samples.len(), Ordering::SeqCst);
            Ok(self
                .reply
                .clone()
                .unwrap_or_else(|| format!("from {}", self.id)))
        }
    }

    struct FakeCorrector {
        delay: Duration,
        reply: String,
    }

    impl CorrectionEngine for FakeCorrector {
        fn model_id(&self) -> &str {
            "llm-qwen2.5-0.5b"
        }

        fn correct(&self, _text: &str, _prompt: &str) -> Result<String> {
            std::thread::sleep(self.delay);
            Ok(self.reply.clone())
        }
    }

    #[derive(Clone)]
    struct FakeFactory {
        reply: Option<String>,
        speech_delay: Duration,
        correction_delay: Duration,
        correction_reply: String,
        calls: Arc<AtomicUsize>,
        seen_samples: Arc<AtomicUsize>,
    }

    impl Default for FakeFactory {
        fn default() -> Self {
            Self {
                reply: None,
                speech_delay: Duration::ZERO,
                correction_delay: Duration::ZERO,
                correction_reply: "corrected".into(),
                calls: Arc::new(AtomicUsize::new(0)),
                seen_samples: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl EngineFactory for FakeFactory {
        fn create_speech(
            &self,
            desc: &ModelDescriptor,
            _model_path: &Path,
        ) -> Result<Box<dyn SpeechEngine>> {
            Ok(Box::new(FakeSpeech {
                id: desc.id.to_string(),
                reply: self.reply.clone(),
                delay: self.speech_delay,
                calls: self.calls.clone(),
                seen_samples: self.seen_samples.clone(),
            }))
        }

        fn create_correction(
            &self,
            _desc: &ModelDescriptor,
        ) -> Result<Box<dyn CorrectionEngine>> {
            Ok(Box::new(FakeCorrector {
                delay: self.correction_delay,
                reply: self.correction_reply.clone(),
            }))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        session: CaptureSession,
        recognizer: Arc<RecognizerRegistry>,
        correction: Arc<CorrectionStage>,
        events: broadcast::Receiver<PipelineEvent>,
        factory: FakeFactory,
    }

    fn fixture(factory: FakeFactory, audio: Box<dyn AudioSource>) -> Fixture {
        fixture_with_timeout(factory, audio, Duration::from_secs(5))
    }

    fn fixture_with_timeout(
        factory: FakeFactory,
        audio: Box<dyn AudioSource>,
        correction_timeout: Duration,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ModelStore::with_dir(dir.path().join("models")).unwrap());
        for id in ["whisper-tiny-q5", "whisper-base-q5", "llm-qwen2.5-0.5b"] {
            let desc = registry::get(id).unwrap();
            std::fs::write(store.model_path(desc), b"model").unwrap();
        }

        let shared: Arc<dyn EngineFactory> = Arc::new(factory.clone());
        let recognizer = Arc::new(RecognizerRegistry::new(shared.clone(), store.clone()));
        let correction = Arc::new(CorrectionStage::with_timeout(
            shared,
            store,
            correction_timeout,
        ));
        let (tx, rx) = broadcast::channel(64);
        let session = CaptureSession::new(audio, recognizer.clone(), correction.clone(), tx);

        Fixture {
            _dir: dir,
            session,
            recognizer,
            correction,
            events: rx,
            factory,
        }
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<PipelineEvent>,
        pred: impl Fn(&PipelineEvent) -> bool,
    ) -> PipelineEvent {
        tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                let ev = rx.recv().await.expect("event channel closed");
                if pred(&ev) {
                    return ev;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    async fn record_and_stop(session: &CaptureSession) {
        session.toggle();
        assert_eq!(session.state(), SessionState::Recording);
        tokio::time::sleep(MIN_RECORDING_DURATION + Duration::from_millis(60)).await;
        session.toggle();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_cycle_produces_hello_world() {
        let mut f = fixture(
            FakeFactory {
                reply: Some("hello world".into()),
                ..FakeFactory::default()
            },
            FakeAudio::with_samples(vec![0.1f32; 32_000]),
        );
        f.recognizer.load("whisper-tiny-q5").unwrap();

        record_and_stop(&f.session).await;

        let ev = wait_for(&mut f.events, |e| {
            matches!(e, PipelineEvent::Result { .. })
        })
        .await;
        assert_eq!(ev.final_text(), Some("hello world"));
        assert_eq!(f.session.state(), SessionState::ResultReady);

        f.session.accept_result();
        assert_eq!(f.session.state(), SessionState::Idle);

        // The engine always sees at least the minimum padded length.
        assert!(f.factory.seen_samples.load(Ordering::SeqCst) >= MIN_SAMPLES);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn short_recording_never_reaches_the_engine() {
        let f = fixture(
            FakeFactory::default(),
            FakeAudio::with_samples(vec![0.1f32; 1600]),
        );
        f.recognizer.load("whisper-tiny-q5").unwrap();

        f.session.toggle();
        tokio::time::sleep(Duration::from_millis(100)).await;
        f.session.toggle();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.session.state(), SessionState::Idle);
        assert_eq!(f.factory.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn correction_timeout_falls_back_to_raw_text() {
        let mut f = fixture_with_timeout(
            FakeFactory {
                reply: Some("helo wrld".into()),
                correction_delay: Duration::from_millis(300),
                ..FakeFactory::default()
            },
            FakeAudio::with_samples(vec![0.1f32; 32_000]),
            Duration::from_millis(30),
        );
        f.recognizer.load("whisper-tiny-q5").unwrap();
        f.correction.load("llm-qwen2.5-0.5b").unwrap();

        record_and_stop(&f.session).await;

        let ev = wait_for(&mut f.events, |e| {
            matches!(e, PipelineEvent::Result { .. })
        })
        .await;
        assert_eq!(ev.final_text(), Some("helo wrld"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn correction_success_rewrites_the_result() {
        let mut f = fixture(
            FakeFactory {
                reply: Some("helo wrld".into()),
                correction_reply: "Hello, world.".into(),
                ..FakeFactory::default()
            },
            FakeAudio::with_samples(vec![0.1f32; 32_000]),
        );
        f.recognizer.load("whisper-tiny-q5").unwrap();
        f.correction.load("llm-qwen2.5-0.5b").unwrap();

        record_and_stop(&f.session).await;

        let ev = wait_for(&mut f.events, |e| {
            matches!(e, PipelineEvent::Result { .. })
        })
        .await;
        match ev {
            PipelineEvent::Result {
                original,
                corrected,
            } => {
                assert_eq!(original, "helo wrld");
                assert_eq!(corrected.as_deref(), Some("Hello, world."));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn swap_during_transcription_completes_on_old_engine() {
        let mut f = fixture(
            FakeFactory {
                speech_delay: Duration::from_millis(200),
                ..FakeFactory::default()
            },
            FakeAudio::with_samples(vec![0.1f32; 32_000]),
        );
        f.recognizer.load("whisper-tiny-q5").unwrap();

        record_and_stop(&f.session).await;
        assert_eq!(f.session.state(), SessionState::Transcribing);

        f.recognizer.swap("whisper-base-q5").unwrap();

        let ev = wait_for(&mut f.events, |e| {
            matches!(e, PipelineEvent::Result { .. })
        })
        .await;
        assert_eq!(ev.final_text(), Some("from whisper-tiny-q5"));
        f.session.accept_result();

        record_and_stop(&f.session).await;
        let ev = wait_for(&mut f.events, |e| {
            matches!(e, PipelineEvent::Result { .. })
        })
        .await;
        assert_eq!(ev.final_text(), Some("from whisper-base-q5"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rapid_presses_during_processing_yield_one_cycle() {
        let mut f = fixture(
            FakeFactory {
                speech_delay: Duration::from_millis(150),
                reply: Some("once".into()),
                ..FakeFactory::default()
            },
            FakeAudio::with_samples(vec![0.1f32; 32_000]),
        );
        f.recognizer.load("whisper-tiny-q5").unwrap();

        record_and_stop(&f.session).await;
        // Presses while transcribing are ignored, not queued.
        f.session.toggle();
        f.session.toggle();

        wait_for(&mut f.events, |e| {
            matches!(e, PipelineEvent::Result { .. })
        })
        .await;

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(f.factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.session.state(), SessionState::ResultReady);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_transcription_reports_empty() {
        let mut f = fixture(
            FakeFactory {
                reply: Some("".into()),
                ..FakeFactory::default()
            },
            FakeAudio::with_samples(vec![0.0f32; 32_000]),
        );
        f.recognizer.load("whisper-tiny-q5").unwrap();

        record_and_stop(&f.session).await;

        wait_for(&mut f.events, |e| matches!(e, PipelineEvent::Empty)).await;
        assert_eq!(f.session.state(), SessionState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_capture_skips_the_engine() {
        let mut f = fixture(FakeFactory::default(), FakeAudio::with_samples(Vec::new()));
        f.recognizer.load("whisper-tiny-q5").unwrap();

        record_and_stop(&f.session).await;

        wait_for(&mut f.events, |e| matches!(e, PipelineEvent::Empty)).await;
        assert_eq!(f.factory.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.session.state(), SessionState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn toggle_without_engine_is_refused() {
        let mut f = fixture(FakeFactory::default(), FakeAudio::with_samples(Vec::new()));

        f.session.toggle();
        let ev = wait_for(&mut f.events, |e| matches!(e, PipelineEvent::Error(_))).await;
        assert!(matches!(
            ev,
            PipelineEvent::Error(ErrorKind::EngineNotLoaded)
        ));
        assert_eq!(f.session.state(), SessionState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn capture_start_failure_returns_to_idle() {
        let mut f = fixture(FakeFactory::default(), FakeAudio::failing());
        f.recognizer.load("whisper-tiny-q5").unwrap();

        f.session.toggle();
        let ev = wait_for(&mut f.events, |e| matches!(e, PipelineEvent::Error(_))).await;
        assert!(matches!(ev, PipelineEvent::Error(ErrorKind::Audio)));
        assert_eq!(f.session.state(), SessionState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_discards_the_inflight_result() {
        let mut f = fixture(
            FakeFactory {
                speech_delay: Duration::from_millis(200),
                reply: Some("discarded".into()),
                ..FakeFactory::default()
            },
            FakeAudio::with_samples(vec![0.1f32; 32_000]),
        );
        f.recognizer.load("whisper-tiny-q5").unwrap();

        record_and_stop(&f.session).await;
        f.session.cancel();
        assert_eq!(f.session.state(), SessionState::Idle);

        // The orphaned transcription finishes but publishes nothing.
        tokio::time::sleep(Duration::from_millis(350)).await;
        let mut saw_result = false;
        while let Ok(ev) = f.events.try_recv() {
            if matches!(ev, PipelineEvent::Result { .. }) {
                saw_result = true;
            }
        }
        assert!(!saw_result);
        assert_eq!(f.session.state(), SessionState::Idle);
    }
}
