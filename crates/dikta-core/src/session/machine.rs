//! Capture session state machine.
//!
//! Pure transition logic: `handle` consumes an event plus a snapshot of
//! collaborator facts and returns the effects to run, with no locks held and
//! no I/O. The orchestrator in the parent module executes the effects.
//!
//! A generation counter keys every background task spawned for a cycle;
//! results arriving with a stale generation (the cycle was cancelled or
//! superseded) are discarded silently.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::audio::SILENCE_PAD_SAMPLES;
use crate::error::ErrorKind;

/// Recordings shorter than this are treated as accidental hotkey triggers
/// and abort without invoking the engine.
pub const MIN_RECORDING_DURATION: Duration = Duration::from_millis(500);

/// Minimum sample count handed to an engine; shorter captures are padded
/// with silence up to at least this length.
pub const MIN_SAMPLES: usize = SILENCE_PAD_SAMPLES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    Transcribing,
    Correcting,
    ResultReady,
}

/// Facts about collaborators sampled at dispatch time.
#[derive(Debug, Clone, Copy)]
pub struct MachineCtx {
    pub recognizer_loaded: bool,
    /// Correction stage is both enabled and has a model loaded.
    pub correction_ready: bool,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Hotkey press edge. Toggle semantics: starts or stops a recording.
    TogglePressed,
    /// Hotkey release edge. Never actionable.
    ToggleReleased,
    /// Audio capture failed to start.
    CaptureFailed,
    TranscriptionSucceeded { generation: u64, text: String },
    TranscriptionFailed { generation: u64 },
    /// Correction finished; `None` means fall back to the raw transcript.
    CorrectionDone {
        generation: u64,
        corrected: Option<String>,
    },
    /// The result consumer accepted or dismissed the result.
    ResultTaken,
    /// Explicit cancel from any state.
    Cancel,
}

/// Side effects the orchestrator must execute, in order, outside the lock.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartCapture,
    /// Stop capture and discard the samples (short recording or cancel).
    AbortCapture,
    /// Stop capture and transcribe the samples on a background task.
    Transcribe { generation: u64 },
    /// Run the correction pass on a background task.
    Correct { generation: u64, text: String },
    PublishResult {
        original: String,
        corrected: Option<String>,
    },
    NotifyStateChanged(SessionState),
    NotifyRecordingStarted,
    NotifyProcessing,
    NotifyEmpty,
    NotifyError(ErrorKind),
}

pub struct SessionMachine {
    state: SessionState,
    generation: u64,
    started_at: Option<Instant>,
    raw_text: Option<String>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
            started_at: None,
            raw_text: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn handle(&mut self, event: SessionEvent, now: Instant, ctx: &MachineCtx) -> Vec<Effect> {
        match event {
            SessionEvent::TogglePressed => self.on_toggle(now, ctx),
            SessionEvent::ToggleReleased => Vec::new(),
            SessionEvent::CaptureFailed => self.on_capture_failed(),
            SessionEvent::TranscriptionSucceeded { generation, text } => {
                self.on_transcribed(generation, text, ctx)
            }
            SessionEvent::TranscriptionFailed { generation } => {
                self.on_transcription_failed(generation)
            }
            SessionEvent::CorrectionDone {
                generation,
                corrected,
            } => self.on_corrected(generation, corrected),
            SessionEvent::ResultTaken => self.on_result_taken(),
            SessionEvent::Cancel => self.on_cancel(),
        }
    }

    fn on_toggle(&mut self, now: Instant, ctx: &MachineCtx) -> Vec<Effect> {
        match self.state {
            SessionState::Idle => {
                if !ctx.recognizer_loaded {
                    return vec![Effect::NotifyError(ErrorKind::EngineNotLoaded)];
                }
                self.generation += 1;
                self.state = SessionState::Recording;
                self.started_at = Some(now);
                self.raw_text = None;
                vec![
                    Effect::StartCapture,
                    Effect::NotifyStateChanged(SessionState::Recording),
                    Effect::NotifyRecordingStarted,
                ]
            }
            SessionState::Recording => {
                let elapsed = self
                    .started_at
                    .map(|t| now.duration_since(t))
                    .unwrap_or(Duration::ZERO);
                if elapsed < MIN_RECORDING_DURATION {
                    // Accidental trigger, not an error.
                    self.to_idle();
                    return vec![
                        Effect::AbortCapture,
                        Effect::NotifyStateChanged(SessionState::Idle),
                    ];
                }
                self.state = SessionState::Transcribing;
                vec![
                    Effect::Transcribe {
                        generation: self.generation,
                    },
                    Effect::NotifyStateChanged(SessionState::Transcribing),
                    Effect::NotifyProcessing,
                ]
            }
            // A press while an operation is in flight is ignored, not queued.
            _ => Vec::new(),
        }
    }

    fn on_capture_failed(&mut self) -> Vec<Effect> {
        if self.state != SessionState::Recording {
            return Vec::new();
        }
        self.to_idle();
        vec![
            Effect::NotifyError(ErrorKind::Audio),
            Effect::NotifyStateChanged(SessionState::Idle),
        ]
    }

    fn on_transcribed(&mut self, generation: u64, text: String, ctx: &MachineCtx) -> Vec<Effect> {
        if generation != self.generation || self.state != SessionState::Transcribing {
            return Vec::new();
        }
        if text.trim().is_empty() {
            self.to_idle();
            return vec![
                Effect::NotifyEmpty,
                Effect::NotifyStateChanged(SessionState::Idle),
            ];
        }
        if ctx.correction_ready {
            self.state = SessionState::Correcting;
            self.raw_text = Some(text.clone());
            return vec![
                Effect::Correct {
                    generation: self.generation,
                    text,
                },
                Effect::NotifyStateChanged(SessionState::Correcting),
            ];
        }
        self.state = SessionState::ResultReady;
        vec![
            Effect::PublishResult {
                original: text,
                corrected: None,
            },
            Effect::NotifyStateChanged(SessionState::ResultReady),
        ]
    }

    fn on_transcription_failed(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.generation || self.state != SessionState::Transcribing {
            return Vec::new();
        }
        self.to_idle();
        vec![
            Effect::NotifyError(ErrorKind::Transcription),
            Effect::NotifyStateChanged(SessionState::Idle),
        ]
    }

    fn on_corrected(&mut self, generation: u64, corrected: Option<String>) -> Vec<Effect> {
        if generation != self.generation || self.state != SessionState::Correcting {
            return Vec::new();
        }
        let original = self.raw_text.take().unwrap_or_default();
        self.state = SessionState::ResultReady;
        vec![
            Effect::PublishResult {
                original,
                corrected,
            },
            Effect::NotifyStateChanged(SessionState::ResultReady),
        ]
    }

    fn on_result_taken(&mut self) -> Vec<Effect> {
        if self.state != SessionState::ResultReady {
            return Vec::new();
        }
        self.to_idle();
        vec![Effect::NotifyStateChanged(SessionState::Idle)]
    }

    fn on_cancel(&mut self) -> Vec<Effect> {
        let was_recording = self.state == SessionState::Recording;
        if self.state == SessionState::Idle {
            // Still bump: a cancel must orphan any task that is unwinding.
            self.generation += 1;
            return Vec::new();
        }
        self.to_idle();
        let mut effects = Vec::new();
        if was_recording {
            effects.push(Effect::AbortCapture);
        }
        effects.push(Effect::NotifyStateChanged(SessionState::Idle));
        effects
    }

    fn to_idle(&mut self) {
        self.state = SessionState::Idle;
        self.generation += 1;
        self.started_at = None;
        self.raw_text = None;
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}
