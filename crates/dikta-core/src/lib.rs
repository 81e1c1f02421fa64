//! dikta-core: hotkey-toggled dictation pipeline.
//!
//! Capture audio, transcribe it with a hot-swappable local engine, run an
//! optional LLM correction pass, and publish the result on a typed event
//! stream. Frontends (CLI, tray, desktop) drive the [`Pipeline`] and render
//! its events.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod pipeline;
pub mod session;
pub mod verbose;

pub use config::{HotkeyConfig, Settings};
pub use error::{DiktaError, ErrorKind, Result};
pub use events::PipelineEvent;
pub use model::registry::{EngineKind, ModelDescriptor, REGISTRY};
pub use model::store::{CancelToken, DownloadProgress, ModelStore};
pub use pipeline::Pipeline;
pub use session::machine::SessionState;
pub use session::CaptureSession;
