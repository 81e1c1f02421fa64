//! Model catalogue and on-disk artifact store.

pub mod registry;
pub mod store;

pub use registry::{EngineKind, ModelDescriptor, REGISTRY};
pub use store::{CancelToken, DownloadProgress, ModelStore};
