//! Static catalogue of downloadable models.
//!
//! Pure data: each entry maps a model id to its engine kind, on-disk name,
//! download URL, nominal size and archive flag. Defined at process start,
//! never mutated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of backend a model artifact targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Whisper,
    Vosk,
    /// Language model used by the correction stage.
    Llm,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Whisper => "whisper",
            EngineKind::Vosk => "vosk",
            EngineKind::Llm => "llm",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EngineKind::Whisper => "Whisper",
            EngineKind::Vosk => "Vosk",
            EngineKind::Llm => "LLM",
        }
    }

    /// Subdirectory under the models dir where artifacts of this kind live.
    pub fn subdir(&self) -> &'static str {
        self.as_str()
    }

    /// Whether models of this kind can be loaded as a recognition engine.
    pub fn is_speech(&self) -> bool {
        matches!(self, EngineKind::Whisper | EngineKind::Vosk)
    }

    /// All speech engine kinds (the correction LLM is handled separately).
    pub fn speech_kinds() -> &'static [EngineKind] {
        &[EngineKind::Whisper, EngineKind::Vosk]
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of one downloadable model.
#[derive(Debug, Clone, Copy)]
pub struct ModelDescriptor {
    /// Unique identifier, e.g. "whisper-tiny-q5".
    pub id: &'static str,
    pub engine: EngineKind,
    /// Human-readable name for listings.
    pub name: &'static str,
    /// File name (or directory name for archives) under the engine subdir.
    pub filename: &'static str,
    pub url: &'static str,
    /// Nominal size in bytes, used for progress when the transfer does not
    /// report a content length.
    pub size: u64,
    /// Whether the artifact is a zip archive unpacked into a directory.
    pub is_archive: bool,
}

const MIB: u64 = 1024 * 1024;

/// All known models.
pub const REGISTRY: &[ModelDescriptor] = &[
    // Whisper, quantized (recommended for CPU)
    ModelDescriptor {
        id: "whisper-tiny-q5",
        engine: EngineKind::Whisper,
        name: "Tiny Q5",
        filename: "ggml-tiny-q5_1.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny-q5_1.bin",
        size: 32 * MIB,
        is_archive: false,
    },
    ModelDescriptor {
        id: "whisper-base-q5",
        engine: EngineKind::Whisper,
        name: "Base Q5",
        filename: "ggml-base-q5_1.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base-q5_1.bin",
        size: 60 * MIB,
        is_archive: false,
    },
    ModelDescriptor {
        id: "whisper-small-q5",
        engine: EngineKind::Whisper,
        name: "Small Q5",
        filename: "ggml-small-q5_1.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small-q5_1.bin",
        size: 190 * MIB,
        is_archive: false,
    },
    ModelDescriptor {
        id: "whisper-turbo",
        engine: EngineKind::Whisper,
        name: "Large v3 Turbo",
        filename: "ggml-large-v3-turbo-q5_0.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large-v3-turbo-q5_0.bin",
        size: 574 * MIB,
        is_archive: false,
    },
    // Whisper, full precision
    ModelDescriptor {
        id: "whisper-tiny",
        engine: EngineKind::Whisper,
        name: "Tiny",
        filename: "ggml-tiny.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.bin",
        size: 75 * MIB,
        is_archive: false,
    },
    ModelDescriptor {
        id: "whisper-base",
        engine: EngineKind::Whisper,
        name: "Base",
        filename: "ggml-base.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin",
        size: 142 * MIB,
        is_archive: false,
    },
    ModelDescriptor {
        id: "whisper-small",
        engine: EngineKind::Whisper,
        name: "Small",
        filename: "ggml-small.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.bin",
        size: 466 * MIB,
        is_archive: false,
    },
    // Vosk (zip archives unpacked into a directory)
    ModelDescriptor {
        id: "vosk-ru-small",
        engine: EngineKind::Vosk,
        name: "Russian Small",
        filename: "vosk-model-small-ru-0.22",
        url: "https://alphacephei.com/vosk/models/vosk-model-small-ru-0.22.zip",
        size: 45 * MIB,
        is_archive: true,
    },
    ModelDescriptor {
        id: "vosk-ru",
        engine: EngineKind::Vosk,
        name: "Russian Large",
        filename: "vosk-model-ru-0.42",
        url: "https://alphacephei.com/vosk/models/vosk-model-ru-0.42.zip",
        size: 1800 * MIB,
        is_archive: true,
    },
    // Correction LLMs
    ModelDescriptor {
        id: "llm-qwen2.5-0.5b",
        engine: EngineKind::Llm,
        name: "Qwen2.5 0.5B",
        filename: "qwen2.5-0.5b-instruct-q4_k_m.gguf",
        url: "https://huggingface.co/Qwen/Qwen2.5-0.5B-Instruct-GGUF/resolve/main/qwen2.5-0.5b-instruct-q4_k_m.gguf",
        size: 386 * MIB,
        is_archive: false,
    },
    ModelDescriptor {
        id: "llm-qwen2.5-1.5b",
        engine: EngineKind::Llm,
        name: "Qwen2.5 1.5B",
        filename: "qwen2.5-1.5b-instruct-q4_k_m.gguf",
        url: "https://huggingface.co/Qwen/Qwen2.5-1.5B-Instruct-GGUF/resolve/main/qwen2.5-1.5b-instruct-q4_k_m.gguf",
        size: 987 * MIB,
        is_archive: false,
    },
    ModelDescriptor {
        id: "llm-qwen2.5-3b",
        engine: EngineKind::Llm,
        name: "Qwen2.5 3B",
        filename: "qwen2.5-3b-instruct-q4_k_m.gguf",
        url: "https://huggingface.co/Qwen/Qwen2.5-3B-Instruct-GGUF/resolve/main/qwen2.5-3b-instruct-q4_k_m.gguf",
        size: 1900 * MIB,
        is_archive: false,
    },
];

/// Default recognition model.
pub fn default_model_id() -> &'static str {
    "whisper-tiny-q5"
}

/// Default correction model.
pub fn default_correction_model_id() -> &'static str {
    "llm-qwen2.5-0.5b"
}

/// Look up a model by id.
pub fn get(id: &str) -> Option<&'static ModelDescriptor> {
    REGISTRY.iter().find(|m| m.id == id)
}

/// All models for the given engine kind.
pub fn by_engine(kind: EngineKind) -> Vec<&'static ModelDescriptor> {
    REGISTRY.iter().filter(|m| m.engine == kind).collect()
}

/// All correction models.
pub fn correction_models() -> Vec<&'static ModelDescriptor> {
    by_engine(EngineKind::Llm)
}
