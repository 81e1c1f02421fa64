//! Speech engine backed by whisper.cpp via whisper-rs.

use std::path::Path;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::{DiktaError, Result};
use crate::model::registry::EngineKind;

use super::SpeechEngine;

pub struct WhisperEngine {
    ctx: WhisperContext,
    model_id: String,
}

impl WhisperEngine {
    pub fn load(model_id: &str, model_path: &Path) -> Result<Self> {
        if !model_path.exists() {
            return Err(DiktaError::EngineInit(format!(
                "whisper model not found at {}",
                model_path.display()
            )));
        }

        let path = model_path.to_string_lossy();
        let ctx = WhisperContext::new_with_params(&path, WhisperContextParameters::default())
            .map_err(|e| DiktaError::EngineInit(format!("load whisper model: {e}")))?;

        Ok(Self {
            ctx,
            model_id: model_id.to_string(),
        })
    }
}

impl SpeechEngine for WhisperEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Whisper
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn transcribe(&self, samples: &[f32], language: Option<&str>) -> Result<String> {
        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| DiktaError::Transcription(format!("create whisper state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        // None = auto-detect.
        params.set_language(language);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| DiktaError::Transcription(format!("whisper inference: {e}")))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| DiktaError::Transcription(format!("read segments: {e}")))?;

        let mut text = String::new();
        for i in 0..num_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| DiktaError::Transcription(format!("read segment {i}: {e}")))?;
            text.push_str(&segment);
        }

        Ok(text.trim().to_string())
    }
}
