//! Speech engine backed by the Vosk offline recognizer.

use std::path::Path;

use vosk::{Model, Recognizer};

use crate::audio::SAMPLE_RATE;
use crate::error::{DiktaError, Result};
use crate::model::registry::EngineKind;

use super::SpeechEngine;

pub struct VoskEngine {
    model: Model,
    model_id: String,
}

impl VoskEngine {
    pub fn load(model_id: &str, model_path: &Path) -> Result<Self> {
        if !model_path.is_dir() {
            return Err(DiktaError::EngineInit(format!(
                "vosk model directory not found at {}",
                model_path.display()
            )));
        }

        let model = Model::new(model_path.to_string_lossy().as_ref()).ok_or_else(|| {
            DiktaError::EngineInit(format!("load vosk model from {}", model_path.display()))
        })?;

        Ok(Self {
            model,
            model_id: model_id.to_string(),
        })
    }
}

impl SpeechEngine for VoskEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Vosk
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn transcribe(&self, samples: &[f32], _language: Option<&str>) -> Result<String> {
        // Vosk models are single-language; the model choice decides it.
        let mut recognizer = Recognizer::new(&self.model, SAMPLE_RATE as f32).ok_or_else(|| {
            DiktaError::Transcription("create vosk recognizer".into())
        })?;

        let pcm16 = to_pcm16(samples);
        recognizer
            .accept_waveform(&pcm16)
            .map_err(|e| DiktaError::Transcription(format!("vosk decode: {e}")))?;

        let text = recognizer
            .final_result()
            .single()
            .map(|r| r.text.to_string())
            .unwrap_or_default();

        Ok(text.trim().to_string())
    }
}

/// Convert normalized f32 samples to the 16-bit PCM Vosk expects.
fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_clamps_out_of_range_samples() {
        let pcm = to_pcm16(&[0.0, 1.0, -1.0, 2.0, -2.0]);
        assert_eq!(pcm[0], 0);
        assert_eq!(pcm[1], i16::MAX);
        assert_eq!(pcm[3], i16::MAX);
        assert!(pcm[2] <= -i16::MAX + 1);
        assert_eq!(pcm[2], pcm[4]);
    }
}
