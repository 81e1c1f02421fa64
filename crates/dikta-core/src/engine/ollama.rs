//! Transcript correction via a local Ollama server.
//!
//! Correction models in the catalogue map to Ollama model tags; the gguf
//! artifacts managed by the store match what `ollama pull` fetches, so the
//! catalogue stays the single list of what the app can use.

use std::time::Duration;

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::{DiktaError, Result};
use crate::model::registry::{EngineKind, ModelDescriptor};
use crate::verbose;

use super::CorrectionEngine;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub const DEFAULT_CORRECTION_PROMPT: &str = "You fix speech recognition errors. \
Correct misrecognized words and add punctuation. Keep the original language \
and meaning. Output only the corrected text, no explanations.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static HTTP_CLIENT: Lazy<std::result::Result<reqwest::blocking::Client, String>> =
    Lazy::new(|| {
        reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| e.to_string())
    });

fn http_client() -> Result<&'static reqwest::blocking::Client> {
    HTTP_CLIENT
        .as_ref()
        .map_err(|e| DiktaError::Correction(format!("build http client: {e}")))
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

pub struct OllamaCorrector {
    model_id: String,
    tag: String,
    base_url: String,
}

impl OllamaCorrector {
    pub fn new(desc: &ModelDescriptor) -> Result<Self> {
        Self::with_url(desc, DEFAULT_OLLAMA_URL)
    }

    pub fn with_url(desc: &ModelDescriptor, base_url: &str) -> Result<Self> {
        if desc.engine != EngineKind::Llm {
            return Err(DiktaError::EngineInit(format!(
                "{} is not a correction model",
                desc.id
            )));
        }
        Ok(Self {
            model_id: desc.id.to_string(),
            tag: ollama_tag(desc.id),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Ollama tag for a catalogue model id, e.g. `llm-qwen2.5-0.5b` →
/// `qwen2.5:0.5b`.
fn ollama_tag(model_id: &str) -> String {
    match model_id.strip_prefix("llm-") {
        Some(rest) => match rest.rsplit_once('-') {
            Some((family, size)) => format!("{family}:{size}"),
            None => rest.to_string(),
        },
        None => model_id.to_string(),
    }
}

impl CorrectionEngine for OllamaCorrector {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn correct(&self, text: &str, prompt: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let url = format!("{}/api/chat", self.base_url);
        verbose!("Correction request to {} ({} chars)", self.tag, text.len());

        let response = http_client()?
            .post(&url)
            .json(&serde_json::json!({
                "model": self.tag,
                "messages": [
                    {"role": "system", "content": prompt},
                    {"role": "user", "content": text}
                ],
                "stream": false,
                "options": {
                    "temperature": 0.1,
                    "num_predict": 500
                }
            }))
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    DiktaError::Correction(format!(
                        "cannot connect to Ollama at {} (is it running?)",
                        self.base_url
                    ))
                } else {
                    DiktaError::Correction(format!("ollama request: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(DiktaError::Correction(format!(
                "ollama returned {status}: {body}"
            )));
        }

        let chat: ChatResponse = response
            .json()
            .map_err(|e| DiktaError::Correction(format!("parse ollama response: {e}")))?;

        Ok(chat.message.content.trim().to_string())
    }
}
