//! Ollama embedding adapter.
//!
//! Calls a local Ollama instance's embeddings endpoint and renormalizes
//! the result so the index's inner products stay cosine similarities.

use crate::Result;
use crate::embedding::{Embedder, normalize_in_place};
use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embedder backed by an Ollama embedding model.
pub struct OllamaEmbedder {
    client: reqwest::blocking::Client,
    host: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    /// Creates a new Ollama embedder.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(host: &str, model: &str, dimensions: usize, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::GenerationFailed(e.to_string()))?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
        })
    }

    fn request(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.host))
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    ModelError::Unavailable {
                        host: self.host.clone(),
                        hint: "make sure Ollama is running: `ollama serve`".to_string(),
                    }
                } else {
                    ModelError::GenerationFailed(e.to_string())
                }
            })?;

        let parsed: EmbeddingResponse = response
            .error_for_status()
            .and_then(reqwest::blocking::Response::json)
            .map_err(|e| ModelError::GenerationFailed(e.to_string()))?;

        if parsed.embedding.len() != self.dimensions {
            return Err(ModelError::DimensionMismatch {
                expected: self.dimensions,
                actual: parsed.embedding.len(),
            }
            .into());
        }

        let mut embedding = parsed.embedding;
        normalize_in_place(&mut embedding);
        Ok(embedding)
    }
}

impl Embedder for OllamaEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimensions]);
        }
        self.request(text)
    }
}
