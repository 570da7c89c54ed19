//! Generation adapters.
//!
//! The engine treats the language model as an opaque text-in/text-out
//! service behind the [`Generator`] trait. The built-in implementation
//! talks to a local Ollama instance; tests use scripted mocks.

use crate::Result;
use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::time::Duration;
use tracing::debug;

/// Options for a generation request.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Sampling temperature. Grounded answering uses low values.
    pub temperature: f64,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// Stop sequences.
    pub stop: Vec<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 1024,
            stop: Vec::new(),
        }
    }
}

/// A completed generation.
#[derive(Debug, Clone, Serialize)]
pub struct Generation {
    /// Generated text.
    pub text: String,
    /// Tokens the model reports having used.
    pub tokens_used: u64,
    /// Why generation stopped.
    pub finish_reason: String,
}

/// Trait for text generation services.
pub trait Generator: Send + Sync {
    /// Name of the underlying model (for provenance records).
    fn model_name(&self) -> &str;

    /// Generates a completion for the prompt.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] variants on service failure.
    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<Generation>;

    /// Generates a completion, invoking `on_token` for each streamed
    /// fragment, and returns the assembled generation.
    ///
    /// The default implementation calls [`Generator::generate`] and
    /// emits the full text as a single fragment.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] variants on service failure.
    fn generate_stream(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        on_token: &mut dyn FnMut(&str),
    ) -> Result<Generation> {
        let generation = self.generate(prompt, options)?;
        on_token(&generation.text);
        Ok(generation)
    }

    /// Returns true when the service is reachable.
    fn is_available(&self) -> bool {
        true
    }
}

/// Generator backed by a local Ollama instance.
pub struct OllamaGenerator {
    client: reqwest::blocking::Client,
    host: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaOptions<'a> {
    temperature: f64,
    num_predict: i64,
    stop: &'a [String],
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions<'a>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: u64,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
}

impl OllamaGenerator {
    /// Creates a generator for the given host and model.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(host: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::GenerationFailed(e.to_string()))?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn connection_error(&self, err: &reqwest::Error) -> ModelError {
        if err.is_connect() || err.is_timeout() {
            ModelError::Unavailable {
                host: self.host.clone(),
                hint: "make sure Ollama is running: `ollama serve`".to_string(),
            }
        } else {
            ModelError::GenerationFailed(err.to_string())
        }
    }

    fn send(&self, prompt: &str, options: &GenerateOptions, stream: bool) -> Result<reqwest::blocking::Response> {
        #[allow(clippy::cast_possible_wrap)]
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens as i64,
                stop: &options.stop,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&request)
            .send()
            .map_err(|e| self.connection_error(&e))?
            .error_for_status()
            .map_err(|e| ModelError::GenerationFailed(e.to_string()))?;

        Ok(response)
    }
}

impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<Generation> {
        debug!(model = %self.model, prompt_len = prompt.len(), "generating");
        let parsed: OllamaResponse = self
            .send(prompt, options, false)?
            .json()
            .map_err(|e| ModelError::GenerationFailed(e.to_string()))?;

        Ok(Generation {
            text: parsed.response,
            tokens_used: parsed.eval_count,
            finish_reason: parsed.done_reason.unwrap_or_else(|| "unknown".to_string()),
        })
    }

    fn generate_stream(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        on_token: &mut dyn FnMut(&str),
    ) -> Result<Generation> {
        let response = self.send(prompt, options, true)?;
        let reader = BufReader::new(response);

        let mut text = String::new();
        let mut tokens_used = 0;
        let mut finish_reason = "unknown".to_string();

        // Streaming responses are line-delimited JSON events ending
        // with a terminal `done` marker.
        for line in reader.lines() {
            let line = line.map_err(|e| ModelError::GenerationFailed(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let event: OllamaResponse = serde_json::from_str(&line)
                .map_err(|e| ModelError::GenerationFailed(format!("bad stream event: {e}")))?;

            if !event.response.is_empty() {
                on_token(&event.response);
                text.push_str(&event.response);
            }
            if event.done {
                tokens_used = event.eval_count;
                if let Some(reason) = event.done_reason {
                    finish_reason = reason;
                }
                break;
            }
        }

        Ok(Generation {
            text,
            tokens_used,
            finish_reason,
        })
    }

    fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.host))
            .send()
            .is_ok_and(|r| r.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedGenerator {
        reply: String,
    }

    impl Generator for ScriptedGenerator {
        fn model_name(&self) -> &str {
            "scripted"
        }

        fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<Generation> {
            Ok(Generation {
                text: self.reply.clone(),
                tokens_used: 7,
                finish_reason: "stop".to_string(),
            })
        }
    }

    #[test]
    fn test_default_options() {
        let options = GenerateOptions::default();
        assert!((options.temperature - 0.1).abs() < f64::EPSILON);
        assert_eq!(options.max_tokens, 1024);
        assert!(options.stop.is_empty());
    }

    #[test]
    fn test_default_stream_impl_emits_full_text() {
        let generator = ScriptedGenerator {
            reply: "streamed answer".to_string(),
        };

        let mut collected = String::new();
        let generation = generator
            .generate_stream("prompt", &GenerateOptions::default(), &mut |t| {
                collected.push_str(t);
            })
            .unwrap();

        assert_eq!(collected, "streamed answer");
        assert_eq!(generation.text, "streamed answer");
        assert_eq!(generation.tokens_used, 7);
    }

    #[test]
    fn test_ollama_host_trimmed() {
        let generator = OllamaGenerator::new("http://localhost:11434/", "mistral", 5).unwrap();
        assert_eq!(generator.host, "http://localhost:11434");
        assert_eq!(generator.model_name(), "mistral");
    }

    #[test]
    fn test_ollama_unreachable_is_unavailable() {
        let generator = OllamaGenerator::new("http://127.0.0.1:1", "mistral", 1).unwrap();
        assert!(!generator.is_available());

        let err = generator
            .generate("hello", &GenerateOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Model(ModelError::Unavailable { .. })
                | crate::Error::Model(ModelError::GenerationFailed(_))
        ));
    }

    #[test]
    fn test_stream_event_parsing() {
        let event: OllamaResponse =
            serde_json::from_str(r#"{"response":"Par","done":false}"#).unwrap();
        assert_eq!(event.response, "Par");
        assert!(!event.done);

        let done: OllamaResponse =
            serde_json::from_str(r#"{"response":"","done":true,"eval_count":42,"done_reason":"stop"}"#)
                .unwrap();
        assert!(done.done);
        assert_eq!(done.eval_count, 42);
        assert_eq!(done.done_reason.as_deref(), Some("stop"));
    }
}
