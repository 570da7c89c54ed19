//! Engine configuration.
//!
//! All settings are read from the environment with offline-first
//! defaults; every path defaults under `DATA_DIR` so the data set is
//! portable. Fusion weights are validated at construction so a bad
//! deployment fails at startup, not mid-query.

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Central configuration for the RLG engine.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Application name (used in logs and CLI output).
    pub app_name: String,
    /// Debug mode flag.
    pub debug: bool,

    /// Root data directory.
    pub data_dir: PathBuf,
    /// Directory for saved uploads.
    pub upload_dir: PathBuf,
    /// Directory for the vector index files.
    pub index_dir: PathBuf,
    /// Directory for model caches.
    pub cache_dir: PathBuf,
    /// Path to the `SQLite` database.
    pub database_url: PathBuf,

    /// Embedding backend selector (`hashed` or `ollama:<model>`).
    pub embedding_model: String,
    /// Embedding vector dimension.
    pub embedding_dimension: usize,
    /// Batch size for embedding calls.
    pub embedding_batch_size: usize,

    /// Ollama host URL.
    pub ollama_host: String,
    /// Ollama generation model name.
    pub ollama_model: String,
    /// Ollama request timeout in seconds.
    pub ollama_timeout: u64,

    /// Weight of the BM25 score in fusion.
    pub bm25_weight: f64,
    /// Weight of the dense score in fusion.
    pub dense_weight: f64,
    /// Weight of the structural score in fusion.
    pub structural_weight: f64,

    /// Number of candidates fetched from each index before fusion.
    pub top_k_retrieval: usize,
    /// Number of chunks kept after reranking.
    pub top_k_rerank: usize,

    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters (optional knob).
    pub chunk_overlap: usize,

    /// Minimum grounding score for an answer to be considered valid.
    pub min_grounding_confidence: f64,
    /// Whether answers must carry exact citations.
    pub require_exact_citation: bool,
    /// Token budget for generation.
    pub max_generation_tokens: usize,

    /// OCR language hint passed to image extractors.
    pub ocr_language: String,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            app_name: "RLG Engine".to_string(),
            debug: false,
            upload_dir: data_dir.join("uploads"),
            index_dir: data_dir.join("indices"),
            cache_dir: data_dir.join("cache"),
            database_url: data_dir.join("rlg.db"),
            data_dir,
            embedding_model: "hashed".to_string(),
            embedding_dimension: 384,
            embedding_batch_size: 32,
            ollama_host: "http://localhost:11434".to_string(),
            ollama_model: "mistral".to_string(),
            ollama_timeout: 120,
            bm25_weight: 0.3,
            dense_weight: 0.5,
            structural_weight: 0.2,
            top_k_retrieval: 20,
            top_k_rerank: 5,
            chunk_size: 512,
            chunk_overlap: 50,
            min_grounding_confidence: 0.7,
            require_exact_citation: true,
            max_generation_tokens: 1024,
            ocr_language: "eng".to_string(),
        }
    }
}

/// Reads an environment variable, parsing it with the given function.
fn env_parse<T, F>(key: &str, default: T, parse: F) -> Result<T>
where
    F: FnOnce(&str) -> Option<T>,
{
    match std::env::var(key) {
        Ok(raw) => parse(&raw).ok_or_else(|| Error::Config {
            message: format!("invalid value for {key}: {raw}"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    env_parse(key, default, |raw| {
        match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    })
}

impl Settings {
    /// Builds settings from the environment, falling back to defaults.
    ///
    /// Path keys (`UPLOAD_DIR`, `INDEX_DIR`, `CACHE_DIR`, `DATABASE_URL`)
    /// default to locations under `DATA_DIR`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable fails to parse or the
    /// fusion weights are invalid.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let data_dir = PathBuf::from(env_string("DATA_DIR", "data"));
        let upload_dir = std::env::var("UPLOAD_DIR")
            .map_or_else(|_| data_dir.join("uploads"), PathBuf::from);
        let index_dir =
            std::env::var("INDEX_DIR").map_or_else(|_| data_dir.join("indices"), PathBuf::from);
        let cache_dir =
            std::env::var("CACHE_DIR").map_or_else(|_| data_dir.join("cache"), PathBuf::from);
        let database_url =
            std::env::var("DATABASE_URL").map_or_else(|_| data_dir.join("rlg.db"), PathBuf::from);

        let settings = Self {
            app_name: env_string("APP_NAME", &defaults.app_name),
            debug: env_bool("DEBUG", defaults.debug)?,
            data_dir,
            upload_dir,
            index_dir,
            cache_dir,
            database_url,
            embedding_model: env_string("EMBEDDING_MODEL", &defaults.embedding_model),
            embedding_dimension: env_parse(
                "EMBEDDING_DIMENSION",
                defaults.embedding_dimension,
                |r| r.parse().ok(),
            )?,
            embedding_batch_size: env_parse(
                "EMBEDDING_BATCH_SIZE",
                defaults.embedding_batch_size,
                |r| r.parse().ok(),
            )?,
            ollama_host: env_string("OLLAMA_HOST", &defaults.ollama_host),
            ollama_model: env_string("OLLAMA_MODEL", &defaults.ollama_model),
            ollama_timeout: env_parse("OLLAMA_TIMEOUT", defaults.ollama_timeout, |r| {
                r.parse().ok()
            })?,
            bm25_weight: env_parse("BM25_WEIGHT", defaults.bm25_weight, |r| r.parse().ok())?,
            dense_weight: env_parse("DENSE_WEIGHT", defaults.dense_weight, |r| r.parse().ok())?,
            structural_weight: env_parse("STRUCTURAL_WEIGHT", defaults.structural_weight, |r| {
                r.parse().ok()
            })?,
            top_k_retrieval: env_parse("TOP_K_RETRIEVAL", defaults.top_k_retrieval, |r| {
                r.parse().ok()
            })?,
            top_k_rerank: env_parse("TOP_K_RERANK", defaults.top_k_rerank, |r| r.parse().ok())?,
            chunk_size: env_parse("CHUNK_SIZE", defaults.chunk_size, |r| r.parse().ok())?,
            chunk_overlap: env_parse("CHUNK_OVERLAP", defaults.chunk_overlap, |r| {
                r.parse().ok()
            })?,
            min_grounding_confidence: env_parse(
                "MIN_GROUNDING_CONFIDENCE",
                defaults.min_grounding_confidence,
                |r| r.parse().ok(),
            )?,
            require_exact_citation: env_bool(
                "REQUIRE_EXACT_CITATION",
                defaults.require_exact_citation,
            )?,
            max_generation_tokens: env_parse(
                "MAX_GENERATION_TOKENS",
                defaults.max_generation_tokens,
                |r| r.parse().ok(),
            )?,
            ocr_language: env_string("OCR_LANGUAGE", &defaults.ocr_language),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the fusion weights do not sum to 1.0,
    /// the chunk size is zero, or a threshold is out of range.
    pub fn validate(&self) -> Result<()> {
        let weight_sum = self.bm25_weight + self.dense_weight + self.structural_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(Error::Config {
                message: format!(
                    "fusion weights must sum to 1.0 (bm25 {} + dense {} + structural {} = {weight_sum})",
                    self.bm25_weight, self.dense_weight, self.structural_weight
                ),
            });
        }
        if self.chunk_size == 0 {
            return Err(Error::Config {
                message: "CHUNK_SIZE must be > 0".to_string(),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config {
                message: format!(
                    "CHUNK_OVERLAP ({}) must be less than CHUNK_SIZE ({})",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.min_grounding_confidence) {
            return Err(Error::Config {
                message: "MIN_GROUNDING_CONFIDENCE must be in [0, 1]".to_string(),
            });
        }
        if self.embedding_dimension == 0 {
            return Err(Error::Config {
                message: "EMBEDDING_DIMENSION must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Creates the data directories if they are missing.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.data_dir,
            &self.upload_dir,
            &self.index_dir,
            &self.cache_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| crate::error::IoError::DirectoryFailed {
                path: dir.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}
