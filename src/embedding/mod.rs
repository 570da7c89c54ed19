//! Embedding adapters for dense retrieval and grounding checks.
//!
//! The engine treats the embedding model as an opaque function from
//! text to a unit-norm vector. Two adapters are provided:
//!
//! - [`HashedEmbedder`]: deterministic lexical pseudo-embeddings, no
//!   external service required (the default).
//! - [`OllamaEmbedder`]: calls a local Ollama embedding model.
//!
//! Empty input always produces the zero vector, which callers treat as
//! "no match".

mod hashed;
mod ollama;

pub use hashed::HashedEmbedder;
pub use ollama::OllamaEmbedder;

use crate::Result;
use crate::config::Settings;

/// Default embedding dimensions (all-MiniLM-L6-v2 class models).
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding generators.
///
/// Implementations must be thread-safe (`Send + Sync`) and must return
/// unit-norm vectors (or the zero vector for empty input) so that the
/// inner product equals cosine similarity.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// The default implementation calls `embed` for each text
    /// sequentially. Implementations may override this for batching.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails for any text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Creates an embedder from the configured `EMBEDDING_MODEL` selector.
///
/// `hashed` (the default) selects the deterministic lexical embedder;
/// `ollama:<model>` selects the Ollama embedding endpoint.
///
/// # Errors
///
/// Returns an error if the Ollama client cannot be constructed.
pub fn create_embedder(settings: &Settings) -> Result<Box<dyn Embedder>> {
    match settings.embedding_model.strip_prefix("ollama:") {
        Some(model) => Ok(Box::new(OllamaEmbedder::new(
            &settings.ollama_host,
            model,
            settings.embedding_dimension,
            settings.ollama_timeout,
        )?)),
        None => Ok(Box::new(HashedEmbedder::new(settings.embedding_dimension))),
    }
}

/// Computes the inner product of two unit-norm embedding vectors.
///
/// For unit-norm inputs this equals cosine similarity. Returns 0.0 for
/// mismatched lengths or zero vectors.
#[must_use]
pub fn dot_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scales a vector to unit length in place. Zero vectors are left as-is.
pub fn normalize_in_place(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for val in vector.iter_mut() {
            *val /= magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((dot_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dot_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(dot_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_dot_similarity_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((dot_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dot_similarity_mismatched_lengths() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!(dot_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_in_place() {
        let mut v = vec![3.0, 4.0];
        normalize_in_place(&mut v);
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut v = vec![0.0, 0.0];
        normalize_in_place(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn test_create_embedder_defaults_to_hashed() {
        let settings = Settings::default();
        let embedder = create_embedder(&settings).unwrap();
        assert_eq!(embedder.dimensions(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn test_embed_batch_default_impl() {
        let embedder = HashedEmbedder::new(DEFAULT_DIMENSIONS);
        let texts = vec!["hello", "world"];
        let embeddings = Embedder::embed_batch(&embedder, &texts).unwrap();
        assert_eq!(embeddings.len(), 2);
        for embedding in &embeddings {
            assert_eq!(embedding.len(), DEFAULT_DIMENSIONS);
        }
    }
}
