//! Persistent vector index for dense retrieval.

mod vector;

pub use vector::{IndexStats, VectorIndex};
