//! Flat inner-product vector index.
//!
//! Stores unit-norm vectors in a contiguous buffer alongside an ordered
//! chunk-id mapping (the i-th vector belongs to the i-th id). Search is
//! a brute-force scan scored in parallel; removal rebuilds in place.
//!
//! Concurrency follows a single-writer/many-reader discipline: readers
//! take the shared lock, writers mutate a fully-validated state under
//! the exclusive lock, so a concurrent search observes either the pre-
//! or post-write state, never a torn intermediate.
//!
//! Persistence is two files in the index directory: `vectors.index`
//! (binary vector payload) and `chunk_mapping.json` (ordered id list),
//! both written via temp-file rename.

use crate::error::{Result, StorageError};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes identifying the vector file format.
const VECTOR_FILE_MAGIC: &[u8; 4] = b"RLGV";

/// Vector file format version.
const VECTOR_FILE_VERSION: u32 = 1;

/// Header length: magic + version + dimension + count.
const VECTOR_HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Name of the binary vector file.
pub(crate) const VECTOR_FILE: &str = "vectors.index";

/// Name of the id-mapping file.
pub(crate) const MAPPING_FILE: &str = "chunk_mapping.json";

/// Index statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct IndexStats {
    /// Number of vectors in the index.
    pub count: usize,
    /// Vector dimension.
    pub dimension: usize,
    /// In-memory payload size in bytes.
    pub bytes: usize,
}

/// In-memory index state guarded by the lock.
struct FlatState {
    dimension: usize,
    /// Row-major vector payload, `ids.len() * dimension` floats.
    vectors: Vec<f32>,
    /// Ordered chunk ids; position i owns vector row i.
    ids: Vec<String>,
}

impl FlatState {
    const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            ids: Vec::new(),
        }
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.vectors[i * self.dimension..(i + 1) * self.dimension]
    }
}

/// Persistent flat inner-product index.
///
/// # Examples
///
/// ```no_run
/// use rlg_rs::index::VectorIndex;
///
/// let index = VectorIndex::open("data/indices", 384).unwrap();
/// let stats = index.stats();
/// println!("{} vectors", stats.count);
/// ```
pub struct VectorIndex {
    state: RwLock<FlatState>,
    vector_path: PathBuf,
    mapping_path: PathBuf,
}

impl VectorIndex {
    /// Opens the index in the given directory, loading persisted state
    /// when present or starting empty otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted files exist but are corrupt or
    /// disagree with the configured dimension.
    pub fn open<P: AsRef<Path>>(dir: P, dimension: usize) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| StorageError::VectorIndex(e.to_string()))?;

        let index = Self {
            state: RwLock::new(FlatState::new(dimension)),
            vector_path: dir.join(VECTOR_FILE),
            mapping_path: dir.join(MAPPING_FILE),
        };

        if index.vector_path.exists() && index.mapping_path.exists() {
            index.load()?;
        }

        Ok(index)
    }

    /// Appends vectors for the given chunk ids.
    ///
    /// All-or-nothing: every vector is validated against the index
    /// dimension before any row is appended, and the new state is
    /// persisted before the write lock is released.
    ///
    /// # Errors
    ///
    /// Returns an error on id/vector count mismatch, dimension
    /// mismatch, or persistence failure.
    pub fn add(&self, ids: &[String], vectors: &[Vec<f32>]) -> Result<()> {
        if ids.len() != vectors.len() {
            return Err(StorageError::VectorIndex(format!(
                "id/vector count mismatch: {} ids, {} vectors",
                ids.len(),
                vectors.len()
            ))
            .into());
        }
        if ids.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write();
        for vector in vectors {
            if vector.len() != state.dimension {
                return Err(StorageError::VectorIndex(format!(
                    "dimension mismatch: expected {}, got {}",
                    state.dimension,
                    vector.len()
                ))
                .into());
            }
        }

        state.ids.extend(ids.iter().cloned());
        for vector in vectors {
            state.vectors.extend_from_slice(vector);
        }

        Self::persist_state(&state, &self.vector_path, &self.mapping_path)
    }

    /// Removes vectors by chunk id, rebuilding the payload in place.
    ///
    /// Ids that are not present are ignored. Returns the number of
    /// vectors actually removed.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub fn remove(&self, ids: &[String]) -> Result<usize> {
        let removal: HashSet<&str> = ids.iter().map(String::as_str).collect();
        if removal.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.write();
        let keep: Vec<usize> = (0..state.ids.len())
            .filter(|&i| !removal.contains(state.ids[i].as_str()))
            .collect();

        let removed = state.ids.len() - keep.len();
        if removed == 0 {
            return Ok(0);
        }

        let dimension = state.dimension;
        let mut vectors = Vec::with_capacity(keep.len() * dimension);
        let mut kept_ids = Vec::with_capacity(keep.len());
        for &i in &keep {
            vectors.extend_from_slice(state.row(i));
            kept_ids.push(state.ids[i].clone());
        }
        state.vectors = vectors;
        state.ids = kept_ids;

        Self::persist_state(&state, &self.vector_path, &self.mapping_path)?;
        Ok(removed)
    }

    /// Searches for the `k` nearest vectors by inner product.
    ///
    /// Returns up to `min(k, count)` `(chunk_id, score)` pairs sorted by
    /// descending score. For unit-norm corpus and query vectors the
    /// score is the cosine similarity.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        let state = self.state.read();
        if state.ids.is_empty() || k == 0 || query.len() != state.dimension {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = state
            .vectors
            .par_chunks(state.dimension)
            .enumerate()
            .map(|(i, row)| {
                let score: f32 = row.iter().zip(query).map(|(a, b)| a * b).sum();
                (i, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k.min(state.ids.len()));

        scored
            .into_iter()
            .map(|(i, score)| (state.ids[i].clone(), score))
            .collect()
    }

    /// Returns index statistics.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats {
            count: state.ids.len(),
            dimension: state.dimension,
            bytes: state.vectors.len() * std::mem::size_of::<f32>(),
        }
    }

    /// Returns true if the index contains the given chunk id.
    #[must_use]
    pub fn contains(&self, chunk_id: &str) -> bool {
        self.state.read().ids.iter().any(|id| id == chunk_id)
    }

    /// Persists the current state to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    pub fn persist(&self) -> Result<()> {
        let state = self.state.read();
        Self::persist_state(&state, &self.vector_path, &self.mapping_path)
    }

    fn persist_state(state: &FlatState, vector_path: &Path, mapping_path: &Path) -> Result<()> {
        write_atomic(vector_path, &encode_vectors(state))?;
        let mapping = serde_json::to_vec(&state.ids).map_err(StorageError::from)?;
        write_atomic(mapping_path, &mapping)?;
        Ok(())
    }

    /// Reloads state from disk, replacing the in-memory index.
    fn load(&self) -> Result<()> {
        let raw = std::fs::read(&self.vector_path)
            .map_err(|e| StorageError::VectorIndex(format!("read vectors: {e}")))?;
        let mapping_raw = std::fs::read(&self.mapping_path)
            .map_err(|e| StorageError::VectorIndex(format!("read mapping: {e}")))?;

        let mut state = self.state.write();
        let (dimension, vectors) = decode_vectors(&raw)?;
        let ids: Vec<String> = serde_json::from_slice(&mapping_raw).map_err(StorageError::from)?;

        if dimension != state.dimension {
            return Err(StorageError::VectorIndex(format!(
                "persisted dimension {} does not match configured {}",
                dimension, state.dimension
            ))
            .into());
        }
        if ids.len() * dimension != vectors.len() {
            return Err(StorageError::VectorIndex(format!(
                "mapping has {} ids but payload holds {} vectors",
                ids.len(),
                vectors.len() / dimension.max(1)
            ))
            .into());
        }

        state.vectors = vectors;
        state.ids = ids;
        Ok(())
    }
}

fn encode_vectors(state: &FlatState) -> Vec<u8> {
    let mut out = Vec::with_capacity(VECTOR_HEADER_LEN + state.vectors.len() * 4);
    out.extend_from_slice(VECTOR_FILE_MAGIC);
    out.extend_from_slice(&VECTOR_FILE_VERSION.to_le_bytes());
    out.extend_from_slice(&u32::try_from(state.dimension).unwrap_or(u32::MAX).to_le_bytes());
    out.extend_from_slice(&(state.ids.len() as u64).to_le_bytes());
    for value in &state.vectors {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn decode_vectors(raw: &[u8]) -> Result<(usize, Vec<f32>)> {
    let mut cursor = std::io::Cursor::new(raw);

    let mut magic = [0u8; 4];
    cursor
        .read_exact(&mut magic)
        .map_err(|e| StorageError::VectorIndex(format!("truncated header: {e}")))?;
    if &magic != VECTOR_FILE_MAGIC {
        return Err(StorageError::VectorIndex("bad magic bytes".to_string()).into());
    }

    let mut u32_buf = [0u8; 4];
    cursor
        .read_exact(&mut u32_buf)
        .map_err(|e| StorageError::VectorIndex(format!("truncated version: {e}")))?;
    let version = u32::from_le_bytes(u32_buf);
    if version != VECTOR_FILE_VERSION {
        return Err(
            StorageError::VectorIndex(format!("unsupported version: {version}")).into(),
        );
    }

    cursor
        .read_exact(&mut u32_buf)
        .map_err(|e| StorageError::VectorIndex(format!("truncated dimension: {e}")))?;
    let dimension = u32::from_le_bytes(u32_buf) as usize;

    let mut u64_buf = [0u8; 8];
    cursor
        .read_exact(&mut u64_buf)
        .map_err(|e| StorageError::VectorIndex(format!("truncated count: {e}")))?;
    #[allow(clippy::cast_possible_truncation)]
    let count = u64::from_le_bytes(u64_buf) as usize;

    let expected = count * dimension * 4;
    let payload = &raw[VECTOR_HEADER_LEN..];
    if payload.len() != expected {
        return Err(StorageError::VectorIndex(format!(
            "payload size {} does not match header ({count} x {dimension})",
            payload.len()
        ))
        .into());
    }

    let vectors = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok((dimension, vectors))
}

/// Writes bytes to a temp file in the target directory, then renames.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)
            .map_err(|e| StorageError::VectorIndex(format!("create {}: {e}", tmp.display())))?;
        file.write_all(bytes)
            .map_err(|e| StorageError::VectorIndex(format!("write {}: {e}", tmp.display())))?;
        file.sync_all()
            .map_err(|e| StorageError::VectorIndex(format!("sync {}: {e}", tmp.display())))?;
    }
    std::fs::rename(&tmp, path)
        .map_err(|e| StorageError::VectorIndex(format!("rename to {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_open_empty() {
        let temp = TempDir::new().unwrap();
        let index = VectorIndex::open(temp.path(), 4).unwrap();
        let stats = index.stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.dimension, 4);
        assert_eq!(stats.bytes, 0);
    }

    #[test]
    fn test_add_and_search() {
        let temp = TempDir::new().unwrap();
        let index = VectorIndex::open(temp.path(), 4).unwrap();

        index
            .add(&ids(&["a", "b", "c"]), &[unit(4, 0), unit(4, 1), unit(4, 2)])
            .unwrap();

        let results = index.search(&unit(4, 1), 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "b");
        assert!((results[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_returns_at_most_count() {
        let temp = TempDir::new().unwrap();
        let index = VectorIndex::open(temp.path(), 4).unwrap();
        index.add(&ids(&["a"]), &[unit(4, 0)]).unwrap();

        let results = index.search(&unit(4, 0), 10);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_search_empty_index() {
        let temp = TempDir::new().unwrap();
        let index = VectorIndex::open(temp.path(), 4).unwrap();
        assert!(index.search(&unit(4, 0), 5).is_empty());
    }

    #[test]
    fn test_search_wrong_dimension_query() {
        let temp = TempDir::new().unwrap();
        let index = VectorIndex::open(temp.path(), 4).unwrap();
        index.add(&ids(&["a"]), &[unit(4, 0)]).unwrap();
        assert!(index.search(&unit(3, 0), 5).is_empty());
    }

    #[test]
    fn test_add_dimension_mismatch_rejected_atomically() {
        let temp = TempDir::new().unwrap();
        let index = VectorIndex::open(temp.path(), 4).unwrap();

        let result = index.add(&ids(&["a", "b"]), &[unit(4, 0), unit(3, 0)]);
        assert!(result.is_err());
        // Nothing was appended.
        assert_eq!(index.stats().count, 0);
    }

    #[test]
    fn test_add_count_mismatch_rejected() {
        let temp = TempDir::new().unwrap();
        let index = VectorIndex::open(temp.path(), 4).unwrap();
        assert!(index.add(&ids(&["a"]), &[]).is_err());
    }

    #[test]
    fn test_remove_decrements_count_exactly() {
        let temp = TempDir::new().unwrap();
        let index = VectorIndex::open(temp.path(), 4).unwrap();
        index
            .add(&ids(&["a", "b", "c"]), &[unit(4, 0), unit(4, 1), unit(4, 2)])
            .unwrap();

        let removed = index.remove(&ids(&["a", "c", "missing"])).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.stats().count, 1);

        let results = index.search(&unit(4, 0), 10);
        assert!(results.iter().all(|(id, _)| id != "a" && id != "c"));
        assert!(index.contains("b"));
    }

    #[test]
    fn test_remove_absent_ids_is_noop() {
        let temp = TempDir::new().unwrap();
        let index = VectorIndex::open(temp.path(), 4).unwrap();
        index.add(&ids(&["a"]), &[unit(4, 0)]).unwrap();
        assert_eq!(index.remove(&ids(&["zz"])).unwrap(), 0);
        assert_eq!(index.stats().count, 1);
    }

    #[test]
    fn test_persist_and_reload() {
        let temp = TempDir::new().unwrap();
        {
            let index = VectorIndex::open(temp.path(), 4).unwrap();
            index
                .add(&ids(&["a", "b"]), &[unit(4, 0), unit(4, 3)])
                .unwrap();
        }

        // Fresh handle must restore vectors and id mapping.
        let reloaded = VectorIndex::open(temp.path(), 4).unwrap();
        assert_eq!(reloaded.stats().count, 2);
        let results = reloaded.search(&unit(4, 3), 1);
        assert_eq!(results[0].0, "b");
    }

    #[test]
    fn test_reload_dimension_mismatch_fails() {
        let temp = TempDir::new().unwrap();
        {
            let index = VectorIndex::open(temp.path(), 4).unwrap();
            index.add(&ids(&["a"]), &[unit(4, 0)]).unwrap();
        }
        assert!(VectorIndex::open(temp.path(), 8).is_err());
    }

    #[test]
    fn test_readd_after_remove_allowed() {
        let temp = TempDir::new().unwrap();
        let index = VectorIndex::open(temp.path(), 4).unwrap();
        index.add(&ids(&["a"]), &[unit(4, 0)]).unwrap();
        index.remove(&ids(&["a"])).unwrap();
        index.add(&ids(&["a"]), &[unit(4, 1)]).unwrap();

        let results = index.search(&unit(4, 1), 1);
        assert_eq!(results[0].0, "a");
    }

    #[test]
    fn test_concurrent_reads_during_write() {
        use std::sync::Arc;

        let temp = TempDir::new().unwrap();
        let index = Arc::new(VectorIndex::open(temp.path(), 4).unwrap());
        index.add(&ids(&["seed"]), &[unit(4, 0)]).unwrap();

        let writer = {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                for i in 0..20 {
                    index
                        .add(&[format!("w{i}")], &[unit(4, i % 4)])
                        .unwrap();
                }
            })
        };

        // Readers must always observe a consistent (id, vector) pairing.
        for _ in 0..50 {
            let results = index.search(&unit(4, 0), 100);
            for (id, score) in results {
                assert!(!id.is_empty());
                assert!(score.is_finite());
            }
        }

        writer.join().unwrap();
        assert_eq!(index.stats().count, 21);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn add_then_remove_restores_count(n in 1usize..20) {
                let temp = TempDir::new().unwrap();
                let index = VectorIndex::open(temp.path(), 4).unwrap();

                let ids: Vec<String> = (0..n).map(|i| format!("c{i}")).collect();
                let vectors: Vec<Vec<f32>> = (0..n).map(|i| unit(4, i % 4)).collect();
                index.add(&ids, &vectors).unwrap();
                prop_assert_eq!(index.stats().count, n);

                let removed = index.remove(&ids).unwrap();
                prop_assert_eq!(removed, n);
                prop_assert_eq!(index.stats().count, 0);
                prop_assert!(index.search(&unit(4, 0), 10).is_empty());
            }
        }
    }
}
