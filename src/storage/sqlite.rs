//! `SQLite` storage implementation.
//!
//! Persists documents, chunks, and query/answer analytics with full
//! transaction support. The FTS5 lexical index is kept in sync with the
//! chunks table by triggers, so lexical-index maintenance is atomic
//! with chunk insertion and deletion.

// SQLite stores all integers as i64. These casts are intentional and safe
// because we only store non-negative values that fit the target types.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::core::{Chunk, ChunkRole, Document, DocumentStatus, DocumentType, now_timestamp};
use crate::error::{Result, StorageError};
use crate::storage::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL,
};
use crate::storage::{AnswerRecord, QueryRecord, QueryStats, StorageStats};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};

/// SQLite-backed store for documents, chunks, and analytics.
///
/// # Examples
///
/// ```no_run
/// use rlg_rs::storage::SqliteStorage;
///
/// let mut storage = SqliteStorage::open("data/rlg.db").unwrap();
/// storage.init().unwrap();
/// ```
pub struct SqliteStorage {
    /// `SQLite` connection.
    conn: Connection,
    /// Path to the database file (None for in-memory).
    path: Option<PathBuf>,
}

const DOCUMENT_COLUMNS: &str = "id, filename, filepath, file_type, file_size, file_hash, \
     status, error_message, title, author, category, tags, reliability_score, \
     page_count, chunk_count, created_at, updated_at, indexed_at";

const CHUNK_COLUMNS: &str = "id, document_id, content, content_hash, page_number, \
     section_title, sequence_index, chunk_role, heading_level, confidence_weight, \
     char_start, char_end, created_at";

impl SqliteStorage {
    /// Opens or creates a `SQLite` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Database(e.to_string()))?;
            }
        }

        let conn = Connection::open(&path).map_err(StorageError::from)?;

        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;

        // WAL mode for concurrent readers (returns a row, use query_row)
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    /// Creates an in-memory database. Useful for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;

        Ok(Self { conn, path: None })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Initializes the schema, running migrations when needed.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation or migration fails.
    pub fn init(&mut self) -> Result<()> {
        let is_init: i64 = self
            .conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StorageError::from)?;

        if is_init == 0 {
            self.conn
                .execute_batch(SCHEMA_SQL)
                .map_err(StorageError::from)?;
            self.set_schema_version(CURRENT_SCHEMA_VERSION)?;
        } else if let Some(current) = self.schema_version()? {
            if current < CURRENT_SCHEMA_VERSION {
                for migration in crate::storage::schema::get_migrations_from(current) {
                    self.conn
                        .execute_batch(migration.sql)
                        .map_err(|e| StorageError::Migration(e.to_string()))?;
                }
                self.set_schema_version(CURRENT_SCHEMA_VERSION)?;
            }
        }

        Ok(())
    }

    /// Returns true once `init` has created the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn is_initialized(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(count > 0)
    }

    fn schema_version(&self) -> Result<Option<u32>> {
        let version: Option<String> = self
            .conn
            .query_row(GET_VERSION_SQL, [], |row| row.get(0))
            .optional()
            .map_err(StorageError::from)?;
        Ok(version.and_then(|v| v.parse().ok()))
    }

    fn set_schema_version(&self, version: u32) -> Result<()> {
        self.conn
            .execute(SET_VERSION_SQL, params![version.to_string()])
            .map_err(StorageError::from)?;
        Ok(())
    }

    // ==================== Document Operations ====================

    /// Inserts a document row.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_document(&mut self, document: &Document) -> Result<()> {
        self.conn
            .execute(
                &format!("INSERT INTO documents ({DOCUMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
                params![
                    document.id,
                    document.filename,
                    document.filepath,
                    document.file_type.as_str(),
                    document.file_size as i64,
                    document.file_hash,
                    document.status.as_str(),
                    document.error_message,
                    document.title,
                    document.author,
                    document.category,
                    document.tags,
                    document.reliability_score,
                    i64::from(document.page_count),
                    i64::from(document.chunk_count),
                    document.created_at,
                    document.updated_at,
                    document.indexed_at,
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Fetches a document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.conn
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"),
                params![id],
                row_to_document,
            )
            .optional()
            .map_err(StorageError::from)
            .map_err(Into::into)
    }

    /// Finds a document by its raw file hash (ingest deduplication).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_document_by_hash(&self, file_hash: &str) -> Result<Option<Document>> {
        self.conn
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE file_hash = ?"),
                params![file_hash],
                row_to_document,
            )
            .optional()
            .map_err(StorageError::from)
            .map_err(Into::into)
    }

    /// Lists documents, optionally filtered by status and category.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_documents(
        &self,
        status: Option<DocumentStatus>,
        category: Option<&str>,
    ) -> Result<Vec<Document>> {
        let mut sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE 1=1");
        let mut args: Vec<String> = Vec::new();
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        }
        if let Some(category) = category {
            sql.push_str(" AND category = ?");
            args.push(category.to_string());
        }
        sql.push_str(" ORDER BY created_at, id");

        let mut stmt = self.conn.prepare(&sql).map_err(StorageError::from)?;
        let documents = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), row_to_document)
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        Ok(documents)
    }

    /// Transitions a document to `Indexed` with its derived counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_document_indexed(
        &mut self,
        id: &str,
        chunk_count: u32,
        page_count: u32,
    ) -> Result<()> {
        let now = now_timestamp();
        self.conn
            .execute(
                r"UPDATE documents
                  SET status = ?, chunk_count = ?, page_count = ?,
                      error_message = NULL, indexed_at = ?, updated_at = ?
                  WHERE id = ?",
                params![
                    DocumentStatus::Indexed.as_str(),
                    i64::from(chunk_count),
                    i64::from(page_count),
                    now,
                    now,
                    id
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Transitions a document to `Failed` with an error message.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_document_failed(&mut self, id: &str, error_message: &str) -> Result<()> {
        self.conn
            .execute(
                r"UPDATE documents
                  SET status = ?, error_message = ?, updated_at = ?
                  WHERE id = ?",
                params![
                    DocumentStatus::Failed.as_str(),
                    error_message,
                    now_timestamp(),
                    id
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Deletes a document; chunks cascade via the foreign key and FTS
    /// rows via trigger, all in one transaction.
    ///
    /// Returns true when a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_document(&mut self, id: &str) -> Result<bool> {
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        let deleted = tx
            .execute("DELETE FROM documents WHERE id = ?", params![id])
            .map_err(StorageError::from)?;
        tx.commit()
            .map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(deleted > 0)
    }

    /// Counts all documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn document_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }

    // ==================== Chunk Operations ====================

    /// Inserts chunks in a single transaction. The FTS5 index is
    /// maintained by triggers inside the same transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails (nothing is committed).
    pub fn insert_chunks(&mut self, chunks: &[Chunk]) -> Result<()> {
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO chunks ({CHUNK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ))
                .map_err(StorageError::from)?;

            for chunk in chunks {
                stmt.execute(params![
                    chunk.id,
                    chunk.document_id,
                    chunk.content,
                    chunk.content_hash,
                    chunk.page_number.map(i64::from),
                    chunk.section_title,
                    i64::from(chunk.sequence_index),
                    chunk.role.as_str(),
                    chunk.heading_level.map(i64::from),
                    chunk.confidence_weight,
                    chunk.char_start.map(i64::from),
                    chunk.char_end.map(i64::from),
                    chunk.created_at,
                ])
                .map_err(StorageError::from)?;
            }
        }
        tx.commit()
            .map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(())
    }

    /// Fetches a chunk by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        self.conn
            .query_row(
                &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = ?"),
                params![id],
                row_to_chunk,
            )
            .optional()
            .map_err(StorageError::from)
            .map_err(Into::into)
    }

    /// Fetches chunks for a set of ids. Missing ids are skipped; order
    /// is unspecified.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_chunks_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql =
            format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id IN ({placeholders})");
        let mut stmt = self.conn.prepare(&sql).map_err(StorageError::from)?;

        let chunks = stmt
            .query_map(
                rusqlite::params_from_iter(ids.iter()),
                row_to_chunk,
            )
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        Ok(chunks)
    }

    /// Lists a document's chunks ordered by sequence index.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {CHUNK_COLUMNS} FROM chunks WHERE document_id = ? ORDER BY sequence_index"
            ))
            .map_err(StorageError::from)?;

        let chunks = stmt
            .query_map(params![document_id], row_to_chunk)
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        Ok(chunks)
    }

    /// Fetches chunks within ±`window` sequence positions of `center`
    /// in the same document, ordered by sequence index.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn adjacent_chunks(
        &self,
        document_id: &str,
        center: u32,
        window: u32,
    ) -> Result<Vec<Chunk>> {
        let lo = i64::from(center.saturating_sub(window));
        let hi = i64::from(center) + i64::from(window);

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {CHUNK_COLUMNS} FROM chunks
                 WHERE document_id = ? AND sequence_index BETWEEN ? AND ?
                 ORDER BY sequence_index"
            ))
            .map_err(StorageError::from)?;

        let chunks = stmt
            .query_map(params![document_id, lo, hi], row_to_chunk)
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        Ok(chunks)
    }

    /// Deletes all chunks of a document (FTS rows via trigger) in one
    /// transaction. Returns the deleted chunk ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_document_chunks(&mut self, document_id: &str) -> Result<Vec<String>> {
        let ids: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM chunks WHERE document_id = ?")
                .map_err(StorageError::from)?;
            stmt.query_map(params![document_id], |row| row.get(0))
                .map_err(StorageError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(StorageError::from)?
        };

        let tx = self.conn.transaction().map_err(StorageError::from)?;
        tx.execute(
            "DELETE FROM chunks WHERE document_id = ?",
            params![document_id],
        )
        .map_err(StorageError::from)?;
        tx.execute(
            "UPDATE documents SET chunk_count = 0, updated_at = ? WHERE id = ?",
            params![now_timestamp(), document_id],
        )
        .map_err(StorageError::from)?;
        tx.commit()
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        Ok(ids)
    }

    /// Counts the chunks of a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn chunk_count(&self, document_id: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE document_id = ?",
                params![document_id],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }

    /// Counts all chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn total_chunk_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }

    // ==================== Lexical Search ====================

    /// FTS5 BM25 search over chunk content.
    ///
    /// Terms are quoted (escaping FTS5 operators) and joined with OR.
    /// Returns `(chunk_id, score)` pairs where higher scores are better
    /// matches; the caller normalizes absolute magnitudes.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub fn search_fts(&self, terms: &[String], limit: usize) -> Result<Vec<(String, f64)>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // FTS5 bm25() returns negative scores, more negative = better.
        // Negate so higher = better.
        let fts_query = terms
            .iter()
            .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ");

        let mut stmt = self
            .conn
            .prepare(
                r"SELECT chunk_id, -bm25(chunks_fts) AS score
                  FROM chunks_fts
                  WHERE chunks_fts MATCH ?
                  ORDER BY score DESC
                  LIMIT ?",
            )
            .map_err(StorageError::from)?;

        let results = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        Ok(results)
    }

    // ==================== Analytics ====================

    /// Persists a query analytics record.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_query_record(&mut self, record: &QueryRecord) -> Result<()> {
        self.conn
            .execute(
                r"INSERT INTO queries (
                    id, question, chunks_retrieved, chunks_used,
                    retrieval_time_ms, generation_time_ms, tokens_used,
                    grounding_score, is_grounded, created_at
                  ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id,
                    record.question,
                    record.chunks_retrieved as i64,
                    record.chunks_used as i64,
                    record.retrieval_time_ms.map(|v| v as i64),
                    record.generation_time_ms.map(|v| v as i64),
                    record.tokens_used.map(|v| v as i64),
                    record.grounding_score,
                    i64::from(record.is_grounded),
                    record.created_at,
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Persists an answer record.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_answer_record(&mut self, record: &AnswerRecord) -> Result<()> {
        self.conn
            .execute(
                r"INSERT INTO answers (
                    id, query_id, answer_text, source_chunks,
                    grounding_score, is_valid, model_used, created_at
                  ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id,
                    record.query_id,
                    record.answer_text,
                    record.source_chunks,
                    record.grounding_score,
                    i64::from(record.is_valid),
                    record.model_used,
                    record.created_at,
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Aggregates query analytics.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn query_stats(&self) -> Result<QueryStats> {
        let (total, grounded, avg): (i64, i64, Option<f64>) = self
            .conn
            .query_row(
                r"SELECT COUNT(*),
                         COALESCE(SUM(is_grounded), 0),
                         AVG(grounding_score)
                  FROM queries",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(StorageError::from)?;

        Ok(QueryStats {
            total_queries: total as usize,
            grounded_queries: grounded as usize,
            average_grounding_score: avg.unwrap_or(0.0),
        })
    }

    /// Returns storage-level statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if a count query fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let indexed: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE status = ?",
                params![DocumentStatus::Indexed.as_str()],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;

        let db_size = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok().map(|m| m.len()));

        Ok(StorageStats {
            document_count: self.document_count()?,
            indexed_document_count: indexed as usize,
            chunk_count: self.total_chunk_count()?,
            query_count: self.query_stats()?.total_queries,
            schema_version: self.schema_version()?.unwrap_or(0),
            db_size,
        })
    }
}

fn parse_error(idx: usize, what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unknown {what}: {value}").into(),
    )
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let file_type_raw: String = row.get(3)?;
    let status_raw: String = row.get(6)?;

    Ok(Document {
        id: row.get(0)?,
        filename: row.get(1)?,
        filepath: row.get(2)?,
        file_type: DocumentType::parse(&file_type_raw)
            .ok_or_else(|| parse_error(3, "file type", &file_type_raw))?,
        file_size: row.get::<_, i64>(4)? as u64,
        file_hash: row.get(5)?,
        status: DocumentStatus::parse(&status_raw)
            .ok_or_else(|| parse_error(6, "status", &status_raw))?,
        error_message: row.get(7)?,
        title: row.get(8)?,
        author: row.get(9)?,
        category: row.get(10)?,
        tags: row.get(11)?,
        reliability_score: row.get(12)?,
        page_count: row.get::<_, i64>(13)? as u32,
        chunk_count: row.get::<_, i64>(14)? as u32,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
        indexed_at: row.get(17)?,
    })
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let role_raw: String = row.get(7)?;

    Ok(Chunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        content: row.get(2)?,
        content_hash: row.get(3)?,
        page_number: row.get::<_, Option<i64>>(4)?.map(|v| v as u32),
        section_title: row.get(5)?,
        sequence_index: row.get::<_, i64>(6)? as u32,
        role: ChunkRole::parse(&role_raw).ok_or_else(|| parse_error(7, "chunk role", &role_raw))?,
        heading_level: row.get::<_, Option<i64>>(8)?.map(|v| v as u8),
        confidence_weight: row.get(9)?,
        char_start: row.get::<_, Option<i64>>(10)?.map(|v| v as u32),
        char_end: row.get::<_, Option<i64>>(11)?.map(|v| v as u32),
        created_at: row.get(12)?,
    })
}
