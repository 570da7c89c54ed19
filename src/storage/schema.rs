//! Database schema definitions.
//!
//! Contains SQL schema and migration logic for the RLG `SQLite`
//! database: documents, chunks, the FTS5 lexical index, and the
//! query/answer analytics tables.

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// SQL schema for initial database setup.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Source documents
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    filepath TEXT NOT NULL,
    file_type TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    file_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    error_message TEXT,
    title TEXT,
    author TEXT,
    category TEXT,
    tags TEXT,
    reliability_score REAL NOT NULL DEFAULT 1.0,
    page_count INTEGER NOT NULL DEFAULT 0,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    indexed_at INTEGER
);

-- Deduplication by raw file hash
CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(file_hash);
CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
CREATE INDEX IF NOT EXISTS idx_documents_category ON documents(category);

-- Chunks (segments of document content)
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    page_number INTEGER,
    section_title TEXT,
    sequence_index INTEGER NOT NULL,
    chunk_role TEXT NOT NULL,
    heading_level INTEGER,
    confidence_weight REAL NOT NULL DEFAULT 1.0,
    char_start INTEGER,
    char_end INTEGER,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);

-- Adjacency queries for context-window expansion
CREATE INDEX IF NOT EXISTS idx_chunks_order ON chunks(document_id, sequence_index);

-- FTS5 lexical index keyed by chunk id
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    content,
    chunk_id UNINDEXED,
    tokenize='porter unicode61'
);

-- Triggers keep the FTS5 index atomic with chunk rows.
-- Chunks are immutable once indexed, so no update trigger is needed.
CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(content, chunk_id) VALUES (new.content, new.id);
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
    DELETE FROM chunks_fts WHERE chunk_id = old.id;
END;

-- Query analytics
CREATE TABLE IF NOT EXISTS queries (
    id TEXT PRIMARY KEY,
    question TEXT NOT NULL,
    chunks_retrieved INTEGER NOT NULL DEFAULT 0,
    chunks_used INTEGER NOT NULL DEFAULT 0,
    retrieval_time_ms INTEGER,
    generation_time_ms INTEGER,
    tokens_used INTEGER,
    grounding_score REAL,
    is_grounded INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

-- Stored answers with provenance
CREATE TABLE IF NOT EXISTS answers (
    id TEXT PRIMARY KEY,
    query_id TEXT NOT NULL,
    answer_text TEXT NOT NULL,
    source_chunks TEXT NOT NULL,  -- JSON: [{chunk_id, citation}]
    grounding_score REAL NOT NULL DEFAULT 0.0,
    is_valid INTEGER NOT NULL DEFAULT 0,
    model_used TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (query_id) REFERENCES queries(id) ON DELETE CASCADE
);
";

/// SQL to check if schema is initialized.
pub const CHECK_SCHEMA_SQL: &str = r"
SELECT COUNT(*) FROM sqlite_master
WHERE type='table' AND name='schema_info';
";

/// SQL to get schema version.
pub const GET_VERSION_SQL: &str = r"
SELECT value FROM schema_info WHERE key = 'version';
";

/// SQL to set schema version.
pub const SET_VERSION_SQL: &str = r"
INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?);
";

/// Migrations from older schema versions.
pub struct Migration {
    /// Version this migration upgrades from.
    pub from_version: u32,
    /// Version this migration upgrades to.
    pub to_version: u32,
    /// SQL statements to execute.
    pub sql: &'static str,
}

/// Available migrations.
pub const MIGRATIONS: &[Migration] = &[];

/// Gets migrations needed to upgrade from a version.
#[must_use]
pub fn get_migrations_from(current_version: u32) -> Vec<&'static Migration> {
    MIGRATIONS
        .iter()
        .filter(|m| m.from_version >= current_version && m.to_version <= CURRENT_SCHEMA_VERSION)
        .collect()
}
