//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// RLG-RS: Retrieval-Locked Generation engine.
///
/// Grounded question answering over local documents: every sentence of
/// an answer is traceable to source excerpts, or the engine refuses.
#[derive(Parser, Debug)]
#[command(name = "rlg-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root data directory (database, uploads, indices).
    #[arg(short, long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the database and data directories.
    Init,

    /// Show corpus and query statistics.
    Status,

    /// Ingest a document into the corpus.
    Ingest {
        /// Path to the source file.
        file: PathBuf,

        /// Display title (defaults to the filename).
        #[arg(long)]
        title: Option<String>,

        /// Document author.
        #[arg(long)]
        author: Option<String>,

        /// Category used for retrieval filtering.
        #[arg(long)]
        category: Option<String>,

        /// Comma-separated tags.
        #[arg(long)]
        tags: Option<String>,

        /// Reliability weight in [0, 1] applied during ranking.
        #[arg(long, default_value = "1.0")]
        reliability: f64,
    },

    /// List documents.
    #[command(name = "list", alias = "ls")]
    List {
        /// Filter by status (pending, processing, indexed, failed).
        #[arg(long)]
        status: Option<String>,

        /// Filter by category.
        #[arg(long)]
        category: Option<String>,
    },

    /// Show document details.
    Show {
        /// Document id.
        document: String,

        /// Show chunks as well.
        #[arg(short, long)]
        chunks: bool,
    },

    /// List a document's chunks.
    Chunks {
        /// Document id.
        document: String,
    },

    /// Delete a document and its index entries.
    #[command(name = "delete", alias = "rm")]
    Delete {
        /// Document id.
        document: String,

        /// Skip confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Re-ingest a document from its stored source file.
    Reindex {
        /// Document id.
        document: String,
    },

    /// Ask a question and get a grounded answer or a refusal.
    Ask {
        /// The question.
        question: String,

        /// Restrict retrieval to these document ids.
        #[arg(long = "document")]
        documents: Vec<String>,

        /// Restrict retrieval to these categories.
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Drop sources below this reliability.
        #[arg(long, default_value = "0.5")]
        min_reliability: f64,

        /// Number of sources to answer from.
        #[arg(long, default_value = "5")]
        top_k: usize,

        /// Return the answer even when grounding validation fails.
        #[arg(long)]
        allow_ungrounded: bool,

        /// Extractive mode: answer only in verified literal quotes.
        #[arg(long)]
        extractive: bool,

        /// Stream tokens as they are generated.
        #[arg(long)]
        stream: bool,
    },

    /// Run retrieval only and show the scored candidates.
    Search {
        /// The query.
        query: String,

        /// Number of results.
        #[arg(long, default_value = "10")]
        top_k: usize,

        /// Drop sources below this reliability.
        #[arg(long, default_value = "0.0")]
        min_reliability: f64,
    },
}
