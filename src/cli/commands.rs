//! Command execution.
//!
//! Builds the engine from settings and dispatches parsed commands,
//! returning the formatted output string.

use crate::cli::output::{
    self, OutputFormat, format_chunks, format_document, format_document_list, format_outcome,
    format_search_results, format_stats,
};
use crate::cli::parser::{Cli, Commands};
use crate::config::Settings;
use crate::core::{DocumentMetadata, DocumentStatus};
use crate::engine::{Engine, QueryRequest};
use crate::error::{CommandError, Error, Result};
use crate::retrieval::RetrievalFilter;
use std::io::Write as _;

/// Executes a parsed CLI invocation.
///
/// # Errors
///
/// Returns the underlying engine error; the caller formats it.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let settings = load_settings(cli)?;

    match &cli.command {
        Commands::Init => {
            settings.ensure_directories()?;
            let engine = Engine::from_settings(settings)?;
            let stats = engine.stats()?;
            Ok(format!(
                "Initialized. {} document(s), {} chunk(s).\n",
                stats.documents, stats.chunks
            ))
        }

        Commands::Status => {
            let engine = Engine::from_settings(settings)?;
            Ok(format_stats(&engine.stats()?, format))
        }

        Commands::Ingest {
            file,
            title,
            author,
            category,
            tags,
            reliability,
        } => {
            let mut engine = Engine::from_settings(settings)?;
            let metadata = DocumentMetadata {
                title: title.clone(),
                author: author.clone(),
                category: category.clone(),
                tags: tags.clone(),
                reliability_score: reliability.clamp(0.0, 1.0),
            };
            let document = engine.ingest_file(file, &metadata)?;
            Ok(format_document(&document, format))
        }

        Commands::List { status, category } => {
            let status = status
                .as_deref()
                .map(|raw| {
                    DocumentStatus::parse(raw)
                        .ok_or_else(|| Error::bad_input(format!("unknown status: {raw}")))
                })
                .transpose()?;
            let engine = Engine::from_settings(settings)?;
            let documents = engine.documents(status, category.as_deref())?;
            Ok(format_document_list(&documents, format))
        }

        Commands::Show { document, chunks } => {
            let engine = Engine::from_settings(settings)?;
            let mut out = format_document(&engine.document(document)?, format);
            if *chunks {
                out.push('\n');
                out.push_str(&format_chunks(&engine.document_chunks(document)?, format));
            }
            Ok(out)
        }

        Commands::Chunks { document } => {
            let engine = Engine::from_settings(settings)?;
            Ok(format_chunks(&engine.document_chunks(document)?, format))
        }

        Commands::Delete { document, yes } => {
            if !yes && !confirm(&format!("Delete document {document}?"))? {
                return Err(CommandError::Cancelled.into());
            }
            let mut engine = Engine::from_settings(settings)?;
            engine.delete_document(document)?;
            Ok(format!("Deleted {document}.\n"))
        }

        Commands::Reindex { document } => {
            let mut engine = Engine::from_settings(settings)?;
            let document = engine.reindex_document(document)?;
            Ok(format_document(&document, format))
        }

        Commands::Ask {
            question,
            documents,
            categories,
            min_reliability,
            top_k,
            allow_ungrounded,
            extractive,
            stream,
        } => {
            let mut engine = Engine::from_settings(settings)?;
            let request = QueryRequest {
                question: question.clone(),
                document_ids: (!documents.is_empty()).then(|| documents.clone()),
                categories: (!categories.is_empty()).then(|| categories.clone()),
                min_reliability: *min_reliability,
                top_k: *top_k,
                require_grounding: !allow_ungrounded,
            };

            let outcome = if *extractive {
                engine.ask_extractive(&request)?
            } else if *stream {
                let mut stdout = std::io::stdout();
                let outcome = engine.ask_stream(&request, &mut |token| {
                    let _ = stdout.write_all(token.as_bytes());
                    let _ = stdout.flush();
                })?;
                let _ = stdout.write_all(b"\n\n");
                outcome
            } else {
                engine.ask(&request)?
            };

            Ok(format_outcome(&outcome, format))
        }

        Commands::Search {
            query,
            top_k,
            min_reliability,
        } => {
            let engine = Engine::from_settings(settings)?;
            let filter = RetrievalFilter {
                min_reliability: *min_reliability,
                ..RetrievalFilter::default()
            };
            let results = engine.search(query, &filter, *top_k)?;
            Ok(format_search_results(&results, format))
        }
    }
}

/// Loads settings from the environment, applying the `--data-dir`
/// override and re-deriving the dependent default paths.
fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::from_env()?;
    if let Some(data_dir) = &cli.data_dir {
        settings.upload_dir = data_dir.join("uploads");
        settings.index_dir = data_dir.join("indices");
        settings.cache_dir = data_dir.join("cache");
        settings.database_url = data_dir.join("rlg.db");
        settings.data_dir = data_dir.clone();
    }
    Ok(settings)
}

/// Prompts for confirmation on stdin.
fn confirm(message: &str) -> Result<bool> {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "{message} [y/N] ");
    let _ = stderr.flush();

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Formats an error for the active output format. Re-exported for the
/// binary entry point.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    output::format_error(error, format)
}
