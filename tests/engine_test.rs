//! End-to-end tests for the grounded question-answering pipeline.
//!
//! Uses an in-memory corpus, the deterministic hashed embedder, and a
//! scripted generator standing in for the external model.

#![allow(clippy::expect_used)]

use rlg_rs::core::{DocumentMetadata, DocumentStatus};
use rlg_rs::embedding::HashedEmbedder;
use rlg_rs::engine::{Engine, QueryRequest};
use rlg_rs::generate::{GenerateOptions, Generation, Generator};
use rlg_rs::index::VectorIndex;
use rlg_rs::storage::SqliteStorage;
use rlg_rs::{Error, Settings};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const DIM: usize = 64;

/// Generator that replays a scripted response and records the prompts
/// it was handed.
struct ScriptedGenerator {
    reply: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGenerator {
    fn new(reply: &str) -> (Self, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                reply: reply.to_string(),
                prompts: Arc::clone(&prompts),
            },
            prompts,
        )
    }
}

impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, prompt: &str, _options: &GenerateOptions) -> rlg_rs::Result<Generation> {
        self.prompts
            .lock()
            .expect("prompt lock")
            .push(prompt.to_string());
        Ok(Generation {
            text: self.reply.clone(),
            tokens_used: 11,
            finish_reason: "stop".to_string(),
        })
    }
}

struct Harness {
    engine: Engine,
    prompts: Arc<Mutex<Vec<String>>>,
    temp: TempDir,
}

impl Harness {
    fn new(reply: &str) -> Self {
        let temp = TempDir::new().expect("temp dir");
        let settings = Settings {
            data_dir: temp.path().to_path_buf(),
            upload_dir: temp.path().join("uploads"),
            index_dir: temp.path().join("indices"),
            cache_dir: temp.path().join("cache"),
            database_url: temp.path().join("rlg.db"),
            embedding_dimension: DIM,
            ..Settings::default()
        };
        settings.ensure_directories().expect("directories");

        let mut storage = SqliteStorage::open(&settings.database_url).expect("storage");
        storage.init().expect("schema");
        let index = VectorIndex::open(&settings.index_dir, DIM).expect("index");
        let (generator, prompts) = ScriptedGenerator::new(reply);

        let engine = Engine::new(
            settings,
            storage,
            index,
            Box::new(HashedEmbedder::new(DIM)),
            Box::new(generator),
        )
        .expect("engine");

        Self {
            engine,
            prompts,
            temp,
        }
    }

    fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp.path().join(name);
        std::fs::write(&path, content).expect("write file");
        path
    }

    fn ingest(&mut self, name: &str, content: &str) -> rlg_rs::Document {
        let path = self.write_file(name, content);
        self.engine
            .ingest_file(&path, &DocumentMetadata::new())
            .expect("ingest")
    }
}

#[test]
fn single_doc_exact_answer_is_grounded() {
    let mut harness = Harness::new("The capital of France is Paris [1].");
    harness.ingest("france.txt", "The capital of France is Paris.");

    let outcome = harness
        .engine
        .ask(&QueryRequest::new("What is the capital of France?"))
        .expect("ask");

    let answer = outcome.answer().expect("expected a grounded answer");
    assert!(answer.answer.contains("Paris"));
    assert!(answer.answer.contains("[1]"));
    assert!(answer.is_grounded);
    assert!(answer.grounding_score >= 0.7);
    assert_eq!(answer.model_used, "scripted");
    assert!(!answer.grounded_sentences.is_empty());
    assert!(answer.grounded_sentences[0].is_grounded);
}

#[test]
fn absent_info_is_refused() {
    let mut harness = Harness::new("I cannot find this information in the provided sources");
    harness.ingest("france.txt", "The capital of France is Paris.");

    let mut request = QueryRequest::new("What is the capital of Germany?");
    request.require_grounding = true;
    let outcome = harness.engine.ask(&request).expect("ask");

    let refusal = outcome.refusal().expect("expected a refusal");
    assert!(refusal.sources_checked >= 1);
    assert!(refusal.partial_info.is_some());
}

#[test]
fn structural_boost_ranks_heading() {
    let mut harness = Harness::new("unused");
    harness.ingest(
        "policy.md",
        "# Refund Policy\n\nAll purchases can be returned within thirty days of delivery for a full refund, no questions asked.\n",
    );

    let results = harness
        .engine
        .search("refund policy", &rlg_rs::RetrievalFilter::default(), 3)
        .expect("search");

    let heading = results
        .iter()
        .find(|r| r.role == rlg_rs::ChunkRole::Heading)
        .expect("heading chunk should be in the top 3");
    assert!(heading.structural_score >= 0.2);
}

#[test]
fn shared_paragraph_deduplicated_in_context() {
    let shared = "The warranty covers accidental damage for a period of twenty four months \
                  from the original purchase date, including battery replacements.";
    let reply = format!("{shared} [1]");
    let mut harness = Harness::new(&reply);

    harness.ingest("doc-a.txt", &format!("{shared}\n\nExtra text for doc a."));
    harness.ingest("doc-b.txt", &format!("{shared}\n\nDifferent tail for doc b."));

    // Grounding is not under test here; the context prompt is.
    let mut request = QueryRequest::new("what does the warranty cover?");
    request.require_grounding = false;
    let outcome = harness.engine.ask(&request).expect("ask");
    assert!(outcome.answer().is_some());

    let prompts = harness.prompts.lock().expect("prompts");
    let prompt = prompts.first().expect("one generation");
    let occurrences = prompt.matches(shared).count();
    assert_eq!(occurrences, 1, "shared paragraph must appear exactly once");
}

#[test]
fn extractive_mode_verifies_quotes() {
    let sentence = "Refunds are processed within thirty days of purchase.";
    let reply = format!("\"{sentence}\" [1]");
    let mut harness = Harness::new(&reply);
    harness.ingest("policy.txt", sentence);

    let outcome = harness
        .engine
        .ask_extractive(&QueryRequest::new("how fast are refunds processed?"))
        .expect("ask");

    let answer = outcome.answer().expect("expected an answer");
    assert!(answer.is_grounded, "all quotes verified");
    assert!((answer.grounding_score - 1.0).abs() < f64::EPSILON);
    assert!(answer.warning.is_none());
}

#[test]
fn extractive_mode_flags_altered_quote() {
    let mut harness = Harness::new("\"Refunds are processed within ninety days\" [1]");
    harness.ingest(
        "policy.txt",
        "Refunds are processed within thirty days of purchase.",
    );

    let outcome = harness
        .engine
        .ask_extractive(&QueryRequest::new("how fast are refunds processed?"))
        .expect("ask");

    let answer = outcome.answer().expect("expected an answer");
    assert!(!answer.is_grounded, "altered quote must fail verification");
    assert!(answer.warning.is_some());
    assert!(!answer.grounded_sentences[0].is_grounded);
}

#[test]
fn extractive_not_found_is_refused() {
    let mut harness = Harness::new("NOT_FOUND");
    harness.ingest("policy.txt", "Refunds are processed within thirty days.");

    let outcome = harness
        .engine
        .ask_extractive(&QueryRequest::new("what is the meaning of life?"))
        .expect("ask");
    assert!(outcome.refusal().is_some());
}

#[test]
fn delete_cascades_to_all_indices() {
    let mut harness = Harness::new("unused");
    let doc = harness.ingest(
        "doomed.txt",
        "A very distinctive zygomorphic paragraph about orchids.\n\nAnother zygomorphic paragraph, this one about snapdragons and their bilateral symmetry.",
    );
    assert_eq!(doc.status, DocumentStatus::Indexed);
    let chunk_count = doc.chunk_count as usize;
    assert!(chunk_count >= 1);

    // Chunks are searchable while the document exists.
    let results = harness
        .engine
        .search("zygomorphic", &rlg_rs::RetrievalFilter::default(), 10)
        .expect("search");
    assert!(!results.is_empty());

    let vectors_before = harness.engine.stats().expect("stats").vector_index.count;
    harness.engine.delete_document(&doc.id).expect("delete");

    let results = harness
        .engine
        .search("zygomorphic", &rlg_rs::RetrievalFilter::default(), 10)
        .expect("search");
    assert!(results.is_empty(), "no chunk of a deleted document returns");

    let stats = harness.engine.stats().expect("stats");
    assert_eq!(stats.vector_index.count, vectors_before - chunk_count);
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.chunks, 0);
}

#[test]
fn empty_question_is_bad_input() {
    let mut harness = Harness::new("unused");
    let err = harness
        .engine
        .ask(&QueryRequest::new("   "))
        .expect_err("empty question must fail");
    assert!(matches!(err, Error::BadInput { .. }));
}

#[test]
fn empty_corpus_refuses_with_zero_sources() {
    let mut harness = Harness::new("unused");
    let outcome = harness
        .engine
        .ask(&QueryRequest::new("anything at all?"))
        .expect("ask");

    let refusal = outcome.refusal().expect("expected refusal");
    assert_eq!(refusal.sources_checked, 0);
    // The generator is never consulted without sources.
    assert!(harness.prompts.lock().expect("prompts").is_empty());
}

#[test]
fn empty_generation_is_refused() {
    let mut harness = Harness::new("");
    harness.ingest("france.txt", "The capital of France is Paris.");

    let outcome = harness
        .engine
        .ask(&QueryRequest::new("What is the capital of France?"))
        .expect("ask");
    assert!(outcome.refusal().is_some());
}

#[test]
fn idempotent_ingest_preserves_corpus() {
    let mut harness = Harness::new("unused");
    let first = harness.ingest("facts.txt", "Stable facts never change.");
    let second = harness.ingest("facts-copy.txt", "Stable facts never change.");

    // Same bytes, same document; nothing duplicated.
    assert_eq!(first.id, second.id);
    let stats = harness.engine.stats().expect("stats");
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.vector_index.count, stats.chunks);
}

#[test]
fn reindex_matches_delete_plus_ingest() {
    let mut harness = Harness::new("unused");
    let doc = harness.ingest("facts.txt", "The capital of France is Paris.");

    let reindexed = harness
        .engine
        .reindex_document(&doc.id)
        .expect("reindex");

    assert_eq!(reindexed.id, doc.id);
    assert_eq!(reindexed.status, DocumentStatus::Indexed);
    assert_eq!(reindexed.chunk_count, doc.chunk_count);

    let stats = harness.engine.stats().expect("stats");
    assert_eq!(stats.chunks, doc.chunk_count as usize);
    assert_eq!(stats.vector_index.count, doc.chunk_count as usize);

    // Still retrievable after the rebuild.
    let results = harness
        .engine
        .search("capital of France", &rlg_rs::RetrievalFilter::default(), 5)
        .expect("search");
    assert!(!results.is_empty());
}

#[test]
fn analytics_recorded_per_query() {
    let mut harness = Harness::new("The capital of France is Paris [1].");
    harness.ingest("france.txt", "The capital of France is Paris.");

    harness
        .engine
        .ask(&QueryRequest::new("What is the capital of France?"))
        .expect("ask");
    harness
        .engine
        .ask(&QueryRequest::new("What is the capital of Germany?"))
        .expect("ask");

    let stats = harness.engine.stats().expect("stats");
    assert_eq!(stats.queries.total_queries, 2);
    assert!(stats.queries.grounded_queries >= 1);
}

#[test]
fn streaming_emits_tokens_and_validates() {
    let mut harness = Harness::new("The capital of France is Paris [1].");
    harness.ingest("france.txt", "The capital of France is Paris.");

    let mut streamed = String::new();
    let outcome = harness
        .engine
        .ask_stream(&QueryRequest::new("What is the capital of France?"), &mut |t| {
            streamed.push_str(t);
        })
        .expect("ask_stream");

    assert_eq!(streamed, "The capital of France is Paris [1].");
    assert!(outcome.answer().expect("answer").is_grounded);
}

#[test]
fn upload_copy_removed_on_failed_ingest() {
    let mut harness = Harness::new("unused");
    let path = harness.write_file("binary.exe", "not ingestible");

    let err = harness
        .engine
        .ingest_file(&path, &DocumentMetadata::new())
        .expect_err("unsupported extension");
    assert!(matches!(err, Error::BadInput { .. }));

    let upload_copy = harness.temp.path().join("uploads").join("binary.exe");
    assert!(!upload_copy.exists(), "failed upload must be cleaned up");
}
