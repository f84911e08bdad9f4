#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests over the ingestion and retrieval pipeline, using a
// deterministic in-process embedding provider so no network is involved.

use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;
use tutor_rag::config::{ChunkingConfig, Config, ProviderConfig};
use tutor_rag::database::Database;
use tutor_rag::database::models::NewDocument;
use tutor_rag::embeddings::provider::EmbeddingProvider;
use tutor_rag::ingest::IngestionPipeline;
use tutor_rag::retrieval::{DEFAULT_TOP_K, RetrievalEngine};
use tutor_rag::{RagError, Result};

const EMBED_DIM: usize = 16;

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok(); // Ignore error if already initialized
}

/// Deterministic bag-of-words embedding: each word hashes into one of
/// EMBED_DIM buckets, so texts sharing vocabulary land close together under
/// cosine distance. Stable within a process, which is all these tests need.
struct BagOfWordsProvider;

fn word_bucket(word: &str) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.to_lowercase().bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % EMBED_DIM as u64) as usize
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBED_DIM];
    for word in text.split_whitespace() {
        vector[word_bucket(word)] += 1.0;
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

fn test_config() -> Config {
    Config {
        chunking: ChunkingConfig {
            chunk_size: 200,
            overlap: 40,
        },
        provider: ProviderConfig {
            batch_size: 2,
            batch_delay_ms: 0,
            ..ProviderConfig::default()
        },
        ..Config::default()
    }
}

async fn open_db() -> (TempDir, Database) {
    let dir = TempDir::new().expect("should create temp dir");
    let db = Database::new(dir.path().join("knowledge.db"))
        .await
        .expect("should open database");
    (dir, db)
}

async fn create_document(db: &Database, user_id: &str, title: &str) -> String {
    db.create_document(NewDocument {
        user_id: user_id.to_string(),
        title: title.to_string(),
        content: String::new(),
    })
    .await
    .expect("should create document")
    .id
}

fn provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(BagOfWordsProvider)
}

#[tokio::test]
async fn ingest_then_retrieve_round_trip() {
    init_test_tracing();
    let config = test_config();
    let (_dir, db) = open_db().await;
    let pipeline = IngestionPipeline::new(db.clone(), provider(), &config);
    let engine = RetrievalEngine::new(db.clone(), provider());

    let doc = create_document(&db, "u1", "Biology notes").await;
    let text = "photosynthesis converts light energy into chemical energy \
                inside chloroplasts\n\n\
                cellular respiration in mitochondria releases energy from \
                glucose molecules\n\n\
                osmosis moves water across a semipermeable membrane toward \
                higher solute concentration";

    let outcome = pipeline.ingest(&doc, text).await.expect("should ingest");
    assert!(outcome.chunks_count >= 2);

    let results = engine
        .retrieve(
            "how does photosynthesis use light in chloroplasts",
            "u1",
            DEFAULT_TOP_K,
            None,
        )
        .await
        .expect("should retrieve");

    assert!(!results.is_empty());
    assert!(results.len() <= DEFAULT_TOP_K);
    assert!(
        results[0].content.contains("photosynthesis"),
        "most relevant chunk should mention photosynthesis, got: {}",
        results[0].content
    );
    assert_eq!(results[0].source_title, "Biology notes");
}

#[tokio::test]
async fn concurrent_ingestion_by_multiple_users_stays_isolated() {
    let config = test_config();
    let (_dir, db) = open_db().await;

    let mut handles = Vec::new();
    for user in ["u1", "u2", "u3"] {
        let db = db.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            let pipeline = IngestionPipeline::new(db.clone(), provider(), &config);
            let doc = create_document(&db, user, &format!("{} notes", user)).await;
            let text = format!(
                "secret material belonging to {} repeated {}",
                user,
                format!("{} ", user).repeat(30)
            );
            pipeline.ingest(&doc, &text).await.expect("should ingest");
        }));
    }
    for handle in handles {
        handle.await.expect("ingestion task should not panic");
    }

    let engine = RetrievalEngine::new(db, provider());
    for user in ["u1", "u2", "u3"] {
        let results = engine
            .retrieve("secret material belonging", user, 20, None)
            .await
            .expect("should retrieve");

        assert!(!results.is_empty());
        for result in &results {
            assert!(
                result.content.contains(user),
                "user {} saw foreign chunk: {}",
                user,
                result.content
            );
        }
    }
}

#[tokio::test]
async fn retrieval_with_unrelated_scoped_document_returns_empty() {
    let config = test_config();
    let (_dir, db) = open_db().await;
    let pipeline = IngestionPipeline::new(db.clone(), provider(), &config);
    let engine = RetrievalEngine::new(db.clone(), provider());

    // d1 holds chemistry, the user's other document holds the relevant
    // biology. Scoping to d1 must not fall back to the other document.
    let d1 = create_document(&db, "u1", "Chemistry").await;
    pipeline
        .ingest(&d1, "covalent bonds share electron pairs between atoms")
        .await
        .expect("should ingest");

    let d2 = create_document(&db, "u1", "Biology").await;
    pipeline
        .ingest(&d2, "photosynthesis happens in chloroplasts")
        .await
        .expect("should ingest");

    let results = engine
        .retrieve("photosynthesis", "u1", DEFAULT_TOP_K, Some(&d1))
        .await
        .expect("should retrieve");

    for result in &results {
        assert!(
            !result.content.contains("photosynthesis"),
            "scoped search leaked another document's chunk"
        );
    }
}

#[tokio::test]
async fn deleting_a_document_removes_it_from_retrieval() {
    let config = test_config();
    let (_dir, db) = open_db().await;
    let pipeline = IngestionPipeline::new(db.clone(), provider(), &config);
    let engine = RetrievalEngine::new(db.clone(), provider());

    let doc = create_document(&db, "u1", "Temporary").await;
    pipeline
        .ingest(&doc, "ephemeral knowledge about trigonometry identities")
        .await
        .expect("should ingest");

    let results = engine
        .retrieve("trigonometry identities", "u1", DEFAULT_TOP_K, None)
        .await
        .expect("should retrieve");
    assert!(!results.is_empty());

    db.delete_document(&doc).await.expect("should delete");

    let results = engine
        .retrieve("trigonometry identities", "u1", DEFAULT_TOP_K, None)
        .await
        .expect("should retrieve");
    assert!(results.is_empty());
}

#[tokio::test]
async fn empty_document_error_reaches_the_caller() {
    let config = test_config();
    let (_dir, db) = open_db().await;
    let pipeline = IngestionPipeline::new(db.clone(), provider(), &config);
    let doc = create_document(&db, "u1", "Blank upload").await;

    let err = pipeline
        .ingest(&doc, "\n\n   \t")
        .await
        .expect_err("blank upload should fail");
    assert!(matches!(err, RagError::EmptyDocument));
}
