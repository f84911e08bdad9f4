use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::models::{ChunkEmbedding, Document, NewChunkEmbedding, NewDocument, ScoredChunk};
use crate::database::queries::{ChunkQueries, DocumentQueries};


pub mod models;
pub mod queries;
pub mod vector;

pub type DbPool = Pool<Sqlite>;

/// Connection pool plus schema lifecycle for the knowledge store.
///
/// Created once at process start and injected into each component; no
/// component reaches for a global handle.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.init_schema().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        info!("Initializing knowledge store schema");

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create documents table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_user ON documents (user_id)")
            .execute(&self.pool)
            .await
            .context("Failed to create documents index")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunk_embeddings (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents (id) ON DELETE CASCADE,
                chunk_text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create chunk_embeddings table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunk_embeddings_document \
             ON chunk_embeddings (document_id)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create chunk_embeddings index")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS usage_records (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                request_count INTEGER NOT NULL DEFAULT 0,
                request_limit INTEGER NOT NULL,
                tokens_used INTEGER NOT NULL DEFAULT 0,
                token_limit INTEGER NOT NULL,
                last_request_reset TEXT NOT NULL,
                last_token_reset TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create usage_records table")?;

        debug!("Schema initialization completed");
        Ok(())
    }

    // Document operations
    pub async fn create_document(&self, new_document: NewDocument) -> crate::Result<Document> {
        DocumentQueries::create(&self.pool, new_document).await
    }

    pub async fn get_document(&self, id: &str) -> crate::Result<Option<Document>> {
        DocumentQueries::get_by_id(&self.pool, id).await
    }

    pub async fn list_documents_for_user(&self, user_id: &str) -> crate::Result<Vec<Document>> {
        DocumentQueries::list_for_user(&self.pool, user_id).await
    }

    pub async fn delete_document(&self, id: &str) -> crate::Result<bool> {
        DocumentQueries::delete(&self.pool, id).await
    }

    // Chunk embedding operations
    pub async fn insert_chunk(&self, new_chunk: NewChunkEmbedding) -> crate::Result<ChunkEmbedding> {
        ChunkQueries::create(&self.pool, new_chunk).await
    }

    pub async fn delete_chunks_for_document(&self, document_id: &str) -> crate::Result<u64> {
        ChunkQueries::delete_for_document(&self.pool, document_id).await
    }

    pub async fn count_chunks_for_document(&self, document_id: &str) -> crate::Result<i64> {
        ChunkQueries::count_for_document(&self.pool, document_id).await
    }

    pub async fn list_chunks_for_document(
        &self,
        document_id: &str,
    ) -> crate::Result<Vec<ChunkEmbedding>> {
        ChunkQueries::list_for_document(&self.pool, document_id).await
    }

    pub async fn nearest_chunks(
        &self,
        query_vector: &[f32],
        user_id: &str,
        document_id: Option<&str>,
        k: usize,
    ) -> crate::Result<Vec<ScoredChunk>> {
        ChunkQueries::nearest(&self.pool, query_vector, user_id, document_id, k).await
    }
}
