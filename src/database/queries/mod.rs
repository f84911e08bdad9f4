
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::models::{
    ChunkEmbedding, Document, NewChunkEmbedding, NewDocument, ScoredChunk, UsageRecord,
};
use super::vector::{cosine_distance, decode_embedding, encode_embedding};
use crate::config::UsageLimits;
use crate::{RagError, Result};

pub struct DocumentQueries;

impl DocumentQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_document: NewDocument) -> Result<Document> {
        let document = Document {
            id: Uuid::new_v4().to_string(),
            user_id: new_document.user_id,
            title: new_document.title,
            content: new_document.content,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO documents (id, user_id, title, content, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&document.id)
        .bind(&document.user_id)
        .bind(&document.title)
        .bind(&document.content)
        .bind(document.created_at)
        .execute(pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to create document: {}", e)))?;

        Ok(document)
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Document>> {
        sqlx::query_as::<_, Document>(
            "SELECT id, user_id, title, content, created_at FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to get document by id: {}", e)))
    }

    #[inline]
    pub async fn list_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Document>> {
        sqlx::query_as::<_, Document>(
            "SELECT id, user_id, title, content, created_at FROM documents \
             WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to list documents: {}", e)))
    }

    /// Delete a document; its chunk embeddings go with it via the foreign
    /// key cascade. Returns whether a row was removed.
    #[inline]
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| RagError::Database(format!("Failed to delete document: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct ChunkQueries;

#[derive(FromRow)]
struct CandidateRow {
    chunk_text: String,
    embedding: Vec<u8>,
    title: String,
    created_at: DateTime<Utc>,
    row_id: i64,
}

impl ChunkQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_chunk: NewChunkEmbedding) -> Result<ChunkEmbedding> {
        let chunk = ChunkEmbedding {
            id: Uuid::new_v4().to_string(),
            document_id: new_chunk.document_id,
            chunk_text: new_chunk.chunk_text,
            embedding: encode_embedding(&new_chunk.embedding),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO chunk_embeddings (id, document_id, chunk_text, embedding, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(&chunk.chunk_text)
        .bind(&chunk.embedding)
        .bind(chunk.created_at)
        .execute(pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to insert chunk embedding: {}", e)))?;

        Ok(chunk)
    }

    #[inline]
    pub async fn delete_for_document(pool: &SqlitePool, document_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunk_embeddings WHERE document_id = ?")
            .bind(document_id)
            .execute(pool)
            .await
            .map_err(|e| RagError::Database(format!("Failed to delete chunk embeddings: {}", e)))?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn count_for_document(pool: &SqlitePool, document_id: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM chunk_embeddings WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_one(pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to count chunk embeddings: {}", e)))
    }

    /// List a document's chunks in insertion order.
    #[inline]
    pub async fn list_for_document(
        pool: &SqlitePool,
        document_id: &str,
    ) -> Result<Vec<ChunkEmbedding>> {
        sqlx::query_as::<_, ChunkEmbedding>(
            "SELECT id, document_id, chunk_text, embedding, created_at \
             FROM chunk_embeddings WHERE document_id = ? ORDER BY rowid",
        )
        .bind(document_id)
        .fetch_all(pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to list chunk embeddings: {}", e)))
    }

    /// Distance-ordered top-k search over a user's chunks.
    ///
    /// The user scope is applied in SQL and cannot be widened by the query
    /// text; the optional document scope narrows it further. Candidates are
    /// ranked by cosine distance ascending, with ties broken by chunk
    /// creation time (earlier first) and then insertion order.
    #[inline]
    pub async fn nearest(
        pool: &SqlitePool,
        query_vector: &[f32],
        user_id: &str,
        document_id: Option<&str>,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let candidates = if let Some(document_id) = document_id {
            sqlx::query_as::<_, CandidateRow>(
                "SELECT ce.chunk_text, ce.embedding, d.title, ce.created_at, ce.rowid AS row_id \
                 FROM chunk_embeddings ce \
                 INNER JOIN documents d ON ce.document_id = d.id \
                 WHERE d.user_id = ? AND ce.document_id = ?",
            )
            .bind(user_id)
            .bind(document_id)
            .fetch_all(pool)
            .await
        } else {
            sqlx::query_as::<_, CandidateRow>(
                "SELECT ce.chunk_text, ce.embedding, d.title, ce.created_at, ce.rowid AS row_id \
                 FROM chunk_embeddings ce \
                 INNER JOIN documents d ON ce.document_id = d.id \
                 WHERE d.user_id = ?",
            )
            .bind(user_id)
            .fetch_all(pool)
            .await
        }
        .map_err(|e| RagError::Retrieval(format!("Similarity query failed: {}", e)))?;

        let mut scored = Vec::with_capacity(candidates.len());
        for row in candidates {
            let vector = decode_embedding(&row.embedding)
                .map_err(|e| RagError::Retrieval(e.to_string()))?;
            let distance = cosine_distance(query_vector, &vector)
                .map_err(|e| RagError::Retrieval(e.to_string()))?;
            scored.push((distance, row.created_at, row.row_id, row.title, row.chunk_text));
        }

        scored.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        scored.truncate(k);

        debug!(
            "Nearest-neighbor search for user {} returned {} results",
            user_id,
            scored.len()
        );

        Ok(scored
            .into_iter()
            .map(|(distance, _, _, title, chunk_text)| ScoredChunk {
                source_title: title,
                content: chunk_text,
                distance,
            })
            .collect())
    }
}

pub struct UsageQueries;

impl UsageQueries {
    /// Fetch the user's usage record, creating it with the configured limits
    /// on first use. Creation is race-safe via INSERT OR IGNORE.
    #[inline]
    pub async fn get_or_create(
        pool: &SqlitePool,
        user_id: &str,
        limits: &UsageLimits,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord> {
        sqlx::query(
            "INSERT OR IGNORE INTO usage_records \
             (id, user_id, request_count, request_limit, tokens_used, token_limit, \
              last_request_reset, last_token_reset) \
             VALUES (?, ?, 0, ?, 0, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(limits.request_limit)
        .bind(limits.token_limit)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to create usage record: {}", e)))?;

        Self::get(pool, user_id)
            .await?
            .ok_or_else(|| RagError::Database("Usage record missing after creation".to_string()))
    }

    #[inline]
    pub async fn get(pool: &SqlitePool, user_id: &str) -> Result<Option<UsageRecord>> {
        sqlx::query_as::<_, UsageRecord>(
            "SELECT id, user_id, request_count, request_limit, tokens_used, token_limit, \
             last_request_reset, last_token_reset \
             FROM usage_records WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to get usage record: {}", e)))
    }

    #[inline]
    pub async fn reset_request_counter(
        pool: &SqlitePool,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE usage_records SET request_count = 0, last_request_reset = ? \
             WHERE user_id = ?",
        )
        .bind(now)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to reset request counter: {}", e)))?;

        Ok(())
    }

    #[inline]
    pub async fn reset_token_counter(
        pool: &SqlitePool,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE usage_records SET tokens_used = 0, last_token_reset = ? \
             WHERE user_id = ?",
        )
        .bind(now)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to reset token counter: {}", e)))?;

        Ok(())
    }

    /// Increment the request counter only while under the limit, as a single
    /// conditional update. Two racing requests at the boundary cannot both
    /// pass: exactly one update matches. Returns whether the increment won.
    #[inline]
    pub async fn try_increment_request(pool: &SqlitePool, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE usage_records SET request_count = request_count + 1 \
             WHERE user_id = ? AND request_count < request_limit",
        )
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to increment request count: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn add_tokens(pool: &SqlitePool, user_id: &str, count: i64) -> Result<()> {
        sqlx::query("UPDATE usage_records SET tokens_used = tokens_used + ? WHERE user_id = ?")
            .bind(count)
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(|e| RagError::Database(format!("Failed to add token usage: {}", e)))?;

        Ok(())
    }
}
