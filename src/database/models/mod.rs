
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::Result;
use crate::database::vector::decode_embedding;

/// An uploaded study document. Content is immutable once created; deletion
/// cascades to the document's chunk embeddings.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub user_id: String,
    pub title: String,
    pub content: String,
}

/// One embedded chunk of a document. The vector is stored as a blob of
/// little-endian f32 values; use [`ChunkEmbedding::vector`] to decode it.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ChunkEmbedding {
    pub id: String,
    pub document_id: String,
    pub chunk_text: String,
    pub embedding: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl ChunkEmbedding {
    #[inline]
    pub fn vector(&self) -> Result<Vec<f32>> {
        decode_embedding(&self.embedding)
    }
}

#[derive(Debug, Clone)]
pub struct NewChunkEmbedding {
    pub document_id: String,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
}

/// Per-user quota counters. The request counter resets daily, the token
/// counter roughly monthly; both resets are applied lazily on access.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UsageRecord {
    pub id: String,
    pub user_id: String,
    pub request_count: i64,
    pub request_limit: i64,
    pub tokens_used: i64,
    pub token_limit: i64,
    pub last_request_reset: DateTime<Utc>,
    pub last_token_reset: DateTime<Utc>,
}

/// A retrieval candidate ranked by cosine distance (lower is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub source_title: String,
    pub content: String,
    pub distance: f32,
}
