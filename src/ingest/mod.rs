
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::Config;
use crate::database::Database;
use crate::database::models::NewChunkEmbedding;
use crate::embeddings::chunking::TextSplitter;
use crate::embeddings::provider::EmbeddingProvider;
use crate::{RagError, Result};

/// Summary of a completed ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub chunks_count: usize,
}

/// Orchestrates chunking, batched embedding, and persistence for one
/// document: raw text in, queryable chunk embeddings out.
///
/// Batches are embedded sequentially with a configurable pause between them.
/// The pause is backpressure against provider throttling, not a performance
/// knob; tests set it to zero.
pub struct IngestionPipeline {
    db: Database,
    provider: Arc<dyn EmbeddingProvider>,
    splitter: TextSplitter,
    batch_size: usize,
    batch_delay: Duration,
}

impl IngestionPipeline {
    #[inline]
    pub fn new(db: Database, provider: Arc<dyn EmbeddingProvider>, config: &Config) -> Self {
        Self {
            db,
            provider,
            splitter: TextSplitter::new(&config.chunking),
            batch_size: (config.provider.batch_size as usize).max(1),
            batch_delay: Duration::from_millis(config.provider.batch_delay_ms),
        }
    }

    /// Ingest one document's raw text.
    ///
    /// Re-ingestion is idempotent: any chunk embeddings already stored for
    /// the document are removed before the new ones are written. Fails with
    /// [`RagError::EmptyDocument`] when the text is blank and with
    /// [`RagError::Ingestion`] when a persistence write fails mid-run; a
    /// failed insert aborts the remaining inserts rather than leaving silent
    /// gaps.
    pub async fn ingest(&self, document_id: &str, raw_text: &str) -> Result<IngestOutcome> {
        if raw_text.trim().is_empty() {
            return Err(RagError::EmptyDocument);
        }

        info!(
            "Starting ingestion for document {} ({} chars)",
            document_id,
            raw_text.len()
        );

        let chunks = self.splitter.split(raw_text);
        if chunks.is_empty() {
            // Unchunkable input must not block the upload flow.
            return Ok(IngestOutcome { chunks_count: 0 });
        }
        debug!("Split document {} into {} chunks", document_id, chunks.len());

        let embeddings = self.embed_in_batches(&chunks).await?;

        let replaced = self
            .db
            .delete_chunks_for_document(document_id)
            .await
            .map_err(|e| RagError::Ingestion(e.to_string()))?;
        if replaced > 0 {
            debug!(
                "Replaced {} existing chunk embeddings for document {}",
                replaced, document_id
            );
        }

        for (chunk_text, embedding) in chunks.iter().zip(embeddings) {
            self.db
                .insert_chunk(NewChunkEmbedding {
                    document_id: document_id.to_string(),
                    chunk_text: chunk_text.clone(),
                    embedding,
                })
                .await
                .map_err(|e| RagError::Ingestion(e.to_string()))?;
        }

        info!(
            "Ingested document {}: {} chunk embeddings stored",
            document_id,
            chunks.len()
        );

        Ok(IngestOutcome {
            chunks_count: chunks.len(),
        })
    }

    /// Embed all chunks in fixed-size sequential batches, preserving overall
    /// chunk order across batches.
    async fn embed_in_batches(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
        let total_batches = chunks.len().div_ceil(self.batch_size);
        let mut embeddings = Vec::with_capacity(chunks.len());

        for (batch_index, batch) in chunks.chunks(self.batch_size).enumerate() {
            let batch_embeddings = self.provider.embed(batch).await?;
            if batch_embeddings.len() != batch.len() {
                return Err(RagError::Provider {
                    status: 200,
                    body: format!(
                        "embedding count mismatch: sent {} chunks, received {} vectors",
                        batch.len(),
                        batch_embeddings.len()
                    ),
                });
            }
            embeddings.extend(batch_embeddings);

            info!(
                "Batch {}/{}: embedded {} chunks",
                batch_index + 1,
                total_batches,
                batch.len()
            );

            let is_last = batch_index + 1 == total_batches;
            if !is_last && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        Ok(embeddings)
    }
}
