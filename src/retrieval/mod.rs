
use std::sync::Arc;

use tracing::debug;

use crate::Result;
use crate::database::Database;
use crate::embeddings::provider::EmbeddingProvider;

pub const DEFAULT_TOP_K: usize = 5;

/// A ranked piece of context for prompt assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedChunk {
    pub source_title: String,
    pub content: String,
}

/// Embeds a free-text query and runs a scoped nearest-neighbor search over
/// the stored chunk embeddings. Results are always restricted to the
/// requesting user's documents; the scope is applied in the store query and
/// cannot be widened by query text.
pub struct RetrievalEngine {
    db: Database,
    provider: Arc<dyn EmbeddingProvider>,
}

impl RetrievalEngine {
    #[inline]
    pub fn new(db: Database, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { db, provider }
    }

    /// Return the top-`k` most relevant chunks for `query`, most relevant
    /// first, optionally restricted to one document.
    ///
    /// A blank query returns an empty result without touching the provider.
    /// Provider failures propagate as [`crate::RagError::Provider`]; store
    /// failures surface as [`crate::RagError::Retrieval`].
    pub async fn retrieve(
        &self,
        query: &str,
        user_id: &str,
        k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = self.provider.embed(&[query.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(crate::RagError::Provider {
                status: 200,
                body: format!("expected 1 query vector, received {}", vectors.len()),
            });
        }
        let query_vector = vectors.swap_remove(0);

        let scored = self
            .db
            .nearest_chunks(&query_vector, user_id, document_id, k)
            .await?;

        debug!(
            "Retrieved {} context chunks for user {} (k = {}, document scope: {})",
            scored.len(),
            user_id,
            k,
            document_id.unwrap_or("none")
        );

        Ok(scored
            .into_iter()
            .map(|chunk| RetrievedChunk {
                source_title: chunk.source_title,
                content: chunk.content,
            })
            .collect())
    }
}
