// Embeddings module
// Text chunking and the remote embedding provider client

pub mod chunking;
pub mod provider;

pub use chunking::TextSplitter;
pub use provider::{EmbeddingProvider, HttpEmbeddingClient};
