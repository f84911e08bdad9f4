use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding provider error (status {status}): {body}")]
    Provider { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Document text is empty")]
    EmptyDocument,

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Daily request limit of {limit} exceeded")]
    RateLimit { limit: i64 },

    #[error("Monthly token limit of {limit} exceeded")]
    TokenLimit { limit: i64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod config;
pub mod database;
pub mod embeddings;
pub mod ingest;
pub mod retrieval;
pub mod usage;
