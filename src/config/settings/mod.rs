
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const OPENROUTER_EMBED_ENDPOINT: &str = "https://openrouter.ai/api/v1/embeddings";
pub const DEFAULT_EMBED_MODEL: &str = "nvidia/llama-nemotron-embed-vl-1b-v2:free";
const API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub limits: UsageLimits,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Which embedding backend the client talks to. Both speak the same
/// OpenAI-compatible wire contract; the choice only selects the default
/// endpoint when none is configured explicitly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderBackend {
    #[default]
    Openrouter,
    OpenaiCompat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub backend: ProviderBackend,
    /// Embeddings endpoint. Empty string means "use the backend default".
    pub endpoint: String,
    pub model: String,
    /// API key for the provider. Falls back to the OPENROUTER_API_KEY
    /// environment variable when empty; never written back to disk.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub batch_size: u32,
    /// Pause between embedding batches, to stay under provider rate limits.
    /// Zero disables the delay (used by tests).
    pub batch_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: ProviderBackend::Openrouter,
            endpoint: String::new(),
            model: DEFAULT_EMBED_MODEL.to_string(),
            api_key: String::new(),
            batch_size: 50,
            batch_delay_ms: 2000,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target window length in characters.
    pub chunk_size: usize,
    /// Shared trailing/leading length between adjacent windows.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UsageLimits {
    /// Requests allowed per rolling 24-hour window.
    pub request_limit: i64,
    /// Tokens allowed per rolling 30-day window.
    pub token_limit: i64,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            request_limit: 50,
            token_limit: 200_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid chunk size: {0} (must be at least 1)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid request limit: {0} (must be positive)")]
    InvalidRequestLimit(i64),
    #[error("Invalid token limit: {0} (must be positive)")]
    InvalidTokenLimit(i64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                provider: ProviderConfig::default(),
                chunking: ChunkingConfig::default(),
                limits: UsageLimits::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("tutor-rag"))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("knowledge.db")
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider.validate()?;
        self.validate_chunking()?;
        self.validate_limits()?;
        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;

        if chunking.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(chunking.chunk_size));
        }

        if chunking.overlap >= chunking.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                chunking.overlap,
                chunking.chunk_size,
            ));
        }

        Ok(())
    }

    fn validate_limits(&self) -> Result<(), ConfigError> {
        if self.limits.request_limit <= 0 {
            return Err(ConfigError::InvalidRequestLimit(self.limits.request_limit));
        }

        if self.limits.token_limit <= 0 {
            return Err(ConfigError::InvalidTokenLimit(self.limits.token_limit));
        }

        Ok(())
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.endpoint_url()?;
        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(ConfigError::InvalidEndpoint(endpoint.to_string()));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if self.timeout_seconds == 0 || self.timeout_seconds > 300 {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    /// Resolve the embeddings endpoint, falling back to the backend default.
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let raw = if self.endpoint.trim().is_empty() {
            match self.backend {
                ProviderBackend::Openrouter => OPENROUTER_EMBED_ENDPOINT,
                ProviderBackend::OpenaiCompat => "https://api.openai.com/v1/embeddings",
            }
        } else {
            self.endpoint.as_str()
        };

        Url::parse(raw).map_err(|_| ConfigError::InvalidEndpoint(raw.to_string()))
    }

    /// Resolve the API key, falling back to the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.trim().is_empty() {
            return Some(self.api_key.clone());
        }
        env::var(API_KEY_ENV_VAR)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}
