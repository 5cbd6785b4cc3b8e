use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_UPLOAD_DIR: &str = "data";
const DEFAULT_VECTOR_STORE_DIR: &str = "vector_store";
const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_CHUNK_SIZE: usize = 100;
const DEFAULT_CHUNK_OVERLAP: usize = 20;
const DEFAULT_TOP_K: usize = 4;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty RAG server and CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory that receives uploaded files before parsing.
    pub upload_dir: PathBuf,
    /// Directory holding the persisted vector index.
    pub vector_store_dir: PathBuf,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Directory where in-process embedding models are downloaded and cached.
    pub embedding_cache_dir: Option<PathBuf>,
    /// Text-generation backend used to answer questions.
    pub generation_provider: GenerationProvider,
    /// Model identifier passed to the generation backend.
    pub generation_model: String,
    /// API key for the Gemini backend.
    pub gemini_api_key: Option<String>,
    /// Base URL of the Gemini REST API.
    pub gemini_base_url: String,
    /// Optional Ollama base URL shared by embedding and generation clients.
    pub ollama_url: Option<String>,
    /// Target chunk length in characters.
    pub text_splitter_chunk_size: usize,
    /// Characters shared between neighbouring chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Number of chunks returned by a retrieval.
    pub retrieval_top_k: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the indexing engine.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Pretrained sentence-transformer run in process through ONNX Runtime.
    FastEmbed,
    /// Local Ollama runtime.
    Ollama,
    /// Feature hashing with no model download. Opt-in for offline use and tests.
    Hash,
}

impl EmbeddingProvider {
    /// Stable lowercase name, as accepted by `EMBEDDING_PROVIDER`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FastEmbed => "fastembed",
            Self::Ollama => "ollama",
            Self::Hash => "hash",
        }
    }
}

/// Supported text-generation backends for the answer stage.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Hosted Google Gemini API.
    Gemini,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            upload_dir: load_env_optional("UPLOAD_DIR")
                .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string())
                .into(),
            vector_store_dir: load_env_optional("VECTOR_STORE_DIR")
                .unwrap_or_else(|| DEFAULT_VECTOR_STORE_DIR.to_string())
                .into(),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::FastEmbed),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_env_or("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?,
            embedding_cache_dir: load_env_optional("EMBEDDING_CACHE_DIR").map(PathBuf::from),
            generation_provider: load_env_optional("GENERATION_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("GENERATION_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(GenerationProvider::Gemini),
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            gemini_api_key: load_env_optional("GEMINI_API_KEY"),
            gemini_base_url: load_env_optional("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            ollama_url: load_env_optional("OLLAMA_URL"),
            text_splitter_chunk_size: parse_env_or("TEXT_SPLITTER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            text_splitter_chunk_overlap: parse_env_or(
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                DEFAULT_CHUNK_OVERLAP,
            )?,
            retrieval_top_k: parse_env_or("RETRIEVAL_TOP_K", DEFAULT_TOP_K)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_dir: DEFAULT_UPLOAD_DIR.into(),
            vector_store_dir: DEFAULT_VECTOR_STORE_DIR.into(),
            embedding_provider: EmbeddingProvider::FastEmbed,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            embedding_cache_dir: None,
            generation_provider: GenerationProvider::Gemini,
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            gemini_api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            ollama_url: None,
            text_splitter_chunk_size: DEFAULT_CHUNK_SIZE,
            text_splitter_chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            retrieval_top_k: DEFAULT_TOP_K,
            server_port: None,
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_or(key: &str, default: usize) -> Result<usize, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fastembed" => Ok(Self::FastEmbed),
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        upload_dir = %config.upload_dir.display(),
        vector_store_dir = %config.vector_store_dir.display(),
        server_port = ?config.server_port,
        embedding_provider = ?config.embedding_provider,
        generation_provider = ?config.generation_provider,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!("Hash".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Hash));
        assert_eq!(" OLLAMA ".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Ollama));
        assert_eq!(
            "FastEmbed".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::FastEmbed)
        );
        assert_eq!("gemini".parse::<GenerationProvider>(), Ok(GenerationProvider::Gemini));
        assert!("openai".parse::<GenerationProvider>().is_err());
    }

    #[test]
    fn defaults_match_fixed_pipeline_constants() {
        let config = Config::default();
        assert_eq!(config.text_splitter_chunk_size, 100);
        assert_eq!(config.text_splitter_chunk_overlap, 20);
        assert_eq!(config.retrieval_top_k, 4);
        assert_eq!(config.embedding_provider, EmbeddingProvider::FastEmbed);
        assert_eq!(config.embedding_dimension, 384);
    }
}
