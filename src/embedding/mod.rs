use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use fnv::FnvHasher;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// In-process sentence-transformer embeddings through `fastembed`.
///
/// The ONNX model is downloaded and loaded on first use, inside a blocking task, and then kept
/// for the lifetime of the client. Build one client at start-up and share it.
pub struct FastEmbedClient {
    model: EmbeddingModel,
    cache_dir: Option<PathBuf>,
    runtime: Arc<Mutex<Option<TextEmbedding>>>,
}

impl FastEmbedClient {
    /// Construct a client for a supported model name; the model itself loads lazily.
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self, EmbeddingClientError> {
        Ok(Self {
            model: resolve_fastembed_model(model_name)?,
            cache_dir,
            runtime: Arc::new(Mutex::new(None)),
        })
    }
}

/// Map a configured model name onto a built-in `fastembed` model.
fn resolve_fastembed_model(name: &str) -> Result<EmbeddingModel, EmbeddingClientError> {
    match name.trim().to_lowercase().as_str() {
        "all-minilm"
        | "all-minilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2"
        | "qdrant/all-minilm-l6-v2-onnx" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        other => Err(EmbeddingClientError::ProviderUnavailable(format!(
            "unsupported fastembed model: {other}"
        ))),
    }
}

fn load_fastembed_model(
    model: EmbeddingModel,
    cache_dir: Option<PathBuf>,
) -> Result<TextEmbedding, EmbeddingClientError> {
    tracing::info!(model = ?model, "Loading embedding model");
    let mut options = InitOptions::new(model).with_show_download_progress(false);
    if let Some(dir) = cache_dir {
        options = options.with_cache_dir(dir);
    }
    TextEmbedding::try_new(options)
        .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))
}

#[async_trait]
impl EmbeddingClient for FastEmbedClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.clone();
        let cache_dir = self.cache_dir.clone();
        let runtime = Arc::clone(&self.runtime);
        tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            let mut guard = runtime.lock().map_err(|_| {
                EmbeddingClientError::GenerationFailed("embedding model lock poisoned".into())
            })?;
            if guard.is_none() {
                *guard = Some(load_fastembed_model(model, cache_dir)?);
            }
            let embedder = guard.as_mut().ok_or_else(|| {
                EmbeddingClientError::ProviderUnavailable("embedding model not loaded".into())
            })?;

            tracing::debug!(count = texts.len(), "Generating embeddings");
            embedder
                .embed(texts, None)
                .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))
        })
        .await
        .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))?
    }
}

/// Deterministic embedding client based on feature hashing.
///
/// Each lowercase alphanumeric token is hashed into one of `dimension` slots with a sign bit,
/// and the result is L2-normalized. Texts sharing words land close together under cosine
/// similarity. This is not a trained model; select it explicitly with `EMBEDDING_PROVIDER=hash`
/// for offline runs.
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a client producing vectors of the given dimension.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let mut hasher = FnvHasher::default();
            hasher.write(token.to_lowercase().as_bytes());
            let hash = hasher.finish();
            let position = (hash % dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[position] += sign;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        tracing::trace!(count = texts.len(), dimension = self.dimension, "Hashing embeddings");
        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Embedding client backed by a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Construct a client for the given runtime URL and model.
    pub fn new(base_url: String, model: String) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("rustyrag/embed")
            .build()
            .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        tracing::debug!(model = %self.model, count = expected, "Requesting Ollama embeddings");

        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::GenerationFailed(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if body.embeddings.len() != expected {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "expected {expected} embeddings, received {}",
                body.embeddings.len()
            )));
        }

        Ok(body.embeddings)
    }
}

/// Build the embedding client selected by configuration.
///
/// Call once at start-up and share the returned handle; the pipeline never creates its own.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    match config.embedding_provider {
        EmbeddingProvider::FastEmbed => Ok(Arc::new(FastEmbedClient::new(
            &config.embedding_model,
            config.embedding_cache_dir.clone(),
        )?)),
        EmbeddingProvider::Hash => Ok(Arc::new(HashEmbeddingClient::new(
            config.embedding_dimension,
        ))),
        EmbeddingProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Ok(Arc::new(OllamaEmbeddingClient::new(
                base_url,
                config.embedding_model.clone(),
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn hash_client_is_deterministic_and_normalized() {
        let client = HashEmbeddingClient::new(64);
        let first = client
            .generate_embeddings(vec!["The sky is blue".into()])
            .await
            .expect("embeddings");
        let second = client
            .generate_embeddings(vec!["the SKY is blue".into()])
            .await
            .expect("embeddings");

        assert_eq!(first, second);
        assert_eq!(first[0].len(), 64);
        let norm: f32 = first[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hash_client_scores_shared_words_higher() {
        let client = HashEmbeddingClient::new(384);
        let vectors = client
            .generate_embeddings(vec![
                "What color is the sky?".into(),
                "The sky is blue.".into(),
                "Invoices are due monthly.".into(),
            ])
            .await
            .expect("embeddings");

        assert!(cosine(&vectors[0], &vectors[1]) > cosine(&vectors[0], &vectors[2]));
    }

    #[tokio::test]
    async fn hash_client_maps_empty_text_to_zero_vector() {
        let client = HashEmbeddingClient::new(8);
        let vectors = client
            .generate_embeddings(vec!["  ".into()])
            .await
            .expect("embeddings");
        assert!(vectors[0].iter().all(|value| *value == 0.0));
    }

    #[tokio::test]
    async fn hash_client_rejects_zero_dimension() {
        let client = HashEmbeddingClient::new(0);
        let error = client
            .generate_embeddings(vec!["text".into()])
            .await
            .expect_err("zero dimension");
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
    }

    #[test]
    fn fastembed_model_names_resolve_to_minilm() {
        for name in ["all-minilm", "all-MiniLM-L6-v2", "sentence-transformers/all-MiniLM-L6-v2"] {
            assert_eq!(
                resolve_fastembed_model(name).expect("known model"),
                EmbeddingModel::AllMiniLML6V2
            );
        }
        assert!(matches!(
            resolve_fastembed_model("gpt-embeddings"),
            Err(EmbeddingClientError::ProviderUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn fastembed_client_loads_nothing_for_empty_input() {
        let client = FastEmbedClient::new("all-minilm", None).expect("client");
        let vectors = client
            .generate_embeddings(Vec::new())
            .await
            .expect("embeddings");

        assert!(vectors.is_empty());
        assert!(client.runtime.lock().expect("lock").is_none());
    }

    #[test]
    fn default_config_selects_the_pretrained_model() {
        let config = Config::default();
        assert_eq!(config.embedding_provider, EmbeddingProvider::FastEmbed);
        assert!(build_embedding_client(&config).is_ok());

        let unknown = Config {
            embedding_model: "unknown-model".into(),
            ..Config::default()
        };
        assert!(build_embedding_client(&unknown).is_err());
    }

    #[tokio::test]
    async fn ollama_client_parses_embeddings() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embed")
                    .json_body_partial(r#"{ "model": "all-minilm" }"#);
                then.status(200).json_body(json!({
                    "embeddings": [[0.1, 0.2], [0.3, 0.4]]
                }));
            })
            .await;

        let client =
            OllamaEmbeddingClient::new(server.base_url(), "all-minilm".into()).expect("client");
        let vectors = client
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn ollama_client_reports_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(500).body("model not loaded");
            })
            .await;

        let client =
            OllamaEmbeddingClient::new(server.base_url(), "all-minilm".into()).expect("client");
        let error = client
            .generate_embeddings(vec!["a".into()])
            .await
            .expect_err("error status");

        assert!(
            matches!(error, EmbeddingClientError::GenerationFailed(message) if message.contains("500"))
        );
    }
}
