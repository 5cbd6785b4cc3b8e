//! Text-generation collaborators used to answer questions.
//!
//! The answer stage hands a single prompt to a [`GenerationClient`] and returns the response
//! verbatim. Two HTTP backends are provided: the hosted Gemini API and a local Ollama runtime.
//! Neither retries; failures are surfaced to the caller unchanged.

use crate::config::{Config, GenerationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider was misconfigured or unreachable.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by text-generation providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a response for the prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationClientError>;
}

/// Build the generation client selected by configuration.
pub fn build_generation_client(
    config: &Config,
) -> Result<Arc<dyn GenerationClient>, GenerationClientError> {
    match config.generation_provider {
        GenerationProvider::Gemini => {
            let api_key = config.gemini_api_key.clone().ok_or_else(|| {
                GenerationClientError::ProviderUnavailable(
                    "GEMINI_API_KEY is not set".to_string(),
                )
            })?;
            Ok(Arc::new(GeminiGenerationClient::new(
                config.gemini_base_url.clone(),
                config.generation_model.clone(),
                api_key,
            )?))
        }
        GenerationProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Ok(Arc::new(OllamaGenerationClient::new(
                base_url,
                config.generation_model.clone(),
            )?))
        }
    }
}

fn http_client(agent: &str) -> Result<Client, GenerationClientError> {
    Client::builder()
        .user_agent(agent)
        .build()
        .map_err(|error| GenerationClientError::ProviderUnavailable(error.to_string()))
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiGenerationClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiGenerationClient {
    /// Construct a client for the given API root, model and key.
    pub fn new(
        base_url: String,
        model: String,
        api_key: String,
    ) -> Result<Self, GenerationClientError> {
        Ok(Self {
            http: http_client("rustyrag/gemini")?,
            base_url,
            model,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl GenerationClient for GeminiGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationClientError> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Requesting Gemini answer");
        let payload = json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ]
        });

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach Gemini at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "Gemini returned {status}: {body}"
            )));
        }

        let body: GeminiResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Gemini response: {error}"
            ))
        })?;

        let content = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .ok_or_else(|| {
                GenerationClientError::InvalidResponse("Gemini returned no candidates".into())
            })?;

        Ok(content
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<String>())
    }
}

/// Client for the Ollama `/api/generate` endpoint.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerationClient {
    /// Construct a client for the given runtime URL and model.
    pub fn new(base_url: String, model: String) -> Result<Self, GenerationClientError> {
        Ok(Self {
            http: http_client("rustyrag/ollama")?,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationClientError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(GenerationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn gemini_client_joins_candidate_parts() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-1.5-flash:generateContent")
                    .query_param("key", "secret")
                    .body_contains("What color is the sky?");
                then.status(200).json_body(json!({
                    "candidates": [
                        { "content": { "parts": [ { "text": "The sky " }, { "text": "is blue." } ] } }
                    ]
                }));
            })
            .await;

        let client = GeminiGenerationClient::new(
            server.base_url(),
            "gemini-1.5-flash".into(),
            "secret".into(),
        )
        .expect("client");
        let answer = client
            .generate("Question: What color is the sky?")
            .await
            .expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "The sky is blue.");
    }

    #[tokio::test]
    async fn gemini_client_rejects_empty_candidates() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({ "candidates": [] }));
            })
            .await;

        let client =
            GeminiGenerationClient::new(server.base_url(), "m".into(), "k".into()).expect("client");
        let error = client.generate("prompt").await.expect_err("no candidates");
        assert!(matches!(error, GenerationClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn ollama_client_returns_response_verbatim() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "  Blue.\n",
                    "done": true
                }));
            })
            .await;

        let client =
            OllamaGenerationClient::new(server.base_url(), "llama3".into()).expect("client");
        let answer = client.generate("prompt").await.expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "  Blue.\n");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let client =
            OllamaGenerationClient::new(server.base_url(), "llama3".into()).expect("client");
        let error = client.generate("prompt").await.expect_err("error response");

        assert!(
            matches!(error, GenerationClientError::GenerationFailed(message) if message.contains("500"))
        );
    }

    #[test]
    fn gemini_requires_api_key() {
        let config = Config::default();
        let error = build_generation_client(&config)
            .err()
            .expect("missing key");
        assert!(matches!(error, GenerationClientError::ProviderUnavailable(_)));
    }
}
