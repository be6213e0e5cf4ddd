//! Async client for a locally hosted Ollama service
//!
//! Stateless wrapper over three endpoints: the model list doubles as a
//! liveness probe, and generation asks the backend for JSON output.
//! Nothing here panics or propagates transport details beyond the error
//! taxonomy; `probe` and `list_models` never fail at all.

use crate::core::config::AssistConfig;
use crate::core::error::{AssistError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Async client for the language model service
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    probe_timeout: Duration,
    list_timeout: Duration,
    generate_timeout: Duration,
}

impl OllamaClient {
    /// Create a client for `base_url` (e.g. `http://localhost:11434`)
    pub fn new(base_url: impl Into<String>, config: &AssistConfig) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            probe_timeout: config.probe_timeout,
            list_timeout: config.list_timeout,
            generate_timeout: config.generate_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    /// Whether the service answers within the probe timeout
    pub async fn probe(&self) -> bool {
        let result = self
            .client
            .get(self.endpoint("tags"))
            .timeout(self.probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, url = %self.base_url, "Language model probe failed");
                false
            }
        }
    }

    /// Names of installed models; empty on any failure
    pub async fn list_models(&self) -> Vec<String> {
        match self.fetch_models().await {
            Ok(models) => models,
            Err(e) => {
                tracing::debug!(error = %e, "Could not list models");
                Vec::new()
            }
        }
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.endpoint("tags"))
            .timeout(self.list_timeout)
            .send()
            .await
            .map_err(|e| AssistError::BackendUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistError::BackendError {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let tags: TagsResponse = response.json().await.map_err(|e| AssistError::BackendError {
            status: status.as_u16(),
            body: format!("invalid model list: {}", e),
        })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Run one non-streaming generation and return the model's text
    ///
    /// Transport failures and timeouts map to
    /// [`AssistError::BackendUnreachable`]; any non-200 status (or a 200
    /// without a `response` field) maps to [`AssistError::BackendError`].
    pub async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(self.endpoint("generate"))
            .timeout(self.generate_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| AssistError::BackendUnreachable(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistError::BackendError {
                status: status.as_u16(),
                body,
            });
        }

        let completion: GenerateResponse =
            response.json().await.map_err(|e| AssistError::BackendError {
                status: status.as_u16(),
                body: format!("invalid generate envelope: {}", e),
            })?;

        completion.response.ok_or_else(|| AssistError::BackendError {
            status: status.as_u16(),
            body: "missing \"response\" field".into(),
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_trims_slash() {
        let client = OllamaClient::new("http://localhost:11434/", &AssistConfig::default());
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.endpoint("generate"), "http://localhost:11434/api/generate");
    }

    #[test]
    fn test_timeouts_come_from_config() {
        let config = AssistConfig {
            generate_timeout: Duration::from_secs(90),
            ..AssistConfig::default()
        };
        let client = OllamaClient::new("http://ollama", &config);
        assert_eq!(client.probe_timeout, Duration::from_secs(2));
        assert_eq!(client.generate_timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_generate_request_shape() {
        let request = GenerateRequest {
            model: "llama2",
            prompt: "hi",
            stream: false,
            format: "json",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "llama2", "prompt": "hi", "stream": false, "format": "json"})
        );
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // Port 9 (discard) is closed on test machines
        let client = OllamaClient::new("http://127.0.0.1:9", &AssistConfig::default());
        assert!(!client.probe().await);
        assert!(client.list_models().await.is_empty());
        let err = client.generate("prompt", "llama2").await.unwrap_err();
        assert!(matches!(err, AssistError::BackendUnreachable(_)));
    }
}
