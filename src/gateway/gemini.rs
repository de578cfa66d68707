// src/gateway/gemini.rs

use super::classify::ResponseClassifier;
use super::ModelClient;
use crate::error::{AppError, ModelError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

struct Binding {
    key: Secret<String>,
    model: String,
}

/// `generateContent` client for the Gemini REST API.
pub struct GeminiClient {
    http: Client,
    api_base: Url,
    binding: RwLock<Option<Binding>>,
    classifier: ResponseClassifier,
}

impl GeminiClient {
    pub fn new(api_base: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()
            .map_err(|e| AppError::HttpClient {
                message: format!("failed to build the HTTP client: {e}"),
                status_code: None,
            })?;
        Ok(Self {
            http,
            api_base,
            binding: RwLock::new(None),
            classifier: ResponseClassifier::default(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.as_str().trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    #[instrument(level = "debug", skip_all, fields(prompt.len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let (key, model) = {
            let guard = self.binding.read();
            let binding = guard
                .as_ref()
                .ok_or_else(|| ModelError::Other("model client is not configured".to_string()))?;
            (binding.key.expose_secret().clone(), binding.model.clone())
        };

        let body = GenerateRequest {
            contents: [RequestContent {
                role: "user",
                parts: [RequestPart { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(self.endpoint(&model))
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(status = status.as_u16(), body.len = text.len(), "Gemini response received");

        if !status.is_success() {
            return Err(self.classifier.classify(status, &text));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| ModelError::MalformedResponse(format!("undecodable body: {e}")))?;
        let output: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let output = output.trim();
        if output.is_empty() {
            return Err(ModelError::MalformedResponse("response contained no text".to_string()));
        }
        Ok(output.to_string())
    }

    fn configure(&self, key: &Secret<String>, model: &str) -> Result<(), ModelError> {
        if key.expose_secret().trim().is_empty() {
            return Err(ModelError::Other("API key cannot be empty".to_string()));
        }
        if model.trim().is_empty() {
            return Err(ModelError::Other("model name cannot be empty".to_string()));
        }
        *self.binding.write() = Some(Binding {
            key: Secret::new(key.expose_secret().clone()),
            model: model.trim().to_string(),
        });
        Ok(())
    }
}
