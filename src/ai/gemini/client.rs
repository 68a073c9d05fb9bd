use super::types::{GenerateContentRequest, GenerateContentResponse};
use crate::ai::fault::RemoteFault;
use crate::ai::GenerationTransport;
use crate::models::DEFAULT_BASE_URL;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Gemini REST transport.
///
/// Holds no credentials: the key travels with each call so one connection
/// pool can serve the configured key and ad-hoc key checks alike.
#[derive(Debug, Clone)]
pub struct GeminiHttpClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl GeminiHttpClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn generate_content_url(&self, model: &str) -> String {
        // Accept both bare IDs and `models/...` paths.
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl GenerationTransport for GeminiHttpClient {
    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerateContentRequest,
    ) -> std::result::Result<GenerateContentResponse, RemoteFault> {
        let url = self.generate_content_url(model);
        tracing::debug!(
            "Sending generateContent request to Gemini (model: {}, parts: {})",
            model,
            request.parts().len()
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Gemini: {}", e);
                RemoteFault::without_descriptor(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            tracing::error!("Failed to read Gemini response body: {}", e);
            RemoteFault::without_descriptor(e.to_string())
        })?;

        if !status.is_success() {
            tracing::error!("Gemini API error (status {}): {}", status, body);
            return Err(RemoteFault::from_response(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}\nBody: {}", e, body);
            RemoteFault::without_descriptor(format!("Failed to parse Gemini response: {}", e))
        })
    }
}
