pub mod chat;
pub mod image;
pub mod presets;

pub use chat::ChatClient;
pub use image::ImageClient;

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use weft_core::error::{Result, WeftError};

/// A resolved OpenAI-compatible `/chat/completions` endpoint.
pub(crate) struct Endpoint {
    provider: String,
    url: Option<String>,
    api_key: Option<String>,
    needs_api_key: bool,
    headers: Vec<(String, String)>,
    http: Client,
}

impl Endpoint {
    pub(crate) fn new(
        provider: &str,
        base_url: Option<&str>,
        api_key: Option<&str>,
        timeout_secs: u64,
        extra_headers: &HashMap<String, String>,
    ) -> Result<Self> {
        let preset = presets::get_preset(provider);
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| WeftError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            provider: provider.to_string(),
            url: presets::completions_url(provider, base_url),
            api_key: api_key.filter(|k| !k.is_empty()).map(str::to_string),
            needs_api_key: preset.as_ref().map(|p| p.needs_api_key).unwrap_or(false),
            headers: presets::build_extra_headers(preset.as_ref(), extra_headers),
            http,
        })
    }

    /// POST `body` and decode the JSON response.
    pub(crate) async fn post<B: Serialize, T: DeserializeOwned>(&self, body: &B) -> Result<T> {
        let url = self.url.as_deref().ok_or_else(|| {
            WeftError::Provider(format!(
                "provider '{}' has no preset; set base_url",
                self.provider
            ))
        })?;

        if self.needs_api_key && self.api_key.is_none() {
            return Err(WeftError::Provider(format!(
                "missing API key for provider '{}'",
                self.provider
            )));
        }

        let mut req = self.http.post(url).json(body);
        if let Some(api_key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req
            .send()
            .await
            .map_err(|e| WeftError::Provider(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| WeftError::Provider(e.to_string()))?;

        if !status.is_success() {
            return Err(WeftError::Provider(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_message(&text)
            )));
        }

        debug!(provider = %self.provider, bytes = text.len(), "Provider response received");
        serde_json::from_str(&text)
            .map_err(|e| WeftError::Provider(format!("malformed response: {}", e)))
    }
}

/// Pull `error.message` out of an error body, falling back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":{"message":"Rate limited","code":429}}"#),
            "Rate limited"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let endpoint = Endpoint::new("openrouter", None, None, 5, &HashMap::new()).unwrap();
        let err = endpoint
            .post::<_, serde_json::Value>(&serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing API key"));
    }

    #[tokio::test]
    async fn test_unknown_provider_without_base_url() {
        let endpoint = Endpoint::new("mystery", None, Some("k"), 5, &HashMap::new()).unwrap();
        let err = endpoint
            .post::<_, serde_json::Value>(&serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::Provider(_)));
    }
}
