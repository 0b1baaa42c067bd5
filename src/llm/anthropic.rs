//! Anthropic messages API client for document extraction.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::{ExtractionModel, ExtractionRequest};
use crate::config::ExtractionConfig;
use crate::error::LlmError;

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicModel {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    endpoint: String,
}

impl AnthropicModel {
    pub fn new(api_key: SecretString, model: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(
            config.api_key.clone(),
            config.model.clone(),
            config.endpoint.clone(),
        )
    }

    fn request_body(&self, request: &ExtractionRequest) -> serde_json::Value {
        let block_type = if request.media_type.is_document() {
            "document"
        } else {
            "image"
        };
        serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": block_type,
                        "source": {
                            "type": "base64",
                            "media_type": request.media_type.as_mime(),
                            "data": STANDARD.encode(&request.payload),
                        }
                    },
                    { "type": "text", "text": request.instruction }
                ]
            }]
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// First text block of a messages response, or empty.
fn first_text(response: MessagesResponse) -> String {
    response
        .content
        .into_iter()
        .find(|b| b.kind == "text")
        .and_then(|b| b.text)
        .unwrap_or_default()
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl ExtractionModel for AnthropicModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn extract(&self, request: ExtractionRequest) -> Result<String, LlmError> {
        debug!(
            model = %self.model,
            media_type = %request.media_type,
            bytes = request.payload.len(),
            "Sending extraction request"
        );
        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(&request))
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(LlmError::AuthFailed {
                    provider: PROVIDER.into(),
                });
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(LlmError::RateLimited {
                    provider: PROVIDER.into(),
                    retry_after: retry_after(resp.headers()),
                });
            }
            s if !s.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(LlmError::RequestFailed {
                    provider: PROVIDER.into(),
                    reason: format!("HTTP {s}: {}", body.chars().take(200).collect::<String>()),
                });
            }
            _ => {}
        }

        let parsed: MessagesResponse = resp.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;
        Ok(first_text(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MediaType;

    fn model() -> AnthropicModel {
        AnthropicModel::new(
            SecretString::from("test-key".to_string()),
            "test-model",
            "http://localhost:0/v1/messages",
        )
    }

    fn request(media_type: MediaType) -> ExtractionRequest {
        ExtractionRequest {
            payload: b"%PDF-1.4".to_vec(),
            media_type,
            instruction: "Extract.".into(),
            max_tokens: 2000,
        }
    }

    #[test]
    fn pdf_goes_up_as_document_block() {
        let body = model().request_body(&request(MediaType::Pdf));
        let block = &body["messages"][0]["content"][0];
        assert_eq!(block["type"], "document");
        assert_eq!(block["source"]["media_type"], "application/pdf");
        assert_eq!(block["source"]["data"], "JVBERi0xLjQ=");
        assert_eq!(body["messages"][0]["content"][1]["text"], "Extract.");
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["model"], "test-model");
    }

    #[test]
    fn images_go_up_as_image_blocks() {
        let body = model().request_body(&request(MediaType::Png));
        assert_eq!(body["messages"][0]["content"][0]["type"], "image");
        assert_eq!(
            body["messages"][0]["content"][0]["source"]["media_type"],
            "image/png"
        );
    }

    #[test]
    fn first_text_block_wins() {
        let response: MessagesResponse = serde_json::from_value(serde_json::json!({
            "content": [
                { "type": "thinking" },
                { "type": "text", "text": "{\"total\": 1}" },
                { "type": "text", "text": "ignored" }
            ]
        }))
        .unwrap();
        assert_eq!(first_text(response), "{\"total\": 1}");
    }

    #[test]
    fn no_text_block_is_empty() {
        let response: MessagesResponse =
            serde_json::from_value(serde_json::json!({ "content": [] })).unwrap();
        assert_eq!(first_text(response), "");
    }

    #[test]
    fn retry_after_seconds() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(30)));
        assert_eq!(retry_after(&reqwest::header::HeaderMap::new()), None);
    }
}
