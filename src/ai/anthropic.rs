// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Anthropic Messages API backend (native PDF input)

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{cancellable, parse_receipt_response, ReceiptAnalyzer, ReceiptInfo, ANALYZE_PROMPT};
use crate::{ReceiptError, Result};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/// Analyzer backed by Claude
pub struct AnthropicAnalyzer {
    client: Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<RequestBlock<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RequestBlock<'a> {
    Document { source: DocumentSource },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct DocumentSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicAnalyzer {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }

    async fn request(&self, path: &Path) -> Result<ReceiptInfo> {
        let pdf = tokio::fs::read(path).await?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: vec![
                    RequestBlock::Document {
                        source: DocumentSource {
                            kind: "base64",
                            media_type: "application/pdf",
                            data: general_purpose::STANDARD.encode(&pdf),
                        },
                    },
                    RequestBlock::Text {
                        text: ANALYZE_PROMPT,
                    },
                ],
            }],
        };

        debug!("Sending request to Anthropic: model={}", self.model);

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ReceiptError::Provider(format!(
                "Anthropic returned status {}: {}",
                status, body
            )));
        }

        let result: MessagesResponse = response.json().await?;
        let text = result
            .content
            .into_iter()
            .find(|b| b.kind == "text")
            .and_then(|b| b.text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ReceiptError::Analysis("no text response from API".to_string()))?;

        parse_receipt_response(&text)
    }
}

#[async_trait]
impl ReceiptAnalyzer for AnthropicAnalyzer {
    fn name(&self) -> String {
        "Anthropic Claude".to_string()
    }

    async fn analyze(&self, path: &Path, cancel: &CancellationToken) -> Result<ReceiptInfo> {
        cancellable(cancel, self.request(path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = MessagesRequest {
            model: "m",
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: vec![
                    RequestBlock::Document {
                        source: DocumentSource {
                            kind: "base64",
                            media_type: "application/pdf",
                            data: "AAAA".to_string(),
                        },
                    },
                    RequestBlock::Text { text: "hi" },
                ],
            }],
        };

        let json = serde_json::to_value(&request).unwrap();
        let content = &json["messages"][0]["content"];
        assert_eq!(content[0]["type"], "document");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "application/pdf");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], "hi");
    }

    #[test]
    fn test_response_picks_text_block() {
        let raw = r#"{"content": [{"type": "thinking"}, {"type": "text", "text": "{\"date\": \"20250115\", \"service\": \"Cursor\"}"}]}"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        let text = response
            .content
            .into_iter()
            .find(|b| b.kind == "text")
            .and_then(|b| b.text)
            .unwrap();
        assert_eq!(parse_receipt_response(&text).unwrap().service, "Cursor");
    }
}
