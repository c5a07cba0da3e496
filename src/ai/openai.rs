// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! OpenAI chat completions backend (also serves compatible local servers)

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    cancellable, parse_receipt_response, PageRasterizer, ReceiptAnalyzer, ReceiptInfo,
    ANALYZE_PROMPT,
};
use crate::{ReceiptError, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_TOKENS: u32 = 1024;

/// Analyzer backed by an OpenAI-compatible vision model
pub struct OpenAiAnalyzer {
    client: Client,
    api_key: String,
    model: String,
    base_url: Option<String>,
    rasterizer: Arc<dyn PageRasterizer>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    ImageUrl { image_url: ImageUrl },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiAnalyzer {
    /// Fails when the rasterizer cannot run, since every request needs an image
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout: Duration,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Result<Self> {
        if !rasterizer.is_available() {
            return Err(ReceiptError::Provider(
                "OpenAI provider requires poppler (pdftoppm) for PDF conversion".to_string(),
            ));
        }

        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.map(|u| u.trim_end_matches('/').to_string());

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
            rasterizer,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
        )
    }

    async fn request(&self, path: &Path) -> Result<ReceiptInfo> {
        let png = self.rasterizer.first_page_png(path).await?;
        let data_url = format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&png)
        );

        let request = ChatRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url,
                            detail: "auto",
                        },
                    },
                    ContentPart::Text {
                        text: ANALYZE_PROMPT,
                    },
                ],
            }],
        };

        debug!("Sending vision request to {}: model={}", self.endpoint(), self.model);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ReceiptError::Provider(format!(
                "OpenAI returned status {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response.json().await?;
        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ReceiptError::Analysis("empty response from API".to_string()))?;

        parse_receipt_response(&text)
    }
}

#[async_trait]
impl ReceiptAnalyzer for OpenAiAnalyzer {
    fn name(&self) -> String {
        match &self.base_url {
            Some(url) => format!("OpenAI-compatible ({})", url),
            None => "OpenAI".to_string(),
        }
    }

    async fn analyze(&self, path: &Path, cancel: &CancellationToken) -> Result<ReceiptInfo> {
        cancellable(cancel, self.request(path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRasterizer {
        available: bool,
    }

    #[async_trait]
    impl PageRasterizer for FakeRasterizer {
        fn is_available(&self) -> bool {
            self.available
        }

        async fn first_page_png(&self, _path: &Path) -> Result<Vec<u8>> {
            Ok(vec![0x89, b'P', b'N', b'G'])
        }
    }

    fn analyzer(base_url: Option<&str>) -> Result<OpenAiAnalyzer> {
        OpenAiAnalyzer::new(
            "key".to_string(),
            "gpt-4o".to_string(),
            base_url.map(String::from),
            Duration::from_secs(5),
            Arc::new(FakeRasterizer { available: true }),
        )
    }

    #[test]
    fn test_requires_rasterizer() {
        let result = OpenAiAnalyzer::new(
            "key".to_string(),
            "gpt-4o".to_string(),
            None,
            Duration::from_secs(5),
            Arc::new(FakeRasterizer { available: false }),
        );
        assert!(matches!(result, Err(ReceiptError::Provider(_))));
    }

    #[test]
    fn test_endpoint_and_name() {
        let default = analyzer(None).unwrap();
        assert_eq!(default.endpoint(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(default.name(), "OpenAI");

        let local = analyzer(Some("http://localhost:11434/v1/")).unwrap();
        assert_eq!(local.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(local.name(), "OpenAI-compatible (http://localhost:11434/v1)");
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "gpt-4o",
            max_tokens: MAX_TOKENS,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "data:image/png;base64,AA".to_string(),
                            detail: "auto",
                        },
                    },
                    ContentPart::Text { text: "prompt" },
                ],
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        let content = &json["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image_url");
        assert_eq!(content[0]["image_url"]["detail"], "auto");
        assert_eq!(content[1]["type"], "text");
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let analyzer = analyzer(Some("http://127.0.0.1:9")).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = analyzer.analyze(Path::new("r.pdf"), &cancel).await;
        assert!(matches!(result, Err(ReceiptError::Cancelled)));
    }
}
