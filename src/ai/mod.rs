// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Receipt analysis backends
//!
//! Every backend answers the same question: which date was this receipt paid on,
//! and which service issued it. Backends are selected once from configuration.

pub mod anthropic;
pub mod openai;
pub mod rasterize;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{AiConfig, Provider};
use crate::{ReceiptError, Result};

pub use anthropic::AnthropicAnalyzer;
pub use openai::OpenAiAnalyzer;
pub use rasterize::{PageRasterizer, PdftoppmRasterizer};

/// Information extracted from a receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptInfo {
    /// Payment date as `YYYYMMDD`
    pub date: String,
    /// Issuing service or company
    pub service: String,
}

impl ReceiptInfo {
    /// Reject results that do not satisfy the analyzer contract
    pub fn validate(self) -> Result<Self> {
        if self.date.len() != 8 || !self.date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ReceiptError::Analysis(format!(
                "date is not in YYYYMMDD format: {:?}",
                self.date
            )));
        }
        if self.service.trim().is_empty() {
            return Err(ReceiptError::Analysis("service name is empty".to_string()));
        }
        Ok(self)
    }
}

/// Trait for receipt analyzers
#[async_trait]
pub trait ReceiptAnalyzer: Send + Sync {
    /// Display name of this backend
    fn name(&self) -> String;

    /// Extract receipt info from the file at `path`.
    ///
    /// Implementations must return [`ReceiptError::Cancelled`] promptly once
    /// `cancel` fires.
    async fn analyze(&self, path: &Path, cancel: &CancellationToken) -> Result<ReceiptInfo>;
}

/// Instruction sent alongside the document
pub const ANALYZE_PROMPT: &str = "Extract the following from this receipt or invoice:\n\
1. The payment date (Paid date / Invoice date / Date) in YYYYMMDD format\n\
2. The service or company name\n\n\
Reply with this JSON only, no explanation:\n\
{\"date\": \"YYYYMMDD\", \"service\": \"service name\"}";

/// Create the analyzer for the configured provider.
///
/// Credentials must already be resolved; a missing provider or key is a setup error.
pub fn build_analyzer(config: &AiConfig) -> Result<Arc<dyn ReceiptAnalyzer>> {
    let provider = config
        .provider
        .ok_or_else(|| ReceiptError::Config("AI provider is not configured".to_string()))?;
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| ReceiptError::Config("API key is not configured".to_string()))?;
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| provider.default_model().to_string());
    let timeout = Duration::from_secs(config.timeout_secs);

    let analyzer: Arc<dyn ReceiptAnalyzer> = match provider {
        Provider::Anthropic => Arc::new(AnthropicAnalyzer::new(api_key, model, timeout)?),
        Provider::OpenAi => Arc::new(OpenAiAnalyzer::new(
            api_key,
            model,
            config.base_url.clone(),
            timeout,
            Arc::new(PdftoppmRasterizer::new()),
        )?),
    };

    Ok(analyzer)
}

/// Pull the `{...}` object out of a model reply and validate it
pub fn parse_receipt_response(text: &str) -> Result<ReceiptInfo> {
    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end + 1),
        _ => {
            return Err(ReceiptError::Analysis(format!(
                "no JSON found in response: {}",
                text
            )))
        }
    };

    let info: ReceiptInfo = serde_json::from_str(&text[start..end]).map_err(|e| {
        ReceiptError::Analysis(format!("failed to parse JSON response: {}, response: {}", e, text))
    })?;

    info.validate()
}

/// Run `fut` unless `cancel` fires first
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReceiptError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let info = parse_receipt_response(r#"{"date": "20250115", "service": "Cursor"}"#).unwrap();
        assert_eq!(info.date, "20250115");
        assert_eq!(info.service, "Cursor");
    }

    #[test]
    fn test_parse_json_wrapped_in_prose() {
        let text = "Here you go:\n```json\n{\"date\": \"20240229\", \"service\": \"AWS\"}\n```";
        let info = parse_receipt_response(text).unwrap();
        assert_eq!(info.service, "AWS");
    }

    #[test]
    fn test_parse_rejects_missing_json() {
        assert!(matches!(
            parse_receipt_response("I cannot read this"),
            Err(ReceiptError::Analysis(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_date() {
        assert!(parse_receipt_response(r#"{"date": "2025-01-15", "service": "X"}"#).is_err());
        assert!(parse_receipt_response(r#"{"date": "2025011", "service": "X"}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_blank_service() {
        assert!(parse_receipt_response(r#"{"date": "20250115", "service": "  "}"#).is_err());
    }

    #[test]
    fn test_build_requires_credentials() {
        let config = AiConfig::default();
        assert!(matches!(build_analyzer(&config), Err(ReceiptError::Config(_))));
    }

    #[test]
    fn test_build_anthropic() {
        let config = AiConfig {
            provider: Some(Provider::Anthropic),
            api_key: Some("key".to_string()),
            ..AiConfig::default()
        };
        let analyzer = build_analyzer(&config).unwrap();
        assert_eq!(analyzer.name(), "Anthropic Claude");
    }

    #[tokio::test]
    async fn test_cancellable_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = cancellable(&cancel, std::future::pending()).await;
        assert!(matches!(result, Err(ReceiptError::Cancelled)));
    }
}
