// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for receipt-renamer

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::naming;
use crate::{ReceiptError, Result};

/// Directory name used under the platform config and cache roots
pub const APP_DIR: &str = "receipt-renamer";

/// Per-directory override file, read from the directory being processed
pub const LOCAL_CONFIG_FILE: &str = ".receipt-renamer.json";

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// AI provider settings
    #[serde(default)]
    pub ai: AiConfig,

    /// Analysis cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Output naming settings
    #[serde(default)]
    pub format: FormatConfig,
}

/// Supported analysis backends
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-sonnet-4-20250514",
            Provider::OpenAi => "gpt-4o",
        }
    }

    pub fn env_key(self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    /// OpenAI-compatible endpoint (Ollama, LM Studio, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Parallel analysis slots; values <= 0 are treated as 1
    #[serde(default = "default_max_workers")]
    pub max_workers: i64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Days until an entry expires (0 = never)
    #[serde(default)]
    pub ttl_days: u32,
    /// Overrides the platform cache directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FormatConfig {
    /// Middle part of `<Date>-<pattern>-<OriginalName>`; empty means `{{Service}}`
    #[serde(default)]
    pub service_pattern: String,
    /// Target file extension, matched case-insensitively
    #[serde(default = "default_extension")]
    pub extension: String,
}

/// Concurrency settings for the analysis orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    max_concurrency: usize,
}

// Default value functions
fn default_max_workers() -> i64 { 3 }
fn default_timeout() -> u64 { 120 }
fn default_true() -> bool { true }
fn default_extension() -> String { "pdf".to_string() }

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: None,
            base_url: None,
            api_key: None,
            model: None,
            max_workers: default_max_workers(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_days: 0,
            dir: None,
        }
    }
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            service_pattern: String::new(),
            extension: default_extension(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn new(requested: i64) -> Self {
        let max_concurrency = usize::try_from(requested).unwrap_or(0).max(1);
        Self { max_concurrency }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(default_max_workers())
    }
}

impl CacheConfig {
    /// Directory holding one JSON entry per content hash
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| default_cache_root().join("analysis"))
    }
}

impl AiConfig {
    pub fn worker_pool(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new(self.max_workers)
    }

    /// Human-readable provider description for status output
    pub fn display_name(&self) -> String {
        match (self.provider, self.base_url.as_deref()) {
            (Some(Provider::Anthropic), _) => "Anthropic Claude API".to_string(),
            (Some(Provider::OpenAi), Some(url)) => format!("OpenAI-compatible API ({})", url),
            (Some(Provider::OpenAi), None) => "OpenAI API".to_string(),
            (None, _) => "unconfigured".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| ReceiptError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file. The API key is never written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut to_save = self.clone();
        to_save.ai.api_key = None;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(&to_save)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve credentials from the process environment
    pub fn resolve_credentials(&mut self) -> Result<()> {
        self.resolve_credentials_with(|name| std::env::var(name).ok())
    }

    /// Expand `${VAR}` references, detect the provider and pick a default model.
    ///
    /// Fails when no API key can be found for any provider.
    pub fn resolve_credentials_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ai = &mut self.ai;
        ai.api_key = ai.api_key.take().and_then(|v| expand_env_var(&v, &lookup));
        ai.base_url = ai.base_url.take().and_then(|v| expand_env_var(&v, &lookup));

        if ai.api_key.is_none() {
            // A configured provider only looks at its own variable
            let candidates: &[Provider] = match ai.provider {
                Some(Provider::Anthropic) => &[Provider::Anthropic],
                Some(Provider::OpenAi) => &[Provider::OpenAi],
                None => &[Provider::Anthropic, Provider::OpenAi],
            };

            let (provider, key) = candidates
                .iter()
                .find_map(|&provider| {
                    lookup(provider.env_key())
                        .filter(|k| !k.is_empty())
                        .map(|k| (provider, k))
                })
                .ok_or_else(|| {
                    ReceiptError::Config(
                        "no API key found: set ANTHROPIC_API_KEY or OPENAI_API_KEY, \
                         or specify ai.api_key in the config file"
                            .to_string(),
                    )
                })?;

            ai.provider = Some(provider);
            ai.api_key = Some(key);
        }

        let provider = *ai.provider.get_or_insert(Provider::Anthropic);
        if ai.model.as_deref().map_or(true, str::is_empty) {
            ai.model = Some(provider.default_model().to_string());
        }

        Ok(())
    }

    /// Apply `.receipt-renamer.json` from the target directory, if present.
    ///
    /// Only `format.service_pattern` is taken from the local file, and only when it
    /// forms a valid template; anything else is reported and ignored.
    pub fn apply_local_overrides(&mut self, directory: &Path) {
        let local_path = directory.join(LOCAL_CONFIG_FILE);
        if !local_path.exists() {
            return;
        }

        let local: LocalConfig = match std::fs::read_to_string(&local_path)
            .map_err(ReceiptError::from)
            .and_then(|s| serde_json::from_str(&s).map_err(ReceiptError::from))
        {
            Ok(local) => local,
            Err(e) => {
                warn!("Failed to load local config {:?}: {}", local_path, e);
                return;
            }
        };

        let Some(pattern) = local.format.and_then(|f| f.service_pattern) else {
            return;
        };
        if pattern.is_empty() {
            return;
        }

        match naming::validate_fragment(&pattern) {
            Ok(()) => {
                info!("Using service pattern from {:?}", local_path);
                self.format.service_pattern = pattern;
            }
            Err(e) => {
                warn!(
                    "Invalid service_pattern in {:?}: {} (using global config)",
                    local_path, e
                );
            }
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct LocalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format: Option<LocalFormatConfig>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct LocalFormatConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service_pattern: Option<String>,
}

/// Persist a service pattern into the directory's local override file
pub fn save_local_pattern(directory: &Path, pattern: &str) -> Result<()> {
    let local_path = directory.join(LOCAL_CONFIG_FILE);

    let mut local: LocalConfig = std::fs::read_to_string(&local_path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    local
        .format
        .get_or_insert_with(LocalFormatConfig::default)
        .service_pattern = Some(pattern.to_string());

    std::fs::write(&local_path, serde_json::to_string_pretty(&local)?)?;
    Ok(())
}

fn expand_env_var<F>(value: &str, lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = match value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        Some(name) => lookup(name)?,
        None => value.to_string(),
    };
    (!expanded.is_empty()).then_some(expanded)
}

fn default_config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// `<config_dir>/receipt-renamer/config.json`
pub fn default_config_path() -> PathBuf {
    default_config_root().join("config.json")
}

/// `<config_dir>/receipt-renamer/pattern_history.json`
pub fn default_history_path() -> PathBuf {
    default_config_root().join("pattern_history.json")
}
