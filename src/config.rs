//! Configuration module for formfill.
//!
//! Handles loading, validating, and providing default configuration values.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_forms_dir() -> String {
    "./forms".to_string()
}

fn default_templates_dir() -> String {
    "./templates".to_string()
}

fn default_artifacts_dir() -> String {
    "./logs".to_string()
}

fn default_provider_kind() -> String {
    "openai".to_string()
}

fn default_chat_model() -> String {
    "qwen3".to_string()
}

fn default_embedding_model() -> String {
    "Qwen/Qwen3-Embedding-8B".to_string()
}

fn default_rerank_model() -> String {
    "BAAI/bge-reranker-v2-m3".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_chunk_size() -> usize {
    2000
}

fn default_chunk_overlap() -> usize {
    300
}

fn default_retrieval_top_k() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_max_context_window() -> usize {
    8192
}

fn default_safety_margin() -> usize {
    1500
}

fn default_batch_size() -> usize {
    5
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_response_tokens() -> u32 {
    2000
}

fn default_vector_store() -> String {
    "sqlite".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_forms_dir")]
    pub forms_dir: String,

    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,

    /// Where per-run artifacts (merged text, responses, XML, output PDFs)
    /// are written.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub rag: RagSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    /// Backend selector: `"openai"`, `"local"`, or `"mock"`.
    #[serde(default = "default_provider_kind")]
    pub kind: String,

    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_rerank_model")]
    pub rerank_model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Transport-level retries performed by the HTTP backend. The pipeline
    /// itself never retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RagSettings {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,

    #[serde(default = "default_true")]
    pub use_reranking: bool,

    #[serde(default = "default_max_context_window")]
    pub max_context_window: usize,

    #[serde(default = "default_safety_margin")]
    pub safety_margin: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,

    /// Retrieval backend: `"sqlite"` (sqlite-vec) or `"memory"`.
    #[serde(default = "default_vector_store")]
    pub vector_store: String,

    /// Optional path to a `tokenizer.json` for exact token counting.
    /// When absent, token counts are approximated as `chars / 4`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_json: Option<String>,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            forms_dir: default_forms_dir(),
            templates_dir: default_templates_dir(),
            artifacts_dir: default_artifacts_dir(),
            provider: ProviderConfig::default(),
            rag: RagSettings::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            base_url: String::new(),
            api_key: String::new(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            rerank_model: default_rerank_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            retrieval_top_k: default_retrieval_top_k(),
            use_reranking: default_true(),
            max_context_window: default_max_context_window(),
            safety_margin: default_safety_margin(),
            batch_size: default_batch_size(),
            temperature: default_temperature(),
            max_response_tokens: default_max_response_tokens(),
            vector_store: default_vector_store(),
            tokenizer_json: None,
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl RagSettings {
    /// Token budget available for assembled context: the model window
    /// minus a safety margin reserved for prompt scaffolding and output.
    #[must_use]
    pub fn max_input_tokens(&self) -> usize {
        self.max_context_window.saturating_sub(self.safety_margin)
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and optionally
    /// generates a template file.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            // Generate template only for the default path
            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.rag.chunk_size > 0, "rag.chunk_size must be positive");
        anyhow::ensure!(
            self.rag.chunk_overlap < self.rag.chunk_size,
            "rag.chunk_overlap must be smaller than rag.chunk_size"
        );
        anyhow::ensure!(
            self.rag.retrieval_top_k > 0,
            "rag.retrieval_top_k must be positive"
        );
        anyhow::ensure!(self.rag.batch_size > 0, "rag.batch_size must be positive");
        anyhow::ensure!(
            self.rag.max_input_tokens() > 0,
            "rag.safety_margin must be smaller than rag.max_context_window"
        );
        Ok(())
    }

    #[must_use]
    pub fn forms_dir(&self) -> PathBuf {
        PathBuf::from(&self.forms_dir)
    }

    #[must_use]
    pub fn templates_dir(&self) -> PathBuf {
        PathBuf::from(&self.templates_dir)
    }

    #[must_use]
    pub fn artifacts_dir(&self) -> PathBuf {
        PathBuf::from(&self.artifacts_dir)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rag.chunk_size, 2000);
        assert_eq!(config.rag.chunk_overlap, 300);
        assert_eq!(config.rag.retrieval_top_k, 4);
        assert_eq!(config.rag.batch_size, 5);
        assert_eq!(config.rag.max_input_tokens(), 8192 - 1500);
        assert_eq!(config.provider.kind, "openai");
        assert_eq!(config.provider.timeout_secs, 120);
        assert!(config.rag.use_reranking);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"rag": {"chunk_size": 1000}, "forms_dir": "./pdf"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.forms_dir, "./pdf");
        // Other fields should have defaults
        assert_eq!(config.rag.chunk_overlap, 300);
        assert_eq!(config.provider.chat_model, "qwen3");
    }

    #[test]
    fn test_validate_ok() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_chunk_size() {
        let mut config = Config::default();
        config.rag.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_overlap_not_below_size() {
        let mut config = Config::default();
        config.rag.chunk_overlap = config.rag.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.rag.chunk_size, config.rag.chunk_size);
        assert_eq!(parsed.provider.kind, config.provider.kind);
        assert_eq!(parsed.artifacts_dir, config.artifacts_dir);
    }
}
