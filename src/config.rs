use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tenants: TenantsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory for canonical files, thumbnails, and staging.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TaxonomyConfig {
    /// Optional path to a taxonomy TOML file. When absent, the built-in
    /// category set is used.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_chars")]
    pub target_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chars: default_target_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_target_chars() -> usize {
    500
}
fn default_overlap_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_autocomplete_k")]
    pub autocomplete_k: usize,
    #[serde(default = "default_max_edits")]
    pub fuzzy_max_edits: usize,
    /// Extra stop words merged into the built-in set.
    #[serde(default)]
    pub stop_words: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            autocomplete_k: default_autocomplete_k(),
            fuzzy_max_edits: default_max_edits(),
            stop_words: Vec::new(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_autocomplete_k() -> usize {
    10
}
fn default_max_edits() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `http` (Ollama-compatible endpoint) or `disabled`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embed_url")]
    pub url: String,
    #[serde(default = "default_embed_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: default_embed_url(),
            model: default_embed_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embed_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7411".to_string()
}
fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct TenantsConfig {
    /// Quota assigned to tenants created without an explicit one.
    #[serde(default = "default_quota_bytes")]
    pub default_quota_bytes: i64,
}

impl Default for TenantsConfig {
    fn default() -> Self {
        Self {
            default_quota_bytes: default_quota_bytes(),
        }
    }
}

fn default_quota_bytes() -> i64 {
    1024 * 1024 * 1024 // 1 GiB
}

impl Config {
    /// Minimal in-memory configuration for tests and scratch runs.
    pub fn minimal(root: &Path) -> Config {
        Config {
            db: DbConfig {
                path: root.join("depot.sqlite"),
            },
            storage: StorageConfig {
                root: root.join("artifacts"),
            },
            taxonomy: TaxonomyConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
            tenants: TenantsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.target_chars == 0 {
        anyhow::bail!("chunking.target_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.target_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.target_chars");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims == 0 {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_empty() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "http" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    if config.tenants.default_quota_bytes <= 0 {
        anyhow::bail!("tenants.default_quota_bytes must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_defaults() {
        let cfg = Config::minimal(Path::new("/tmp/depot-test"));
        assert_eq!(cfg.chunking.target_chars, 500);
        assert_eq!(cfg.chunking.overlap_chars, 50);
        assert_eq!(cfg.embedding.dims, 768);
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.retrieval.fuzzy_max_edits, 2);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[db]
path = "/data/depot.sqlite"

[storage]
root = "/data/artifacts"

[chunking]
target_chars = 400
overlap_chars = 40

[embedding]
provider = "http"
url = "http://localhost:11434"
model = "nomic-embed-text"
dims = 768
"#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.chunking.target_chars, 400);
        assert!(cfg.embedding.is_enabled());
        assert_eq!(cfg.server.bind, "127.0.0.1:7411");
    }
}
