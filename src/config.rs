//! Configuration for the zmem engine
//!
//! Configuration is loaded from a JSON document; a missing file yields the
//! defaults. Field defaults are expressed through serde so partial files
//! work. Environment variables override individual embedding settings and
//! gate optional behaviour (verbose tool-server diagnostics, the reindex
//! admin tool, recall latency metrics).

use crate::error::{Result, ZmemError};
use crate::types::Scope;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Retrieval mode used when a query does not specify one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Hybrid,
    Lexical,
    Vector,
}

impl RetrievalMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hybrid" => Some(RetrievalMode::Hybrid),
            "lexical" => Some(RetrievalMode::Lexical),
            "vector" => Some(RetrievalMode::Vector),
            _ => None,
        }
    }
}

/// Embedding backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Llamacpp,
    Openai,
    Ollama,
}

impl EmbeddingProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "llamacpp" => Some(EmbeddingProviderKind::Llamacpp),
            "openai" => Some(EmbeddingProviderKind::Openai),
            "ollama" => Some(EmbeddingProviderKind::Ollama),
            _ => None,
        }
    }
}

/// Per-query retrieval defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalDefaults {
    pub top_k_lex: usize,
    pub top_k_vec: usize,
    pub rerank_top_k: usize,
    pub min_score: f64,
    pub include_superseded: bool,
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self {
            top_k_lex: 30,
            top_k_vec: 30,
            rerank_top_k: 20,
            min_score: 0.25,
            include_superseded: false,
        }
    }
}

/// `defaults` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Defaults {
    pub retrieval_mode: RetrievalMode,
    pub scopes_default: Vec<Scope>,
    pub retrieval: RetrievalDefaults,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            retrieval_mode: RetrievalMode::Hybrid,
            scopes_default: vec![Scope::Workspace, Scope::Global],
            retrieval: RetrievalDefaults::default(),
        }
    }
}

/// `ai.embedding` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub dimensions: usize,
    pub quantization: Option<String>,
    pub batch_size: usize,
    pub max_tokens: usize,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Llamacpp,
            model: "embeddinggemma".to_string(),
            dimensions: 1024,
            quantization: None,
            batch_size: 8,
            max_tokens: 8192,
            base_url: None,
            api_key: None,
        }
    }
}

/// `ai.rerank` section; parsed and carried, but reranking is not performed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RerankConfig {
    pub enabled: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub top_k: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            model: None,
            top_k: 20,
        }
    }
}

/// `ai` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub embedding: EmbeddingConfig,
    pub rerank: RerankConfig,
}

/// One entry of the `workspaces` array
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    pub name: String,
    pub root: PathBuf,
    #[serde(default = "default_true")]
    pub include_by_default: bool,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub context: Option<String>,
}

fn default_true() -> bool {
    true
}

/// `storage` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Metadata-store file (WAL sidecar lives next to it)
    pub db_path: PathBuf,

    /// Directory holding one vector collection per workspace
    pub zvec_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("zmem");
        Self {
            db_path: data_dir.join("zmem.db"),
            zvec_path: data_dir.join("zvec"),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZmemConfig {
    pub defaults: Defaults,
    pub ai: AiConfig,
    pub workspaces: Vec<WorkspaceConfig>,
    pub storage: StorageConfig,
}

impl ZmemConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                serde_json::from_str(&raw)
                    .map_err(|e| ZmemError::Config(format!("invalid config {}: {}", p.display(), e)))?
            }
            Some(p) => {
                debug!("Config file {} not found, using defaults", p.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup closure (injectable for
    /// tests). `ZMD_EMBED_MODEL` replaces the embedding model;
    /// `ZMD_EMBED_PROVIDER` replaces the provider only when it names a known
    /// backend and is silently ignored otherwise.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(model) = get("ZMD_EMBED_MODEL") {
            if !model.trim().is_empty() {
                self.ai.embedding.model = model;
            }
        }
        if let Some(provider) = get("ZMD_EMBED_PROVIDER") {
            if let Some(kind) = EmbeddingProviderKind::parse(provider.trim()) {
                self.ai.embedding.provider = kind;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ai.embedding.dimensions == 0 {
            return Err(ZmemError::Config(
                "ai.embedding.dimensions must be positive".to_string(),
            ));
        }
        if self.ai.embedding.batch_size == 0 {
            return Err(ZmemError::Config(
                "ai.embedding.batchSize must be positive".to_string(),
            ));
        }
        let min_score = self.defaults.retrieval.min_score;
        if !(0.0..=1.0).contains(&min_score) {
            return Err(ZmemError::Config(format!(
                "defaults.retrieval.minScore must be within [0, 1], got {}",
                min_score
            )));
        }
        Ok(())
    }

    /// Resolve the effective workspace for the tool server: explicit
    /// argument, then `ZMEM_WORKSPACE`, then the sole configured workspace,
    /// then `"default"`.
    pub fn resolve_workspace(&self, explicit: Option<&str>) -> String {
        if let Some(ws) = explicit {
            if !ws.trim().is_empty() {
                return ws.to_string();
            }
        }
        if let Ok(ws) = std::env::var("ZMEM_WORKSPACE") {
            if !ws.trim().is_empty() {
                return ws;
            }
        }
        if self.workspaces.len() == 1 {
            return self.workspaces[0].name.clone();
        }
        "default".to_string()
    }

    /// Find a configured workspace entry by name.
    pub fn workspace(&self, name: &str) -> Option<&WorkspaceConfig> {
        self.workspaces.iter().find(|w| w.name == name)
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "true").unwrap_or(false)
}

/// Verbose tool-server diagnostics on stderr (`ZMEM_MCP_VERBOSE=true`).
pub fn mcp_verbose() -> bool {
    env_flag("ZMEM_MCP_VERBOSE")
}

/// Expose the reindex admin tool (`ZMEM_ENABLE_REINDEX_TOOL=true`).
pub fn reindex_tool_enabled() -> bool {
    env_flag("ZMEM_ENABLE_REINDEX_TOOL")
}

/// Record recall latencies into the diagnostics window
/// (`ZMEM_RECALL_METRICS=true`).
pub fn recall_metrics_enabled() -> bool {
    env_flag("ZMEM_RECALL_METRICS")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ZmemConfig::default();
        assert_eq!(config.defaults.retrieval_mode, RetrievalMode::Hybrid);
        assert_eq!(
            config.defaults.scopes_default,
            vec![Scope::Workspace, Scope::Global]
        );
        assert_eq!(config.defaults.retrieval.top_k_lex, 30);
        assert_eq!(config.defaults.retrieval.min_score, 0.25);
        assert!(!config.defaults.retrieval.include_superseded);
        assert_eq!(config.ai.embedding.dimensions, 1024);
        assert_eq!(config.ai.embedding.batch_size, 8);
        assert!(!config.ai.rerank.enabled);
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let raw = r#"{
            "defaults": { "retrievalMode": "lexical" },
            "storage": { "dbPath": "/tmp/z.db", "zvecPath": "/tmp/zvec" }
        }"#;
        let config: ZmemConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.defaults.retrieval_mode, RetrievalMode::Lexical);
        assert_eq!(config.defaults.retrieval.top_k_vec, 30);
        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/z.db"));
    }

    #[test]
    fn test_env_model_override() {
        let mut config = ZmemConfig::default();
        config.apply_env(|key| match key {
            "ZMD_EMBED_MODEL" => Some("bge-m3".to_string()),
            _ => None,
        });
        assert_eq!(config.ai.embedding.model, "bge-m3");
    }

    #[test]
    fn test_env_provider_override_requires_known_backend() {
        let mut config = ZmemConfig::default();
        config.apply_env(|key| match key {
            "ZMD_EMBED_PROVIDER" => Some("ollama".to_string()),
            _ => None,
        });
        assert_eq!(config.ai.embedding.provider, EmbeddingProviderKind::Ollama);

        config.apply_env(|key| match key {
            "ZMD_EMBED_PROVIDER" => Some("carrier-pigeon".to_string()),
            _ => None,
        });
        assert_eq!(config.ai.embedding.provider, EmbeddingProviderKind::Ollama);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut config = ZmemConfig::default();
        config.ai.embedding.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = ZmemConfig::default();
        config.defaults.retrieval.min_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_workspace_prefers_explicit() {
        let mut config = ZmemConfig::default();
        config.workspaces.push(WorkspaceConfig {
            name: "notes".to_string(),
            root: PathBuf::from("/tmp/notes"),
            include_by_default: true,
            patterns: vec!["**/*.md".to_string()],
            context: None,
        });
        assert_eq!(config.resolve_workspace(Some("scratch")), "scratch");
        // Single configured workspace wins over the hardcoded fallback.
        assert_eq!(config.resolve_workspace(None), "notes");
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let raw = r#"{ "defaults": { "retrievalMode": "psychic" } }"#;
        assert!(serde_json::from_str::<ZmemConfig>(raw).is_err());
    }
}
