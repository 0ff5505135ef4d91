use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::graph::RelationshipType;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub insights: InsightConfig,
    #[serde(default)]
    pub suggestions: SuggestionConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub governance: GovernanceConfig,
}

/// Traversal and query defaults
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_depth")]
    pub default_max_depth: usize,
    #[serde(default = "default_explore_max_depth")]
    pub explore_max_depth: usize,
    /// Hard ceiling; queries asking for more are rejected as invalid.
    #[serde(default = "default_max_depth_limit")]
    pub max_depth_limit: usize,
    #[serde(default = "default_max_frontier")]
    pub max_frontier: usize,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_impact_relationship_types")]
    pub impact_relationship_types: Vec<RelationshipType>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_depth: default_max_depth(),
            explore_max_depth: default_explore_max_depth(),
            max_depth_limit: default_max_depth_limit(),
            max_frontier: default_max_frontier(),
            query_timeout_ms: default_query_timeout_ms(),
            impact_relationship_types: default_impact_relationship_types(),
            log_level: default_log_level(),
        }
    }
}

fn default_max_depth() -> usize {
    2
}

fn default_explore_max_depth() -> usize {
    3
}

fn default_max_depth_limit() -> usize {
    10
}

fn default_max_frontier() -> usize {
    10_000
}

fn default_query_timeout_ms() -> u64 {
    2_000
}

fn default_impact_relationship_types() -> Vec<RelationshipType> {
    vec![
        RelationshipType::Affects,
        RelationshipType::DependsOn,
        RelationshipType::GovernedBy,
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Result cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
            max_entries: default_cache_capacity(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_cache_capacity() -> usize {
    1000
}

/// find_similar configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SimilarityConfig {
    #[serde(default = "default_similarity_threshold")]
    pub default_threshold: f64,
    #[serde(default = "default_similarity_max_results")]
    pub max_results: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            default_threshold: default_similarity_threshold(),
            max_results: default_similarity_max_results(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.5
}

fn default_similarity_max_results() -> usize {
    50
}

/// Insight rule thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct InsightConfig {
    #[serde(default = "default_large_result_threshold")]
    pub large_result_threshold: usize,
    #[serde(default = "default_high_confidence_strength")]
    pub high_confidence_strength: f64,
    #[serde(default = "default_hub_degree_threshold")]
    pub hub_degree_threshold: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            large_result_threshold: default_large_result_threshold(),
            high_confidence_strength: default_high_confidence_strength(),
            hub_degree_threshold: default_hub_degree_threshold(),
        }
    }
}

fn default_large_result_threshold() -> usize {
    10
}

fn default_high_confidence_strength() -> f64 {
    0.8
}

fn default_hub_degree_threshold() -> usize {
    5
}

/// Follow-up suggestion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionConfig {
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
    #[serde(default = "default_explore_strength")]
    pub explore_strength: f64,
    #[serde(default = "default_similar_min_entities")]
    pub similar_min_entities: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            max_suggestions: default_max_suggestions(),
            explore_strength: default_explore_strength(),
            similar_min_entities: default_similar_min_entities(),
        }
    }
}

fn default_max_suggestions() -> usize {
    5
}

fn default_explore_strength() -> f64 {
    0.7
}

fn default_similar_min_entities() -> usize {
    5
}

/// Background auto-discovery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_discovery_interval_secs")]
    pub interval_secs: u64,
    /// Directory of `.json` / `.yaml` seed files.
    #[serde(default)]
    pub seed_dir: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_discovery_interval_secs(),
            seed_dir: None,
        }
    }
}

fn default_discovery_interval_secs() -> u64 {
    300
}

/// Where audit records go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    #[default]
    Log,
    Sqlite,
    None,
}

/// Audit sink configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub sink: AuditSinkKind,
    #[serde(default = "default_audit_db_path")]
    pub db_path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::default(),
            db_path: default_audit_db_path(),
        }
    }
}

fn default_audit_db_path() -> PathBuf {
    PathBuf::from("relgraph_audit.db")
}

/// Settings for the built-in governance gate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub blocked_entities: Vec<String>,
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RELGRAPH_CONFIG environment variable
    /// 2. ./relgraph.toml in current directory
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RELGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("relgraph.toml"));

        Self::load_from(&config_path)
    }

    /// Load and validate configuration from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.engine.default_max_depth > self.engine.max_depth_limit {
            anyhow::bail!("engine.default_max_depth must not exceed engine.max_depth_limit");
        }

        if self.engine.explore_max_depth > self.engine.max_depth_limit {
            anyhow::bail!("engine.explore_max_depth must not exceed engine.max_depth_limit");
        }

        if self.engine.max_frontier == 0 {
            anyhow::bail!("engine.max_frontier must be greater than 0");
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            anyhow::bail!("cache.max_entries must be greater than 0 when the cache is enabled");
        }

        for (name, value) in [
            ("similarity.default_threshold", self.similarity.default_threshold),
            ("insights.high_confidence_strength", self.insights.high_confidence_strength),
            ("suggestions.explore_strength", self.suggestions.explore_strength),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be between 0.0 and 1.0", name);
            }
        }

        if self.discovery.enabled && self.discovery.interval_secs == 0 {
            anyhow::bail!("discovery.interval_secs must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.default_max_depth, 2);
        assert_eq!(config.engine.explore_max_depth, 3);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.similarity.max_results, 50);
        assert_eq!(config.suggestions.max_suggestions, 5);
        assert_eq!(config.audit.sink, AuditSinkKind::Log);
    }

    #[test]
    fn test_load_from_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("relgraph.toml");
        fs::write(
            &config_path,
            r#"
[engine]
default_max_depth = 4
impact_relationship_types = ["affects"]

[cache]
ttl_secs = 5

[audit]
sink = "none"
"#,
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.engine.default_max_depth, 4);
        assert_eq!(
            config.engine.impact_relationship_types,
            vec![RelationshipType::Affects]
        );
        assert_eq!(config.cache.ttl_secs, 5);
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.audit.sink, AuditSinkKind::None);
    }

    #[test]
    fn test_load_rejects_out_of_range_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("relgraph.toml");
        fs::write(&config_path, "[similarity]\ndefault_threshold = 1.5\n").unwrap();

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(err.to_string().contains("similarity.default_threshold"));
    }

    #[test]
    fn test_load_rejects_depth_above_limit() {
        let mut config = Config::default();
        config.engine.default_max_depth = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_env_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("custom.toml");
        fs::write(&config_path, "[insights]\nlarge_result_threshold = 3\n").unwrap();

        let original = std::env::var("RELGRAPH_CONFIG").ok();
        std::env::set_var("RELGRAPH_CONFIG", config_path.to_str().unwrap());
        let config = Config::load();
        std::env::remove_var("RELGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("RELGRAPH_CONFIG", v);
        }

        assert_eq!(config.unwrap().insights.large_result_threshold, 3);
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("RELGRAPH_CONFIG").ok();
        std::env::set_var("RELGRAPH_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("RELGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("RELGRAPH_CONFIG", v);
        }
    }
}
