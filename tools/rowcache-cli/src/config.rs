//! CLI configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use rowcache_core::{CacheConfig, DEFAULT_EVICTION_QUEUE_DEPTH, DEFAULT_TTL};
use serde::{Deserialize, Serialize};

/// Default config file names, searched from the working directory upwards.
pub const CONFIG_FILE_NAMES: [&str; 3] = ["rowcache.toml", ".rowcache.toml", "rowcache.json"];

/// CLI configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Cache layer settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Demo workload settings.
    #[serde(default)]
    pub demo: DemoSettings,
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }

    /// Save config to a file.
    pub fn save(&self, path: &str) -> Result<()> {
        let content = if path.ends_with(".json") {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path))
    }
}

/// Cache layer settings as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Key namespace.
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    /// Time-to-live of cached reads, in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Tables that use the cache (empty: all).
    #[serde(default)]
    pub tables: Vec<String>,

    /// Coalesce concurrent identical reads.
    #[serde(default)]
    pub easer: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_eviction_queue_depth")]
    pub eviction_queue_depth: usize,
}

fn default_instance_id() -> String {
    "rowcache".to_string()
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

fn default_true() -> bool {
    true
}

fn default_eviction_queue_depth() -> usize {
    DEFAULT_EVICTION_QUEUE_DEPTH
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            ttl_secs: default_ttl_secs(),
            tables: Vec::new(),
            easer: false,
            enabled: true,
            eviction_queue_depth: default_eviction_queue_depth(),
        }
    }
}

impl CacheSettings {
    /// Build the layer configuration.
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.instance_id.clone())
            .with_ttl(Duration::from_secs(self.ttl_secs))
            .with_tables(self.tables.iter().cloned())
            .with_easer(self.easer)
            .with_enabled(self.enabled)
            .with_eviction_queue_depth(self.eviction_queue_depth)
    }
}

/// Demo workload settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoSettings {
    /// Number of seeded users.
    #[serde(default = "default_users")]
    pub users: u32,

    /// Simulated query latency, in milliseconds.
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
}

fn default_users() -> u32 {
    5
}

fn default_latency_ms() -> u64 {
    25
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            users: default_users(),
            latency_ms: default_latency_ms(),
        }
    }
}

/// Generate a default rowcache.toml config file.
pub fn generate_default_config() -> String {
    format!(
        r#"# rowcache configuration

[cache]
instance_id = "{instance}"
ttl_secs = {ttl}
# Only these tables use the cache; leave empty for all tables.
tables = []
easer = true
enabled = true
eviction_queue_depth = {depth}

[demo]
users = {users}
latency_ms = {latency}
"#,
        instance = default_instance_id(),
        ttl = default_ttl_secs(),
        depth = default_eviction_queue_depth(),
        users = default_users(),
        latency = default_latency_ms(),
    )
}
