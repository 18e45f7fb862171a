use crate::cache::CacheConfig;
use crate::dedup::DuplicateWeights;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub gedmcp: GedmcpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub duplicates: DuplicatesConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// GedMCP-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GedmcpConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Source storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// "local" resolves source ids under `source_root`; "http" resolves
    /// them against `base_url`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,
    pub base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            source_root: default_source_root(),
            base_url: None,
        }
    }
}

/// Document/graph cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_weight_bytes")]
    pub max_weight_bytes: usize,
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_graph_cache_entries")]
    pub graph_cache_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_weight_bytes: default_max_weight_bytes(),
            load_timeout_secs: default_load_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            graph_cache_entries: default_graph_cache_entries(),
        }
    }
}

/// Duplicate detection scoring configuration. The weights are policy, not
/// structure: any non-negative weights summing to 100 are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct DuplicatesConfig {
    #[serde(default = "default_name_weight")]
    pub name_weight: f64,
    #[serde(default = "default_date_weight")]
    pub date_weight: f64,
    #[serde(default = "default_place_weight")]
    pub place_weight: f64,
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            name_weight: default_name_weight(),
            date_weight: default_date_weight(),
            place_weight: default_place_weight(),
            default_threshold: default_threshold(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_http_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub authless: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_source_root() -> PathBuf {
    PathBuf::from("./sources")
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_max_weight_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_load_timeout_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_graph_cache_entries() -> usize {
    8
}

fn default_name_weight() -> f64 {
    50.0
}

fn default_date_weight() -> f64 {
    30.0
}

fn default_place_weight() -> f64 {
    20.0
}

fn default_threshold() -> f64 {
    75.0
}

fn default_http_port() -> u16 {
    8080
}

fn default_http_api_key_env() -> String {
    "GEDMCP_API_KEY".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in GEDMCP_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional; variables already in the environment win
        let _ = dotenv::dotenv();

        let config_path = std::env::var("GEDMCP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str).context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        match self.storage.backend.as_str() {
            "local" => {
                if !self.storage.source_root.exists() {
                    anyhow::bail!(
                        "storage.source_root path does not exist: {}. Set source_root in config.toml to the directory holding your GEDCOM files.",
                        self.storage.source_root.display()
                    );
                }
                if !self.storage.source_root.is_dir() {
                    anyhow::bail!(
                        "storage.source_root must be a directory, not a file: {}",
                        self.storage.source_root.display()
                    );
                }
            }
            "http" => {
                if self.storage.base_url.is_none() {
                    anyhow::bail!("storage.base_url is required when storage.backend is \"http\"");
                }
            }
            other => {
                anyhow::bail!("storage.backend must be \"local\" or \"http\", got \"{}\"", other);
            }
        }

        if self.cache.ttl_secs == 0 {
            anyhow::bail!("cache.ttl_secs must be greater than 0");
        }
        if self.cache.load_timeout_secs == 0 {
            anyhow::bail!("cache.load_timeout_secs must be greater than 0");
        }
        if self.cache.max_weight_bytes == 0 {
            anyhow::bail!("cache.max_weight_bytes must be greater than 0");
        }

        self.duplicate_weights()
            .validate()
            .map_err(anyhow::Error::msg)?;
        if !(0.0..=100.0).contains(&self.duplicates.default_threshold) {
            anyhow::bail!("duplicates.default_threshold must be between 0 and 100");
        }

        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            max_weight_bytes: self.cache.max_weight_bytes,
            load_timeout: Duration::from_secs(self.cache.load_timeout_secs),
            sweep_interval: Duration::from_secs(self.cache.sweep_interval_secs),
        }
    }

    pub fn duplicate_weights(&self) -> DuplicateWeights {
        DuplicateWeights {
            name: self.duplicates.name_weight,
            dates: self.duplicates.date_weight,
            place: self.duplicates.place_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide cwd and env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn create_test_config(temp_dir: &TempDir) -> String {
        let source_root = temp_dir.path().canonicalize().unwrap();
        let source_root_str = source_root.to_str().unwrap().replace('\\', "\\\\");
        format!(
            r#"
[gedmcp]
log_level = "debug"

[storage]
backend = "local"
source_root = "{}"

[cache]
ttl_secs = 120
max_weight_bytes = 1048576
load_timeout_secs = 10

[duplicates]
name_weight = 50.0
date_weight = 30.0
place_weight = 20.0
default_threshold = 80.0
"#,
            source_root_str
        )
    }

    fn with_config_env(config_path: &std::path::Path, f: impl FnOnce()) {
        let original = std::env::var("GEDMCP_CONFIG").ok();
        std::env::set_var("GEDMCP_CONFIG", config_path.to_str().unwrap());
        f();
        match original {
            Some(val) => std::env::set_var("GEDMCP_CONFIG", val),
            None => std::env::remove_var("GEDMCP_CONFIG"),
        }
    }

    #[test]
    fn test_config_load_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, create_test_config(&temp_dir)).unwrap();

        with_config_env(&config_path, || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.gedmcp.log_level, "debug");
            assert_eq!(config.cache.ttl_secs, 120);
            assert_eq!(config.duplicates.default_threshold, 80.0);
            // Unspecified values fall back to defaults
            assert_eq!(config.cache.graph_cache_entries, 8);
            assert!(!config.http_server.enabled);
        });
    }

    #[test]
    fn test_config_rejects_bad_weights() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let mut content = create_test_config(&temp_dir);
        content = content.replace("name_weight = 50.0", "name_weight = 90.0");
        fs::write(&config_path, content).unwrap();

        with_config_env(&config_path, || {
            let config = Config::load();
            assert!(config.is_err());
            assert!(config.unwrap_err().to_string().contains("sum to 100"));
        });
    }

    #[test]
    fn test_config_rejects_missing_source_root() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let content = create_test_config(&temp_dir)
            .replace(temp_dir.path().canonicalize().unwrap().to_str().unwrap(), "/nonexistent/gedmcp");
        fs::write(&config_path, content).unwrap();

        with_config_env(&config_path, || {
            assert!(Config::load().is_err());
        });
    }

    #[test]
    fn test_config_http_backend_requires_base_url() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let content = create_test_config(&temp_dir).replace("backend = \"local\"", "backend = \"http\"");
        fs::write(&config_path, content).unwrap();

        with_config_env(&config_path, || {
            let config = Config::load();
            assert!(config.is_err());
            assert!(config.unwrap_err().to_string().contains("base_url"));
        });
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        with_config_env(std::path::Path::new("nonexistent.toml"), || {
            assert!(Config::load().is_err());
        });
    }
}
