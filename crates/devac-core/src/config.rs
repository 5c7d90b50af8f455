//! Configuration loading and validation.
//!
//! Configuration is resolved with the following precedence (highest wins):
//!
//! 1. Environment variables (`DEVAC_*`)
//! 2. Project config (`<package>/.devac/config.toml`)
//! 3. Compiled-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DevacError, DevacResult};

/// Top-level configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Columnar store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Semantic resolver configuration.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Sync orchestrator configuration.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Rule engine configuration.
    #[serde(default)]
    pub rules: RulesConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            resolver: ResolverConfig::default(),
            sync: SyncConfig::default(),
            rules: RulesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Columnar store / pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Memory limit for the shared engine instance (DuckDB syntax, e.g. "512MB").
    #[serde(default = "StoreConfig::default_memory_limit")]
    pub memory_limit: String,

    /// Worker thread count for the engine. Defaults to half the CPU cores.
    #[serde(default = "StoreConfig::default_threads")]
    pub threads: usize,

    /// Spill-to-disk scratch directory. Defaults to the system temp dir.
    #[serde(default = "StoreConfig::default_temp_directory")]
    pub temp_directory: PathBuf,

    /// Maximum number of pooled handles.
    #[serde(default = "StoreConfig::default_max_connections")]
    pub max_connections: usize,

    /// How long `acquire` blocks before failing, in milliseconds.
    #[serde(default = "StoreConfig::default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Idle time after which surplus handles are reaped, in milliseconds.
    #[serde(default = "StoreConfig::default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Period of the idle reaper, in milliseconds.
    #[serde(default = "StoreConfig::default_reap_interval_ms")]
    pub reap_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            memory_limit: Self::default_memory_limit(),
            threads: Self::default_threads(),
            temp_directory: Self::default_temp_directory(),
            max_connections: Self::default_max_connections(),
            acquire_timeout_ms: Self::default_acquire_timeout_ms(),
            idle_timeout_ms: Self::default_idle_timeout_ms(),
            reap_interval_ms: Self::default_reap_interval_ms(),
        }
    }
}

impl StoreConfig {
    fn default_memory_limit() -> String {
        "512MB".into()
    }

    fn default_threads() -> usize {
        (std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4) / 2).max(1)
    }

    fn default_temp_directory() -> PathBuf {
        std::env::temp_dir().join("devac-spill")
    }

    fn default_max_connections() -> usize {
        4
    }

    fn default_acquire_timeout_ms() -> u64 {
        30_000
    }

    fn default_idle_timeout_ms() -> u64 {
        60_000
    }

    fn default_reap_interval_ms() -> u64 {
        30_000
    }
}

/// Semantic resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Whether semantic resolution runs at all. When false, `is_available`
    /// reports false and every ref stays unresolved.
    #[serde(default = "ResolverConfig::default_enabled")]
    pub enabled: bool,

    /// Per-package resolution budget, in milliseconds.
    #[serde(default = "ResolverConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

impl ResolverConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_timeout_ms() -> u64 {
        30_000
    }
}

/// Sync orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory names skipped during file discovery.
    #[serde(default = "SyncConfig::default_skip_dirs")]
    pub skip_dirs: Vec<String>,

    /// Source file extensions included in a package walk.
    #[serde(default = "SyncConfig::default_source_extensions")]
    pub source_extensions: Vec<String>,

    /// Maximum file size to parse, in bytes.
    #[serde(default = "SyncConfig::default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            skip_dirs: Self::default_skip_dirs(),
            source_extensions: Self::default_source_extensions(),
            max_file_size: Self::default_max_file_size(),
        }
    }
}

impl SyncConfig {
    fn default_skip_dirs() -> Vec<String> {
        vec![
            ".git".into(),
            ".devac".into(),
            "node_modules".into(),
            "target".into(),
            "__pycache__".into(),
            ".venv".into(),
            "venv".into(),
            "dist".into(),
            "build".into(),
            ".next".into(),
            "coverage".into(),
            ".cache".into(),
            "vendor".into(),
        ]
    }

    fn default_source_extensions() -> Vec<String> {
        vec![
            "ts".into(),
            "tsx".into(),
            "js".into(),
            "jsx".into(),
            "mjs".into(),
            "cjs".into(),
            "py".into(),
        ]
    }

    fn default_max_file_size() -> u64 {
        5 * 1024 * 1024 // 5MB
    }
}

/// Rule engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Hard cap on the number of effects processed per call. Zero means
    /// unlimited.
    #[serde(default)]
    pub max_effects: usize,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self { max_effects: 0 }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Whether to output logs as JSON.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".into()
    }
}

impl Config {
    /// Load configuration for a package: defaults, then the package's
    /// `.devac/config.toml` if present, then environment overrides.
    pub fn load(package_dir: &Path) -> DevacResult<Self> {
        let mut config = Self::default();

        let project_config_path = package_dir.join(".devac").join("config.toml");
        if project_config_path.exists() {
            config.merge_from_file(&project_config_path)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Returns the well-known hub directory (`~/.local/share/devac/hub`
    /// or platform equivalent), overridable with `DEVAC_HUB_DIR`.
    pub fn hub_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("DEVAC_HUB_DIR") {
            return PathBuf::from(dir);
        }
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("devac")
            .join("hub")
    }

    /// Merge values from a TOML config file (non-destructive overlay).
    fn merge_from_file(&mut self, path: &Path) -> DevacResult<()> {
        let content = std::fs::read_to_string(path)?;
        let overlay: toml::Value = toml::from_str(&content).map_err(|e| DevacError::Config {
            details: format!("invalid TOML in {}: {e}", path.display()),
        })?;

        if let Some(store) = overlay.get("store") {
            if let Ok(parsed) = store.clone().try_into::<StoreConfig>() {
                self.store = parsed;
            }
        }
        if let Some(resolver) = overlay.get("resolver") {
            if let Ok(parsed) = resolver.clone().try_into::<ResolverConfig>() {
                self.resolver = parsed;
            }
        }
        if let Some(sync) = overlay.get("sync") {
            if let Ok(parsed) = sync.clone().try_into::<SyncConfig>() {
                self.sync = parsed;
            }
        }
        if let Some(rules) = overlay.get("rules") {
            if let Ok(parsed) = rules.clone().try_into::<RulesConfig>() {
                self.rules = parsed;
            }
        }
        if let Some(logging) = overlay.get("logging") {
            if let Ok(parsed) = logging.clone().try_into::<LoggingConfig>() {
                self.logging = parsed;
            }
        }

        Ok(())
    }

    /// Apply environment variable overrides (DEVAC_* prefix).
    fn apply_env_overrides(&mut self) {
        if let Ok(limit) = std::env::var("DEVAC_DUCKDB_MEMORY") {
            self.store.memory_limit = limit;
        }
        if let Ok(temp) = std::env::var("DEVAC_DUCKDB_TEMP") {
            self.store.temp_directory = PathBuf::from(temp);
        }
        if let Ok(level) = std::env::var("DEVAC_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.store.memory_limit, "512MB");
        assert_eq!(config.store.max_connections, 4);
        assert_eq!(config.store.acquire_timeout_ms, 30_000);
        assert_eq!(config.resolver.timeout_ms, 30_000);
        assert!(config.resolver.enabled);
        assert_eq!(config.rules.max_effects, 0);
    }

    #[test]
    fn test_skip_dirs_cover_common_output_dirs() {
        let sync = SyncConfig::default();
        for dir in ["node_modules", "dist", "__pycache__", ".git", ".devac"] {
            assert!(sync.skip_dirs.iter().any(|d| d == dir), "missing {dir}");
        }
    }

    #[test]
    fn test_config_overlay_from_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let devac_dir = dir.path().join(".devac");
        std::fs::create_dir_all(&devac_dir).expect("mkdir");
        std::fs::write(
            devac_dir.join("config.toml"),
            "[store]\nmemory_limit = \"1GB\"\nmax_connections = 8\n",
        )
        .expect("write config");

        let config = Config::load(dir.path()).expect("load");
        assert_eq!(config.store.memory_limit, "1GB");
        assert_eq!(config.store.max_connections, 8);
        // Untouched sections keep defaults
        assert_eq!(config.resolver.timeout_ms, 30_000);
    }
}
