use std::path::PathBuf;

use config::{Config, ConfigBuilder, Environment, File as ConfigFile, FileFormat, builder::DefaultState};
use eyre::{Context, Result};
use serde::Deserialize;
use tracing::warn;

pub const DB_FILE_NAME: &str = "learned-data.db";

/// Directory leaf names that are never suggested for navigation unless the
/// user literally types them.
pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "node_modules",
    "bin",
    "obj",
    "target",
    "__pycache__",
    ".git",
    ".vs",
    ".vscode",
    ".idea",
    ".nuget",
    ".dotnet",
    ".pytest_cache",
];

/// Engine configuration.
///
/// Values come from three layered sources: built-in defaults, an optional
/// `config.toml` in the data directory, and `PSCUE_*` environment variables
/// (flat mapping: `PSCUE_HISTORY_SIZE` overrides `history_size`, and so on).
/// A malformed file or variable falls back to defaults with a single warning;
/// configuration problems never break the engine.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    // ---- Learning ----
    pub disable_learning: bool,
    pub history_size: usize,
    pub max_commands: usize,
    pub max_args_per_cmd: usize,
    pub decay_days: f64,

    // ---- Sequence predictor ----
    pub ml_enabled: bool,
    pub ml_ngram_order: usize,
    pub ml_ngram_min_freq: u64,
    pub ml_max_predictions: usize,
    pub partial_command_predictions: bool,

    // ---- Workflow learner ----
    pub workflow_learning: bool,
    pub workflow_min_frequency: u64,
    /// Transitions slower than this many minutes are not recorded.
    pub workflow_max_time_delta: u64,
    pub workflow_min_confidence: f64,
    pub workflow_max_per_source: usize,

    // ---- Directory engine (pcd) ----
    pub pcd_frequency_weight: f64,
    pub pcd_recency_weight: f64,
    pub pcd_distance_weight: f64,
    pub pcd_exact_match_boost: f64,
    pub pcd_min_match_pct: f64,
    pub pcd_max_depth: usize,
    pub pcd_recursive_search: bool,
    pub pcd_max_learned: usize,
    pub pcd_blocklist: Vec<String>,

    // ---- Rank fusion ----
    pub fusion_known_step: f64,
    pub fusion_learned_boost: f64,
    pub fusion_workflow_boost: f64,
    pub fusion_max_results: usize,

    // ---- Caching & prediction ----
    pub cache_ttl_seconds: u64,
    pub max_results: usize,

    // ---- Persistence ----
    pub db_path: String,
    pub save_interval_seconds: u64,
    /// SQLite busy timeout, in seconds.
    pub local_timeout: f64,

    // ---- Daemon ----
    /// Empty means "derive from process identity" (see the daemon crate).
    pub socket_path: String,
    /// Loopback port used where unix sockets are unavailable.
    pub tcp_port: u16,
}

impl Settings {
    /// Platform data directory: `%LOCALAPPDATA%\PSCue` on Windows,
    /// `$XDG_DATA_HOME/PSCue` or `~/.local/share/PSCue` elsewhere.
    pub fn data_dir() -> Result<PathBuf> {
        let base = directories::BaseDirs::new()
            .ok_or_else(|| eyre::eyre!("could not determine home directory"))?;
        Ok(base.data_local_dir().join("PSCue"))
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.db_path)
    }

    /// Config builder seeded with every default value.
    ///
    /// Exposed so tests can `set_override` individual paths before building,
    /// without touching the process environment.
    pub fn builder() -> Result<ConfigBuilder<DefaultState>> {
        let data_dir = Self::data_dir().unwrap_or_else(|_| PathBuf::from("."));
        let db_path = data_dir.join(DB_FILE_NAME);
        let blocklist: Vec<String> = DEFAULT_BLOCKLIST.iter().map(|s| (*s).to_string()).collect();

        let builder = Config::builder()
            .set_default("disable_learning", false)?
            .set_default("history_size", 100)?
            .set_default("max_commands", 500)?
            .set_default("max_args_per_cmd", 100)?
            .set_default("decay_days", 30.0)?
            .set_default("ml_enabled", true)?
            .set_default("ml_ngram_order", 2)?
            .set_default("ml_ngram_min_freq", 2)?
            .set_default("ml_max_predictions", 5)?
            .set_default("partial_command_predictions", true)?
            .set_default("workflow_learning", true)?
            .set_default("workflow_min_frequency", 3)?
            .set_default("workflow_max_time_delta", 30)?
            .set_default("workflow_min_confidence", 0.3)?
            .set_default("workflow_max_per_source", 10)?
            .set_default("pcd_frequency_weight", 0.5)?
            .set_default("pcd_recency_weight", 0.3)?
            .set_default("pcd_distance_weight", 0.2)?
            .set_default("pcd_exact_match_boost", 100.0)?
            .set_default("pcd_min_match_pct", 0.7)?
            .set_default("pcd_max_depth", 3)?
            .set_default("pcd_recursive_search", true)?
            .set_default("pcd_max_learned", 20)?
            .set_default("pcd_blocklist", blocklist)?
            .set_default("fusion_known_step", 0.05)?
            .set_default("fusion_learned_boost", 1.2)?
            .set_default("fusion_workflow_boost", 1.3)?
            .set_default("fusion_max_results", 10)?
            .set_default("cache_ttl_seconds", 300)?
            .set_default("max_results", 10)?
            .set_default("db_path", db_path.to_string_lossy().to_string())?
            .set_default("save_interval_seconds", 300)?
            .set_default("local_timeout", 5.0)?
            .set_default("socket_path", "")?
            .set_default("tcp_port", 8889)?;

        Ok(builder)
    }

    /// Load settings from defaults, the optional config file, and the
    /// `PSCUE_*` environment.
    pub fn new() -> Result<Self> {
        match Self::load() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                warn!("invalid configuration, falling back to defaults: {err}");
                Self::defaults_only()
            }
        }
    }

    fn load() -> Result<Self> {
        let data_dir = Self::data_dir()?;
        fs_err::create_dir_all(&data_dir)
            .wrap_err_with(|| format!("could not create data dir {data_dir:?}"))?;

        let config_file = data_dir.join("config.toml");

        let config = Self::builder()?
            .add_source(
                ConfigFile::new(&config_file.to_string_lossy(), FileFormat::Toml).required(false),
            )
            .add_source(
                Environment::with_prefix("PSCUE")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("pcd_blocklist"),
            )
            .build()
            .wrap_err("could not load configuration")?;

        config
            .try_deserialize()
            .wrap_err("configuration failed to deserialize")
    }

    fn defaults_only() -> Result<Self> {
        let config = Self::builder()?.build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let settings = Settings::defaults_only().unwrap();
        assert_eq!(settings.history_size, 100);
        assert_eq!(settings.max_commands, 500);
        assert_eq!(settings.max_args_per_cmd, 100);
        assert!((settings.decay_days - 30.0).abs() < f64::EPSILON);
        assert!(settings.ml_enabled);
        assert!(settings.pcd_blocklist.iter().any(|b| b == "node_modules"));
        assert!(settings.db_path.ends_with(DB_FILE_NAME));
    }

    #[test]
    fn overrides_apply() {
        let settings: Settings = Settings::builder()
            .unwrap()
            .set_override("history_size", 5)
            .unwrap()
            .set_override("disable_learning", true)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.history_size, 5);
        assert!(settings.disable_learning);
    }
}
