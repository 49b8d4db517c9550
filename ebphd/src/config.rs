//! Daemon configuration (`spec.md` SPEC_FULL §7 "Configuration"): a
//! `serde` + `toml` structure with per-field `#[serde(default = "...")]`
//! functions, the same shape as `cognitod::config::Config` in the teacher
//! codebase. Loaded from a path overridable by `EBPHD_CONFIG`, falling back
//! to built-in defaults on a missing or malformed file rather than failing
//! to start.

use std::fs;
use std::path::PathBuf;

use ebph_core::settings::{
    DEFAULT_ANOMALY_LIMIT, DEFAULT_NORMAL_FACTOR, DEFAULT_NORMAL_FACTOR_DEN, DEFAULT_NORMAL_WAIT,
    DEFAULT_TOLERIZE_LIMIT,
};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "/etc/ebphd/ebphd.toml";
const ENV_CONFIG_PATH: &str = "EBPHD_CONFIG";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file. `explicit_path` (the `--config` CLI
    /// flag) wins if given; otherwise the `EBPHD_CONFIG` environment
    /// variable, then the built-in default path. A missing or malformed
    /// file falls back to defaults rather than aborting startup.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Self {
        let path = explicit_path.map(|p| p.to_path_buf()).unwrap_or_else(|| {
            std::env::var(ENV_CONFIG_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
        });
        match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|err| {
                eprintln!(
                    "ebphd: failed to parse config at {} ({err}); using defaults",
                    path.display()
                );
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }
}

/// Sizing and persistence knobs for the engine itself. Everything here is
/// ambient daemon plumbing; `spec.md` leaves the concrete call space and
/// the on-disk location of saved profiles to the host process.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Number of distinguishable hook points (`C` in `spec.md` §3). The
    /// default covers the x86-64 syscall table with headroom for
    /// security-hook identifiers layered on top of it.
    #[serde(default = "default_call_space")]
    pub call_space: u16,
    /// Directory saved profiles (`spec.md` §6 "Persisted profile format")
    /// are written to and loaded from at startup.
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: PathBuf,
    /// How often the tick tier persists every profile currently known to
    /// the registry.
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_space: default_call_space(),
            profiles_dir: default_profiles_dir(),
            save_interval_secs: default_save_interval_secs(),
        }
    }
}

fn default_call_space() -> u16 {
    512
}
fn default_profiles_dir() -> PathBuf {
    PathBuf::from("/var/lib/ebphd/profiles")
}
fn default_save_interval_secs() -> u64 {
    30
}

/// Initial values for the process-wide tunables from `spec.md` §6. These
/// seed `ebph_core::Settings` at startup; the live values are then only
/// ever changed through the admin-command path (`spec.md` §6 control
/// surface), never by re-reading this file.
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    #[serde(default = "default_true")]
    pub monitoring: bool,
    #[serde(default)]
    pub enforcing: bool,
    #[serde(default)]
    pub log_sequences: bool,
    #[serde(default = "default_normal_wait")]
    pub normal_wait: u64,
    #[serde(default = "default_normal_factor")]
    pub normal_factor: u64,
    #[serde(default = "default_normal_factor_den")]
    pub normal_factor_den: u64,
    #[serde(default = "default_anomaly_limit")]
    pub anomaly_limit: u64,
    #[serde(default = "default_tolerize_limit")]
    pub tolerize_limit: u64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            monitoring: default_true(),
            enforcing: false,
            log_sequences: false,
            normal_wait: default_normal_wait(),
            normal_factor: default_normal_factor(),
            normal_factor_den: default_normal_factor_den(),
            anomaly_limit: default_anomaly_limit(),
            tolerize_limit: default_tolerize_limit(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_normal_wait() -> u64 {
    DEFAULT_NORMAL_WAIT
}
fn default_normal_factor() -> u64 {
    DEFAULT_NORMAL_FACTOR
}
fn default_normal_factor_den() -> u64 {
    DEFAULT_NORMAL_FACTOR_DEN
}
fn default_anomaly_limit() -> u64 {
    DEFAULT_ANOMALY_LIMIT
}
fn default_tolerize_limit() -> u64 {
    DEFAULT_TOLERIZE_LIMIT
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `RUST_LOG`-style filter applied when the environment variable
    /// itself isn't set (`spec.md` SPEC_FULL §7 "Logging").
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_canonical_tunables() {
        let config = Config::default();
        assert_eq!(config.settings.normal_wait, DEFAULT_NORMAL_WAIT);
        assert_eq!(config.settings.anomaly_limit, DEFAULT_ANOMALY_LIMIT);
        assert!(config.settings.monitoring);
        assert!(!config.settings.enforcing);
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let parsed: Result<Config, _> = toml::from_str("not = [valid");
        assert!(parsed.is_err());
    }

    #[test]
    fn partial_toml_fills_in_missing_sections_with_defaults() {
        let config: Config = toml::from_str("[engine]\ncall_space = 64\n").unwrap();
        assert_eq!(config.engine.call_space, 64);
        assert_eq!(config.settings.normal_wait, DEFAULT_NORMAL_WAIT);
    }
}
