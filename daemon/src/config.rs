//! Station configuration with TOML file support.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rollcall_utils::LogFormat;
use rollcall_validator::{GuardConfig, ValidatorConfig};
use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

/// Configuration for a Rollcall station.
///
/// Can be loaded from a TOML file via [`StationConfig::from_toml_file`];
/// command-line flags and `ROLLCALL_*` environment variables override it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    /// LMDB environment directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in MiB.
    #[serde(default = "default_map_size_mb")]
    pub map_size_mb: usize,

    /// Minimum gap between two accepted reads of the same identity.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Replay-guard entries older than `cooldown_secs * sweep_multiplier`
    /// are dropped.
    #[serde(default = "default_sweep_multiplier")]
    pub sweep_multiplier: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum identities tracked by the replay guard.
    #[serde(default = "default_guard_capacity")]
    pub guard_capacity: usize,

    /// Bound on a single store call during validation.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Audit log, one JSON object per presentation attempt.
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,

    /// Where to write the Prometheus text dump on exit, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_file: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./rollcall_data")
}

fn default_map_size_mb() -> usize {
    1024
}

fn default_cooldown_secs() -> u64 {
    rollcall_validator::validator::DEFAULT_COOLDOWN_SECS
}

fn default_sweep_multiplier() -> u64 {
    rollcall_validator::replay_guard::DEFAULT_SWEEP_MULTIPLIER
}

fn default_sweep_interval_secs() -> u64 {
    rollcall_validator::replay_guard::DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_guard_capacity() -> usize {
    rollcall_validator::replay_guard::DEFAULT_GUARD_CAPACITY
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

fn default_audit_log() -> PathBuf {
    PathBuf::from("scan_log.jsonl")
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl StationConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, DaemonError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DaemonError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, DaemonError> {
        toml::from_str(s).map_err(|e| DaemonError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, DaemonError> {
        toml::to_string_pretty(self).map_err(|e| DaemonError::Config(e.to_string()))
    }

    pub fn map_size_bytes(&self) -> usize {
        self.map_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            cooldown_secs: self.cooldown_secs,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            guard: GuardConfig {
                capacity: self.guard_capacity,
                sweep_multiplier: self.sweep_multiplier,
                sweep_interval_secs: self.sweep_interval_secs,
            },
        }
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            map_size_mb: default_map_size_mb(),
            cooldown_secs: default_cooldown_secs(),
            sweep_multiplier: default_sweep_multiplier(),
            sweep_interval_secs: default_sweep_interval_secs(),
            guard_capacity: default_guard_capacity(),
            store_timeout_ms: default_store_timeout_ms(),
            audit_log: default_audit_log(),
            metrics_file: None,
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = StationConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = StationConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = StationConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.cooldown_secs, 5);
        assert_eq!(config.sweep_multiplier, 10);
        assert_eq!(config.guard_capacity, 65_536);
        assert_eq!(config.store_timeout_ms, 2_000);
        assert_eq!(config.audit_log, PathBuf::from("scan_log.jsonl"));
        assert_eq!(config.log_format, LogFormat::Human);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            cooldown_secs = 2
            log_format = "json"
            metrics_file = "/tmp/rollcall.prom"
        "#;
        let config = StationConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.cooldown_secs, 2);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.metrics_file, Some(PathBuf::from("/tmp/rollcall.prom")));
        assert_eq!(config.log_level, "info"); // default
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let err = StationConfig::from_toml_str("log_format = \"xml\"").unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)));
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = StationConfig::from_toml_file(Path::new("/nonexistent/rollcall.toml"));
        assert!(matches!(result, Err(DaemonError::Config(_))));
    }

    #[test]
    fn validator_config_carries_guard_settings() {
        let config = StationConfig {
            cooldown_secs: 7,
            store_timeout_ms: 150,
            guard_capacity: 10,
            ..StationConfig::default()
        };
        let vc = config.validator_config();
        assert_eq!(vc.cooldown_secs, 7);
        assert_eq!(vc.store_timeout, Duration::from_millis(150));
        assert_eq!(vc.guard.capacity, 10);
        assert_eq!(vc.guard.sweep_multiplier, 10);
    }

    #[test]
    fn map_size_is_in_mebibytes() {
        let config = StationConfig {
            map_size_mb: 2,
            ..StationConfig::default()
        };
        assert_eq!(config.map_size_bytes(), 2 * 1024 * 1024);
    }
}
