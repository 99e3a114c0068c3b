//! Daemon configuration – reads/writes `/etc/cputune/config.toml`.
//!
//! The file location can be overridden with `CPUTUNE_CONFIG`.  A missing
//! file is not an error: every field has a default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cputune_runtime::engine::DEFAULT_UPDATE_INTERVAL_MS;
use cputune_runtime::{DirectivePaths, EngineConfig, InitialIntent, LogFormat};
use cputune_types::TuneError;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cputune/config.toml";

/// Persisted daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Enable Turbo Boost at startup.
    #[serde(default)]
    pub enable_turbo_boost: bool,

    /// Enable PROCHOT at startup.
    #[serde(default)]
    pub enable_proc_hot: bool,

    /// Enable Speed Shift at startup (HWP CPUs only).
    #[serde(default)]
    pub enable_speed_shift: bool,

    /// Turbo Boost directive file; `'1'` keeps it on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turbo_boost_at_runtime: Option<PathBuf>,

    /// PROCHOT directive file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proc_hot_at_runtime: Option<PathBuf>,

    /// Speed Shift directive file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_shift_at_runtime: Option<PathBuf>,

    /// File holding the hexadecimal `IA32_HWP_REQUEST` word.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hwp_request_config_path: Option<PathBuf>,

    /// Tick period in milliseconds.
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// Delay before the first tick, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Logical CPU whose msr device is driven.
    #[serde(default)]
    pub cpu: u32,

    /// Kill switch: when set the daemon exits without touching any register.
    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_update_interval_ms() -> u64 {
    DEFAULT_UPDATE_INTERVAL_MS
}
fn default_initial_delay_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_turbo_boost: false,
            enable_proc_hot: false,
            enable_speed_shift: false,
            turbo_boost_at_runtime: None,
            proc_hot_at_runtime: None,
            speed_shift_at_runtime: None,
            hwp_request_config_path: None,
            update_interval_ms: default_update_interval_ms(),
            initial_delay_ms: default_initial_delay_ms(),
            cpu: 0,
            disabled: false,
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// What to apply once at startup.
    pub fn initial_intent(&self) -> InitialIntent {
        InitialIntent {
            turbo_boost: self.enable_turbo_boost,
            proc_hot: self.enable_proc_hot,
            speed_shift: self.enable_speed_shift,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            directives: DirectivePaths {
                turbo_boost: self.turbo_boost_at_runtime.clone(),
                proc_hot: self.proc_hot_at_runtime.clone(),
                speed_shift: self.speed_shift_at_runtime.clone(),
                hwp_request: self.hwp_request_config_path.clone(),
            },
            update_interval_ms: self.update_interval_ms,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

/// Return `$CPUTUNE_CONFIG`, or [`DEFAULT_CONFIG_PATH`].
pub fn config_path() -> PathBuf {
    std::env::var_os("CPUTUNE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load the config from [`config_path`], falling back to defaults when the
/// file does not exist, then apply environment overrides.
pub fn load() -> Result<Config, TuneError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, TuneError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        TuneError::Config(format!("Failed to read config at {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| TuneError::Config(format!("Failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `CPUTUNE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `CPUTUNE_UPDATE_INTERVAL_MS` | `update_interval_ms` |
/// | `CPUTUNE_CPU` | `cpu` |
/// | `CPUTUNE_LOG_FORMAT` | `log_format` |
/// | `CPUTUNE_OFF` | `disabled` (any value but empty or `0`) |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("CPUTUNE_UPDATE_INTERVAL_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.update_interval_ms = ms;
    }
    if let Some(v) = lookup("CPUTUNE_CPU")
        && let Ok(cpu) = v.trim().parse::<u32>()
    {
        cfg.cpu = cpu;
    }
    if let Some(v) = lookup("CPUTUNE_LOG_FORMAT")
        && let Ok(format) = v.parse::<LogFormat>()
    {
        cfg.log_format = format;
    }
    if let Some(v) = lookup("CPUTUNE_OFF") {
        let v = v.trim();
        if !v.is_empty() && v != "0" {
            cfg.disabled = true;
        }
    }
}

/// Save the config to a specific path, creating parent directories.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), TuneError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            TuneError::Config(format!("Failed to create {}: {e}", parent.display()))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| TuneError::Config(format!("Failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        TuneError::Config(format!("Failed to write config at {}: {e}", path.display()))
    })
}
