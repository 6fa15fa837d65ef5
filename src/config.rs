//! Harness configuration.
//!
//! Loaded from `imagelab.toml` (or the file passed with `--config`) and
//! merged over stock defaults, so a config file only needs the keys it wants
//! to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [harness]
//! timeout_ms = 10000        # wall-clock budget per image set
//! tolerance = 1             # max per-channel deviation from the golden pixel
//! seed = 0                  # RNG seed handed to every plugin call
//! max_stuck_workers = 4     # timed-out calls still running before new calls are refused
//!
//! [defaults]
//! color = [238, 0, 119]     # used by cases that don't set a color
//! extra = "extra parameters..."
//! image_sets = [["square"], ["pad1"], ["pad3"], ["odd"]]
//!
//! [paths]
//! inputs = "inputs"         # directory of original images
//! golden = "golden"         # golden snapshot store
//!
//! [processing]
//! max_processes = 4         # parallel case workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::types::Rgb;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "imagelab.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Everything the harness, the snapshot tool and the CLI read from config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabConfig {
    /// Budget, tolerance and seed.
    pub harness: HarnessConfig,
    /// Invocation parameters for cases that leave them unset.
    pub defaults: DefaultsConfig,
    /// Where the input and golden stores live.
    pub paths: PathsConfig,
    /// Parallel case execution.
    pub processing: ProcessingConfig,
}

impl LabConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.harness.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "harness.timeout_ms must be greater than 0".into(),
            ));
        }
        if self.harness.max_stuck_workers == 0 {
            return Err(ConfigError::Validation(
                "harness.max_stuck_workers must be at least 1".into(),
            ));
        }
        if self.defaults.image_sets.is_empty() {
            return Err(ConfigError::Validation(
                "defaults.image_sets must not be empty".into(),
            ));
        }
        if let Some(set) = self
            .defaults
            .image_sets
            .iter()
            .find(|s| s.is_empty() || s.len() > 2)
        {
            return Err(ConfigError::Validation(format!(
                "defaults.image_sets entries must name 1 or 2 images, got {set:?}"
            )));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Pedagogical defaults: tuned for classroom use, not correctness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Wall-clock budget per image set, in milliseconds.
    pub timeout_ms: u64,
    /// Maximum per-channel deviation from the golden value.
    pub tolerance: u8,
    /// Seed for the per-call RNG.
    pub seed: u64,
    /// Abandoned calls allowed to keep running before new calls are refused.
    pub max_stuck_workers: usize,
}

impl HarnessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            tolerance: 1,
            seed: 0,
            max_stuck_workers: 4,
        }
    }
}

/// Invocation parameters used when a case does not set its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsConfig {
    pub color: Rgb,
    pub extra: String,
    /// Image sets for cases without an explicit list.
    pub image_sets: Vec<Vec<String>>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            color: Rgb::new(238, 0, 119),
            extra: "extra parameters...".to_string(),
            image_sets: ["square", "pad1", "pad3", "odd"]
                .iter()
                .map(|n| vec![n.to_string()])
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub inputs: String,
    pub golden: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            inputs: "inputs".to_string(),
            golden: "golden".to_string(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of cases graded at once.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(LabConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value. `Ok(None)` if it doesn't exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<LabConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: LabConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, merged over stock defaults and validated.
/// A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<LabConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `imagelab.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imagelab configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Grading
# ---------------------------------------------------------------------------
[harness]
# Wall-clock budget for one plugin call on one image set, in milliseconds.
# A call that runs longer is reported as timed out, not as wrong.
timeout_ms = 10000

# Largest difference allowed between an actual and a golden channel value.
# 1 absorbs rounding differences; 0 demands exact output.
tolerance = 1

# Seed for the random number generator every plugin call receives.
# Golden snapshots must be regenerated after changing it.
seed = 0

# A call that times out keeps running in the background until it next
# touches a pixel. Once this many are still running, further calls are
# refused and reported as configuration errors instead of timing out.
max_stuck_workers = 4

# ---------------------------------------------------------------------------
# Invocation defaults (a case in the suite file can override each one)
# ---------------------------------------------------------------------------
[defaults]
color = [238, 0, 119]
extra = "extra parameters..."
# Each set names the primary image and, optionally, a second image.
image_sets = [["square"], ["pad1"], ["pad3"], ["odd"]]

# ---------------------------------------------------------------------------
# Stores
# ---------------------------------------------------------------------------
[paths]
# Directory of original images (<name>.bmp, or PNG/JPEG converted on load).
inputs = "inputs"
# Golden snapshot store written by `imagelab snapshot`.
golden = "golden"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of cases graded in parallel.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
