//! Scenario configuration with type-safe validation.
//!
//! Numeric settings are `nutype` newtypes, so a configuration that made it
//! past construction is valid. Timestamps are parsed eagerly: an unparsable
//! start time is reported by [`ScenarioConfig::build`] immediately instead of
//! failing a step later.

use crate::errors::ConfigError;
use crate::types::Timestamp;
use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Maximum nesting depth of steps registered from inside other steps.
///
/// A step that keeps registering further steps would otherwise run without
/// bound; the scheduler fails the scenario once steps nest deeper than this.
/// Every nested registration copies its ancestors' frames, which bounds the
/// useful maximum.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000),
    default = 256,
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Default,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct MaxDrainDepth(usize);

/// Width the `<file>:<line>:<column>` column of a step's diagnostic line is
/// padded to.
#[nutype(
    validate(less_or_equal = 200),
    default = 40,
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Default,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct LocationWidth(usize);

/// Whether breakpoint steps pause the scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugMode {
    /// Breakpoints are ignored.
    #[default]
    Off,
    /// Breakpoints hand control to the configured breakpoint hook.
    On,
}

/// Raw, serializable scenario settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioSettings {
    /// RFC 3339 start time of the scenario clock; `None` means "now".
    pub start_time: Option<String>,
    /// Maximum nesting depth of steps
    pub max_drain_depth: MaxDrainDepth,
    /// Width of the location column in diagnostics
    pub location_width: LocationWidth,
    /// Root that absolute source paths are shown relative to
    pub source_root: Option<PathBuf>,
    /// Breakpoint behaviour
    pub debug: DebugMode,
    /// Emit step diagnostics at `info` (true) or `trace` (false)
    pub log_steps: Option<bool>,
}

/// Validated configuration for a scenario.
///
/// # Example
///
/// ```rust
/// use stepwise::config::{DebugMode, ScenarioConfig};
///
/// let config = ScenarioConfig::builder()
///     .start_time("2024-03-01T09:00:00Z")
///     .debug(DebugMode::On)
///     .build()
///     .expect("valid configuration");
///
/// assert_eq!(config.debug(), DebugMode::On);
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    start_time: Option<Timestamp>,
    max_drain_depth: MaxDrainDepth,
    location_width: LocationWidth,
    source_root: Option<PathBuf>,
    debug: DebugMode,
    log_steps: bool,
}

impl ScenarioConfig {
    /// Starts building a configuration from defaults.
    pub fn builder() -> ScenarioConfigBuilder {
        ScenarioConfigBuilder::default()
    }

    /// Validates raw settings.
    pub fn from_settings(settings: ScenarioSettings) -> Result<Self, ConfigError> {
        let start_time = settings
            .start_time
            .as_deref()
            .map(Timestamp::parse)
            .transpose()?;

        Ok(Self {
            start_time,
            max_drain_depth: settings.max_drain_depth,
            location_width: settings.location_width,
            source_root: settings.source_root,
            debug: settings.debug,
            log_steps: settings.log_steps.unwrap_or(true),
        })
    }

    /// Parses settings from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: ScenarioSettings =
            serde_json::from_str(json).map_err(|error| ConfigError::InvalidValue {
                key: "json".to_string(),
                reason: error.to_string(),
            })?;
        Self::from_settings(settings)
    }

    /// Reads `STEPWISE_START_TIME`, `STEPWISE_MAX_DRAIN_DEPTH` and
    /// `STEPWISE_DEBUG` from the environment on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = ScenarioSettings {
            start_time: lookup("STEPWISE_START_TIME"),
            ..ScenarioSettings::default()
        };

        if let Some(raw) = lookup("STEPWISE_MAX_DRAIN_DEPTH") {
            let depth = raw
                .trim()
                .parse::<usize>()
                .map_err(|error| error.to_string())
                .and_then(|depth| MaxDrainDepth::try_new(depth).map_err(|error| error.to_string()))
                .map_err(|reason| ConfigError::InvalidValue {
                    key: "STEPWISE_MAX_DRAIN_DEPTH".to_string(),
                    reason,
                })?;
            settings.max_drain_depth = depth;
        }

        if let Some(raw) = lookup("STEPWISE_DEBUG") {
            settings.debug = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => DebugMode::On,
                "0" | "false" | "off" | "" => DebugMode::Off,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "STEPWISE_DEBUG".to_string(),
                        reason: format!("expected on/off, got '{other}'"),
                    })
                }
            };
        }

        Self::from_settings(settings)
    }

    /// Start time of the scenario clock, if fixed.
    pub const fn start_time(&self) -> Option<Timestamp> {
        self.start_time
    }

    /// Maximum nesting depth of steps.
    pub fn max_drain_depth(&self) -> usize {
        self.max_drain_depth.into()
    }

    /// Width of the location column in diagnostics.
    pub fn location_width(&self) -> usize {
        self.location_width.into()
    }

    /// Root that absolute source paths are shown relative to.
    pub fn source_root(&self) -> Option<&PathBuf> {
        self.source_root.as_ref()
    }

    /// Breakpoint behaviour.
    pub const fn debug(&self) -> DebugMode {
        self.debug
    }

    /// Whether step diagnostics are logged at `info`.
    pub const fn log_steps(&self) -> bool {
        self.log_steps
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            start_time: None,
            max_drain_depth: MaxDrainDepth::default(),
            location_width: LocationWidth::default(),
            source_root: None,
            debug: DebugMode::Off,
            log_steps: true,
        }
    }
}

/// Builder for [`ScenarioConfig`].
#[derive(Debug, Clone, Default)]
pub struct ScenarioConfigBuilder {
    settings: ScenarioSettings,
}

impl ScenarioConfigBuilder {
    /// Fixes the scenario clock at an RFC 3339 instant.
    #[must_use]
    pub fn start_time(mut self, start_time: impl Into<String>) -> Self {
        self.settings.start_time = Some(start_time.into());
        self
    }

    /// Sets the maximum nesting depth of steps.
    #[must_use]
    pub const fn max_drain_depth(mut self, depth: MaxDrainDepth) -> Self {
        self.settings.max_drain_depth = depth;
        self
    }

    /// Sets the width of the location column in diagnostics.
    #[must_use]
    pub const fn location_width(mut self, width: LocationWidth) -> Self {
        self.settings.location_width = width;
        self
    }

    /// Shows source paths relative to `root`.
    #[must_use]
    pub fn source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.settings.source_root = Some(root.into());
        self
    }

    /// Enables or disables breakpoints.
    #[must_use]
    pub const fn debug(mut self, debug: DebugMode) -> Self {
        self.settings.debug = debug;
        self
    }

    /// Logs step diagnostics at `info` (true) or `trace` (false).
    #[must_use]
    pub const fn log_steps(mut self, enabled: bool) -> Self {
        self.settings.log_steps = Some(enabled);
        self
    }

    /// Validates the settings.
    pub fn build(self) -> Result<ScenarioConfig, ConfigError> {
        ScenarioConfig::from_settings(self.settings)
    }
}
