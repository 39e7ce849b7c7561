//! Service configuration.
//!
//! Settings are layered with `figment`, each layer overriding the previous:
//!
//! 1. Library defaults (`Settings::default()`, exposed as a `Provider`)
//! 2. A TOML file: the `--config` path, else `config/magsim.toml` if present
//! 3. `MODEL_PORT`, the variable the model process itself publishes its port in
//! 4. `MAGSIM_`-prefixed variables, nested with double underscores
//!
//! ## Schema
//!
//! ```toml
//! log_level = "info"          # trace | debug | info | warn | error
//! log_format = "pretty"       # pretty | compact | json
//!
//! [model]
//! host = "127.0.0.1"
//! port = 12312
//! reply_timeout_ms = 5000
//!
//! [magnets]
//! device_map = "config/devices.csv"   # element,device pairs; optional
//! trim_settle_ms = 200
//! ctrl_limit = 0.006
//! precision = 4
//! ```
//!
//! ## Environment Variables
//!
//! - `MODEL_PORT=13000` sets `model.port`
//! - `MAGSIM_LOG_LEVEL=debug` sets `log_level`
//! - `MAGSIM_MODEL__REPLY_TIMEOUT_MS=2000` sets `model.reply_timeout_ms`
//! - `MAGSIM_MAGNETS__TRIM_SETTLE_MS=50` sets `magnets.trim_settle_ms`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::{Figment, Provider};
use magsim_core::limits::{
    DEFAULT_CTRL_LIMIT, DEFAULT_MODEL_HOST, DEFAULT_MODEL_PORT, DEFAULT_PRECISION,
    DEFAULT_REPLY_TIMEOUT, DEFAULT_TRIM_SETTLE,
};
use magsim_driver::MagnetOptions;
use serde::{Deserialize, Serialize};

/// Config file picked up when no `--config` path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/magsim.toml";

/// Prefix of service environment variables.
pub const ENV_PREFIX: &str = "MAGSIM_";

/// Variable carrying the model's command port.
pub const MODEL_PORT_VAR: &str = "MODEL_PORT";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored output for interactive use.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// Newline-delimited JSON.
    Json,
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Logging verbosity: "error", "warn", "info", "debug" or "trace".
    ///
    /// `RUST_LOG`, when set, takes precedence.
    pub log_level: String,

    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,

    /// Where the physics model listens and how long to wait for it.
    #[serde(default)]
    pub model: ModelSettings,

    /// Which magnets exist and how they behave.
    #[serde(default)]
    pub magnets: MagnetSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            model: ModelSettings::default(),
            magnets: MagnetSettings::default(),
        }
    }
}

impl Provider for Settings {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("Library Defaults")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(Settings::default()).data()
    }
}

/// Physics model endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Host the model runs on.
    pub host: String,

    /// Model command port.
    pub port: u16,

    /// Upper bound on one request/reply round trip, in milliseconds.
    ///
    /// Valid range: 10-600000.
    pub reply_timeout_ms: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_MODEL_HOST.to_string(),
            port: DEFAULT_MODEL_PORT,
            reply_timeout_ms: millis(DEFAULT_REPLY_TIMEOUT),
        }
    }
}

/// Magnet behavior and inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnetSettings {
    /// CSV file of `element,device` pairs naming every known device.
    ///
    /// When unset the built-in demonstration inventory is used.
    pub device_map: Option<PathBuf>,

    /// TRIM settling delay in milliseconds. Valid range: 0-60000.
    pub trim_settle_ms: u64,

    /// Published control limit for setpoint and readback channels.
    pub ctrl_limit: f64,

    /// Published display precision for setpoint and readback channels.
    pub precision: u8,
}

impl Default for MagnetSettings {
    fn default() -> Self {
        Self {
            device_map: None,
            trim_settle_ms: millis(DEFAULT_TRIM_SETTLE),
            ctrl_limit: DEFAULT_CTRL_LIMIT,
            precision: DEFAULT_PRECISION,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Settings {
    /// Load, layer and validate the configuration.
    ///
    /// An explicit `config_path` must exist. Without one, the default path is
    /// used if present and skipped otherwise.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
        }

        let settings: Settings = Self::figment(config_path)
            .extract()
            .context("Failed to extract configuration from Figment")?;

        settings
            .validate()
            .context("Configuration validation failed")?;

        Ok(settings)
    }

    /// The layered figment, before extraction.
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Settings::default());

        let file_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        if file_path.exists() {
            figment = figment.merge(Toml::file(&file_path));
        }

        figment
            .merge(
                Env::raw()
                    .only(&[MODEL_PORT_VAR])
                    .map(|_| "model.port".into()),
            )
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let level = self.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            anyhow::bail!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            );
        }

        if self.model.host.trim().is_empty() {
            anyhow::bail!("model.host must not be empty");
        }
        if self.model.port == 0 {
            anyhow::bail!("model.port must be non-zero");
        }
        validate_range(self.model.reply_timeout_ms, 10, 600_000, "model.reply_timeout_ms")?;
        validate_range(self.magnets.trim_settle_ms, 0, 60_000, "magnets.trim_settle_ms")?;

        if !self.magnets.ctrl_limit.is_finite() || self.magnets.ctrl_limit <= 0.0 {
            anyhow::bail!(
                "magnets.ctrl_limit must be a positive number, got {}",
                self.magnets.ctrl_limit
            );
        }
        if self.magnets.precision > 15 {
            anyhow::bail!(
                "magnets.precision {} is out of valid range (0 - 15)",
                self.magnets.precision
            );
        }

        Ok(())
    }

    /// Reply timeout as a `Duration`.
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.model.reply_timeout_ms)
    }

    /// Per-magnet options derived from `[magnets]`.
    pub fn magnet_options(&self) -> MagnetOptions {
        MagnetOptions {
            trim_settle: Duration::from_millis(self.magnets.trim_settle_ms),
            ctrl_limit: self.magnets.ctrl_limit,
            precision: self.magnets.precision,
        }
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

fn validate_range(value: u64, min: u64, max: u64, name: &str) -> Result<()> {
    if value < min || value > max {
        anyhow::bail!(
            "'{}' = {} is out of valid range ({} - {})",
            name,
            value,
            min,
            max
        );
    }
    Ok(())
}
