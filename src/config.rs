//! Configuration management for Solarouter
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Static hardware settings (bus, dimmer SKU,
//! relay presence) and the per-output control settings live side by side.

use crate::dimmer::{DimmerSku, OutputRange};
use crate::error::{RouterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

mod defaults;

/// Weekday tokens accepted in `week_days`, Sunday first
pub const WEEKDAY_TOKENS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Shared I2C bus configuration
    pub bus: BusConfig,

    /// Timezone used to evaluate automatic bypass windows
    pub timezone: String,

    /// Control tick interval in milliseconds
    pub tick_interval_ms: u64,

    /// Grid voltage assumed until a measurement arrives
    pub nominal_grid_voltage: f32,

    /// Seconds after which a grid reading is considered stale (0 = never)
    pub grid_expiration_secs: u64,

    /// Seconds after which a temperature reading is considered stale (0 = never)
    pub temperature_expiration_secs: u64,

    /// Router outputs, evaluated in this order
    pub outputs: Vec<OutputConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level (defaults to `level`)
    pub console_level: Option<String>,

    /// Optional file-specific level (defaults to `level`)
    pub file_level: Option<String>,

    /// Path to log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// I2C bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Linux I2C character device
    pub device: String,

    /// Probe attempts per address during discovery
    pub discovery_attempts: u32,

    /// Delay between two failed probes, in milliseconds
    pub discovery_delay_ms: u64,
}

/// One router output: a dimmer, an optional bypass relay and its control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output name used in logs and snapshots
    pub name: String,

    /// Bus dimmer settings
    pub dimmer: DimmerConfig,

    /// Bypass relay settings
    pub relay: RelayConfig,

    /// Routing and automatic bypass settings
    pub control: ControlConfig,
}

/// Bus dimmer hardware settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DimmerConfig {
    /// Module SKU; the register resolution derives from it
    pub sku: Option<DimmerSku>,

    /// Output channel on the module (0, 1, or 2 for both)
    pub channel: u8,

    /// Fixed bus address; 0 scans the vendor address block
    pub address: u8,

    /// Analog output voltage range
    pub output_range: OutputRange,

    /// Highest duty cycle the dimmer accepts (0..=1)
    pub duty_cycle_limit: f32,
}

/// Bypass relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Whether a bypass relay is wired to this output
    pub enabled: bool,
}

/// Routing and automatic bypass settings of one output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Measured resistance of the load in ohms (0 = uncalibrated)
    pub calibrated_resistance: f32,

    /// Route excess power automatically
    pub auto_dimmer: bool,

    /// Dimmer temperature limit in °C (0 = disabled)
    pub dimmer_temp_limit: u8,

    /// Enable the automatic bypass scheduler
    pub auto_bypass: bool,

    /// Automatic bypass starts below this temperature (°C)
    pub auto_start_temperature: u8,

    /// Automatic bypass stops at or above this temperature (°C)
    pub auto_stop_temperature: u8,

    /// Automatic bypass window start in HH:MM
    pub auto_start_time: String,

    /// Automatic bypass window end in HH:MM
    pub auto_stop_time: String,

    /// Comma separated weekday tokens (sun,mon,...)
    pub week_days: String,

    /// Fraction of the excess power this output may use (0..=1)
    pub reserved_excess_power_ratio: f32,
}

impl ControlConfig {
    /// Whether the given weekday token is part of `week_days`
    pub fn is_active_on(&self, weekday: &str) -> bool {
        self.week_days
            .split(',')
            .any(|d| d.trim().eq_ignore_ascii_case(weekday))
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location found
    pub fn load() -> Result<Self> {
        let default_paths = [
            "solarouter.yaml",
            "/data/solarouter.yaml",
            "/etc/solarouter/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(RouterError::validation(
                "tick_interval_ms",
                "Must be greater than 0",
            ));
        }

        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(RouterError::validation(
                "timezone".to_string(),
                format!("Unknown timezone: {}", self.timezone),
            ));
        }

        if !(self.nominal_grid_voltage.is_finite() && self.nominal_grid_voltage > 0.0) {
            return Err(RouterError::validation(
                "nominal_grid_voltage",
                "Must be positive",
            ));
        }

        if self.bus.discovery_attempts == 0 {
            return Err(RouterError::validation(
                "bus.discovery_attempts",
                "Must be greater than 0",
            ));
        }

        let mut names = HashSet::new();
        for (idx, output) in self.outputs.iter().enumerate() {
            let field = |name: &str| format!("outputs[{}].{}", idx, name);

            if output.name.trim().is_empty() {
                return Err(RouterError::validation(
                    field("name"),
                    "Name cannot be empty".to_string(),
                ));
            }
            if !names.insert(output.name.as_str()) {
                return Err(RouterError::validation(
                    field("name"),
                    format!("Duplicate output name: {}", output.name),
                ));
            }

            let dimmer = &output.dimmer;
            if dimmer.channel > 2 {
                return Err(RouterError::validation(
                    field("dimmer.channel"),
                    "Must be 0, 1 or 2".to_string(),
                ));
            }
            if dimmer.address != 0 && !(0x08..=0x77).contains(&dimmer.address) {
                return Err(RouterError::validation(
                    field("dimmer.address"),
                    format!("Invalid 7-bit address: 0x{:02x}", dimmer.address),
                ));
            }
            if !(0.0..=1.0).contains(&dimmer.duty_cycle_limit) {
                return Err(RouterError::validation(
                    field("dimmer.duty_cycle_limit"),
                    "Must be within 0..=1".to_string(),
                ));
            }

            let control = &output.control;
            if !(control.calibrated_resistance.is_finite() && control.calibrated_resistance >= 0.0)
            {
                return Err(RouterError::validation(
                    field("control.calibrated_resistance"),
                    "Must be a non-negative number".to_string(),
                ));
            }
            if !(0.0..=1.0).contains(&control.reserved_excess_power_ratio) {
                return Err(RouterError::validation(
                    field("control.reserved_excess_power_ratio"),
                    "Must be within 0..=1".to_string(),
                ));
            }
            if let Some(bad) = control
                .week_days
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .find(|d| !WEEKDAY_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(d)))
            {
                return Err(RouterError::validation(
                    field("control.week_days"),
                    format!("Unknown weekday token: {}", bad),
                ));
            }
        }

        Ok(())
    }
}
