//! Router output controller
//!
//! One [`OutputController`] drives one load: a dimmer for proportional
//! routing and an optional relay for full-power bypass. Its operating state
//! is never stored; [`OutputController::state`] derives it from the device
//! flags on every call.
//!
//! Per tick the router calls, in order: [`OutputController::apply_temperature_limit`],
//! [`OutputController::apply_auto_bypass`], then either
//! [`OutputController::auto_divert`] or nothing (manual duty cycle requests
//! come in as commands).

use crate::clock::TimeSource;
use crate::config::ControlConfig;
use crate::dimmer::Dimmer;
use crate::error::Result;
use crate::expiring::ExpiringValue;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::meter::Meter;
use crate::metrics::{Metrics, live_measurements, theoretical_metrics};
use crate::relay::Relay;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

mod bypass;

/// Operating state of an output, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputState {
    /// Neither dimmer nor relay usable
    Disabled,
    Idle,
    Routing,
    BypassManual,
    BypassAuto,
}

impl OutputState {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputState::Disabled => "DISABLED",
            OutputState::Idle => "IDLE",
            OutputState::Routing => "ROUTING",
            OutputState::BypassManual => "BYPASS_MANUAL",
            OutputState::BypassAuto => "BYPASS_AUTO",
        }
    }
}

impl fmt::Display for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized view of one output
#[derive(Debug, Clone, Serialize)]
pub struct OutputSnapshot {
    pub name: String,
    /// "on" or "off"
    pub bypass: &'static str,
    /// Dimmer enabled
    pub enabled: bool,
    pub state: OutputState,
    /// Last fresh temperature, 0 when unknown
    pub temperature: f32,
    pub duty_cycle: f32,
    /// Live meter readings, absent while the meter is disconnected
    pub measurements: Option<Metrics>,
    /// Values derived from the duty cycle
    pub metrics: Metrics,
}

/// Controller of one router output
pub struct OutputController {
    name: String,
    config: ControlConfig,
    dimmer: Box<dyn Dimmer>,
    relay: Arc<dyn Relay>,
    meter: Arc<dyn Meter>,
    clock: Arc<dyn TimeSource>,
    bypass_enabled: bool,
    auto_bypass_enabled: bool,
    temperature: ExpiringValue<f32>,
    logger: StructuredLogger,
}

impl fmt::Debug for OutputController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputController")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("bypass_enabled", &self.bypass_enabled)
            .field("auto_bypass_enabled", &self.auto_bypass_enabled)
            .finish_non_exhaustive()
    }
}

impl OutputController {
    pub fn new(
        name: &str,
        config: ControlConfig,
        dimmer: Box<dyn Dimmer>,
        relay: Arc<dyn Relay>,
        meter: Arc<dyn Meter>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            name: name.to_string(),
            config,
            dimmer,
            relay,
            meter,
            clock,
            bypass_enabled: false,
            auto_bypass_enabled: false,
            temperature: ExpiringValue::default(),
            logger: get_logger_with_context(LogContext::new("output").with_output(name)),
        }
    }

    /// Temperature readings older than `secs` seconds are ignored (0 = never)
    pub fn with_temperature_expiration(mut self, secs: u64) -> Self {
        self.temperature = ExpiringValue::with_expiration_secs(secs);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Replace the control settings; takes effect on the next tick
    pub fn set_config(&mut self, config: ControlConfig) {
        self.config = config;
    }

    // state

    pub fn state(&self) -> OutputState {
        if !self.dimmer.is_enabled() && !self.relay.is_enabled() {
            return OutputState::Disabled;
        }
        if self.auto_bypass_enabled {
            return OutputState::BypassAuto;
        }
        if self.bypass_enabled {
            return OutputState::BypassManual;
        }
        if self.dimmer.is_on() {
            return OutputState::Routing;
        }
        OutputState::Idle
    }

    pub fn is_bypass_on(&self) -> bool {
        self.bypass_enabled
    }

    pub fn is_auto_bypass_active(&self) -> bool {
        self.auto_bypass_enabled
    }

    pub fn is_dimmer_enabled(&self) -> bool {
        self.dimmer.is_enabled()
    }

    /// Auto dimmer configured on a calibrated load and no bypass running
    pub fn is_auto_dimmer_enabled(&self) -> bool {
        self.config.auto_dimmer
            && self.config.calibrated_resistance > 0.0
            && !self.auto_bypass_enabled
            && !self.bypass_enabled
    }

    /// A limit of 0 never triggers, neither does a missing reading
    pub fn is_dimmer_temperature_limit_reached(&self) -> bool {
        self.config.dimmer_temp_limit > 0
            && self.temperature.or(0.0) >= f32::from(self.config.dimmer_temp_limit)
    }

    // temperature

    /// Record a sensor answer; `None` is an invalid reading
    pub fn update_temperature(&mut self, reading: Option<f32>) {
        self.temperature.update_reading(reading);
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature.get()
    }

    // dimmer

    pub fn dimmer_duty_cycle(&self) -> f32 {
        self.dimmer.duty_cycle()
    }

    pub fn dimmer_duty_cycle_limit(&self) -> f32 {
        self.dimmer.duty_cycle_limit()
    }

    pub async fn begin_dimmer(&mut self) -> Result<()> {
        self.dimmer.begin().await
    }

    pub async fn end_dimmer(&mut self) {
        self.dimmer.end().await;
    }

    /// Turn every load path off and release the dimmer
    pub async fn shutdown(&mut self) {
        self.auto_bypass_enabled = false;
        self.activate_bypass(false).await;
        self.set_dimmer_off().await;
        self.end_dimmer().await;
    }

    /// Manual duty cycle request. Returns whether it was accepted.
    pub async fn set_dimmer_duty_cycle(&mut self, duty_cycle: f32) -> bool {
        if !self.dimmer.is_enabled() {
            self.logger
                .warn(&format!("Dimmer '{}' is disabled", self.name));
            return false;
        }

        if self.auto_bypass_enabled {
            self.logger.warn(&format!(
                "Auto Bypass '{}' is activated: unable to change dimmer level",
                self.name
            ));
            return false;
        }

        if self.config.auto_dimmer {
            self.logger.warn(&format!(
                "Auto Dimmer '{}' is activated: unable to change dimmer level",
                self.name
            ));
            return false;
        }

        if duty_cycle > 0.0 && self.is_dimmer_temperature_limit_reached() {
            self.logger.warn(&format!(
                "Dimmer '{}' reached its temperature limit of {} °C",
                self.name, self.config.dimmer_temp_limit
            ));
            return false;
        }

        self.activate_bypass(false).await;
        if let Err(e) = self.dimmer.set_duty_cycle(duty_cycle).await {
            self.logger
                .error(&format!("Dimmer '{}': {}", self.name, e));
            return false;
        }

        self.logger.debug(&format!(
            "Set Dimmer '{}' duty to {:.4}",
            self.name,
            self.dimmer.duty_cycle()
        ));
        true
    }

    /// Change the dimmer ceiling
    pub async fn set_dimmer_duty_cycle_limit(&mut self, limit: f32) -> Result<()> {
        self.dimmer.set_duty_cycle_limit(limit).await
    }

    /// Force the dimmer to zero output, logging bus failures
    pub async fn set_dimmer_off(&mut self) {
        if let Err(e) = self.dimmer.off().await {
            self.logger
                .error(&format!("Dimmer '{}': unable to turn off: {}", self.name, e));
        }
    }

    /// Cut the dimmer when the load reached its temperature limit
    pub async fn apply_temperature_limit(&mut self) {
        if self.auto_bypass_enabled || self.bypass_enabled || self.dimmer.is_off() {
            return;
        }

        if self.is_dimmer_temperature_limit_reached() {
            self.logger.warn(&format!(
                "Dimmer '{}' reached its temperature limit of {} °C",
                self.name, self.config.dimmer_temp_limit
            ));
            self.set_dimmer_off().await;
        }
    }

    /// Route part of `available_power` (W) into the load
    ///
    /// Returns the power implied by the duty cycle the dimmer actually
    /// accepted, which can be lower than requested.
    pub async fn auto_divert(&mut self, grid_voltage: f32, available_power: f32) -> f32 {
        if !self.dimmer.is_enabled()
            || self.auto_bypass_enabled
            || !self.config.auto_dimmer
            || self.config.calibrated_resistance <= 0.0
            || self.is_dimmer_temperature_limit_reached()
        {
            self.set_dimmer_off().await;
            return 0.0;
        }

        let max_power = grid_voltage * grid_voltage / self.config.calibrated_resistance;
        let reserved_power = (available_power * self.config.reserved_excess_power_ratio)
            .min(max_power)
            .max(0.0);
        let duty_cycle = if max_power == 0.0 {
            0.0
        } else {
            reserved_power / max_power
        };

        if let Err(e) = self.dimmer.set_duty_cycle(duty_cycle).await {
            self.logger
                .error(&format!("Dimmer '{}': {}", self.name, e));
            return 0.0;
        }

        max_power * self.dimmer.duty_cycle()
    }

    // metrics

    /// Theoretical metrics at the current duty cycle
    pub fn dimmer_metrics(&self, grid_voltage: f32) -> Metrics {
        let mut metrics = theoretical_metrics(
            self.dimmer.duty_cycle(),
            self.config.calibrated_resistance,
            grid_voltage,
        );
        if let Some(data) = self.meter.data() {
            metrics.energy = data.active_energy;
        }
        metrics
    }

    /// Live meter readings, `None` while the meter is disconnected
    pub fn measurements(&self) -> Option<Metrics> {
        let data = self.meter.data()?;
        Some(live_measurements(
            &data,
            self.state() == OutputState::Routing,
        ))
    }

    /// Active power measured on the output, 0 without a meter
    pub fn output_power(&self) -> f32 {
        self.meter.data().map_or(0.0, |d| d.active_power.abs())
    }

    /// Power currently sent to the load: measured when possible, else computed
    pub fn routed_power(&self, grid_voltage: f32) -> f32 {
        if self.meter.is_connected() {
            self.output_power()
        } else {
            self.dimmer_metrics(grid_voltage).power
        }
    }

    pub fn snapshot(&self, grid_voltage: f32) -> OutputSnapshot {
        OutputSnapshot {
            name: self.name.clone(),
            bypass: if self.bypass_enabled { "on" } else { "off" },
            enabled: self.dimmer.is_enabled(),
            state: self.state(),
            temperature: self.temperature.or(0.0),
            duty_cycle: self.dimmer.duty_cycle(),
            measurements: self.measurements(),
            metrics: self.dimmer_metrics(grid_voltage),
        }
    }
}

#[cfg(test)]
mod tests;
