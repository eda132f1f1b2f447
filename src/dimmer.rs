//! Bus-driven analog dimmer modules
//!
//! The router drives its loads through voltage-output modules sitting on the
//! shared I2C bus (GP8403/GP8211S/GP8413 family). This module holds the
//! [`Dimmer`] capability used by router outputs and the [`BusDimmer`]
//! driver: discovery with bounded retries, output range selection and the
//! duty cycle to register encoding.

use crate::bus::SharedBus;
use crate::config::{BusConfig, DimmerConfig};
use crate::error::{RouterError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

/// Vendor address block scanned when no fixed address is configured
pub const DISCOVERY_ADDRESSES: RangeInclusive<u8> = 0x58..=0x5F;

/// Output range control register
pub const REG_OUTPUT_RANGE: u8 = 0x01;
/// Duty register of channel 0 (also the start of the dual-channel block)
pub const REG_DUTY_CHANNEL_0: u8 = 0x02;
/// Duty register of channel 1
pub const REG_DUTY_CHANNEL_1: u8 = 0x04;

/// Logical channel index addressing both outputs of a dual module at once
pub const CHANNEL_BOTH: u8 = 2;

/// Supported dimmer modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimmerSku {
    /// GP8403, 2 channels, 12 bits
    #[serde(rename = "DFR0971")]
    Dfr0971Gp8403,
    /// GP8211S, 1 channel, 15 bits
    #[serde(rename = "DFR1071")]
    Dfr1071Gp8211s,
    /// GP8413, 2 channels, 15 bits
    #[serde(rename = "DFR1073")]
    Dfr1073Gp8413,
}

impl DimmerSku {
    /// Bit width of the duty register
    pub fn resolution(self) -> u8 {
        match self {
            DimmerSku::Dfr0971Gp8403 => 12,
            DimmerSku::Dfr1071Gp8211s | DimmerSku::Dfr1073Gp8413 => 15,
        }
    }

    /// Number of physical outputs on the module
    pub fn channels(self) -> u8 {
        match self {
            DimmerSku::Dfr1071Gp8211s => 1,
            DimmerSku::Dfr0971Gp8403 | DimmerSku::Dfr1073Gp8413 => 2,
        }
    }
}

/// Analog output voltage range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputRange {
    /// 0-5V
    Low,
    /// 0-10V
    High,
}

impl OutputRange {
    /// Value written to [`REG_OUTPUT_RANGE`]
    pub fn register_value(self) -> u8 {
        match self {
            OutputRange::Low => 0x00,
            OutputRange::High => 0x11,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OutputRange::Low => "0-5V",
            OutputRange::High => "0-10V",
        }
    }
}

/// Encode a duty cycle into the module's left-aligned 16-bit register value
///
/// `raw = round(duty × (2^resolution − 1))`, then shifted left by
/// `16 − resolution`. Out-of-range duty cycles are clamped to `[0, 1]`;
/// an unsupported resolution encodes to 0.
pub fn encode_duty_register(duty_cycle: f32, resolution: u8) -> u16 {
    if resolution == 0 || resolution > 16 {
        return 0;
    }
    let duty = if duty_cycle.is_finite() {
        f64::from(duty_cycle.clamp(0.0, 1.0))
    } else {
        0.0
    };
    let max = (1u32 << resolution) - 1;
    let raw = (duty * f64::from(max)).round() as u32;
    ((raw << (16 - u32::from(resolution))) & 0xFFFF) as u16
}

/// Register and little-endian payload carrying `value` for `channel`
pub fn duty_payload(channel: u8, value: u16) -> Option<(u8, Vec<u8>)> {
    let [lo, hi] = value.to_le_bytes();
    match channel {
        0 => Some((REG_DUTY_CHANNEL_0, vec![lo, hi])),
        1 => Some((REG_DUTY_CHANNEL_1, vec![lo, hi])),
        CHANNEL_BOTH => Some((REG_DUTY_CHANNEL_0, vec![lo, hi, lo, hi])),
        _ => None,
    }
}

/// Dimmer capability consumed by a router output
#[async_trait]
pub trait Dimmer: Send {
    /// Discovered, configured and accepting duty commands
    fn is_enabled(&self) -> bool;

    /// Last commanded duty cycle in `[0, 1]`
    fn duty_cycle(&self) -> f32;

    /// Ceiling applied by [`Dimmer::set_duty_cycle`]
    fn duty_cycle_limit(&self) -> f32 {
        1.0
    }

    fn is_on(&self) -> bool {
        self.is_enabled() && self.duty_cycle() > 0.0
    }

    fn is_off(&self) -> bool {
        !self.is_on()
    }

    /// Delivering the highest output it accepts
    fn is_on_at_full_power(&self) -> bool {
        self.is_on() && self.duty_cycle() >= self.duty_cycle_limit()
    }

    /// Store and, when enabled, apply a duty cycle (clamped to `[0, limit]`)
    async fn set_duty_cycle(&mut self, duty_cycle: f32) -> Result<()>;

    /// Change the ceiling; a stored duty above it is lowered and re-applied
    async fn set_duty_cycle_limit(&mut self, limit: f32) -> Result<()>;

    async fn on(&mut self) -> Result<()> {
        self.set_duty_cycle(1.0).await
    }

    async fn off(&mut self) -> Result<()> {
        self.set_duty_cycle(0.0).await
    }

    /// Discover and configure the device
    async fn begin(&mut self) -> Result<()>;

    /// Stop accepting duty commands; the stored duty cycle is kept
    async fn end(&mut self);
}

/// Retry policy used while looking for a module on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryPolicy {
    /// Probes per address
    pub attempts: u32,
    /// Pause between two failed probes of the same address
    pub delay: Duration,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(10),
        }
    }
}

impl From<&BusConfig> for DiscoveryPolicy {
    fn from(config: &BusConfig) -> Self {
        Self {
            attempts: config.discovery_attempts.max(1),
            delay: Duration::from_millis(config.discovery_delay_ms),
        }
    }
}

/// Voltage-output dimmer module on the shared bus
#[derive(Debug)]
pub struct BusDimmer {
    bus: SharedBus,
    sku: Option<DimmerSku>,
    channel: u8,
    /// Resolved bus address, 0 until discovered when not configured
    address: u8,
    output_range: OutputRange,
    duty_cycle: f32,
    duty_cycle_limit: f32,
    enabled: bool,
    policy: DiscoveryPolicy,
    logger: StructuredLogger,
}

impl BusDimmer {
    /// Create a disabled dimmer from its static configuration
    pub fn new(bus: SharedBus, config: &DimmerConfig) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("dimmer").with_field("channel", config.channel.to_string()),
        );
        Self {
            bus,
            sku: config.sku,
            channel: config.channel,
            address: config.address,
            output_range: config.output_range,
            duty_cycle: 0.0,
            duty_cycle_limit: config.duty_cycle_limit.clamp(0.0, 1.0),
            enabled: false,
            policy: DiscoveryPolicy::default(),
            logger,
        }
    }

    pub fn with_discovery_policy(mut self, policy: DiscoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register bit width, 0 when no SKU is configured
    pub fn resolution(&self) -> u8 {
        self.sku.map_or(0, DimmerSku::resolution)
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Bus address in use, `None` until discovery resolved one
    pub fn address(&self) -> Option<u8> {
        (self.address != 0).then_some(self.address)
    }

    /// Write the stored duty cycle to the module. Never retried here.
    pub async fn apply(&self) -> Result<()> {
        let resolution = self.resolution();
        if resolution == 0 {
            return Err(RouterError::config("Dimmer SKU not set"));
        }
        let value = encode_duty_register(self.duty_cycle, resolution);
        let (register, payload) = duty_payload(self.channel, value).ok_or_else(|| {
            RouterError::config(format!("Invalid dimmer channel: {}", self.channel))
        })?;
        self.bus
            .write_register(self.address, register, &payload)
            .await
    }

    async fn probe_with_retries(&self, address: u8) -> bool {
        for attempt in 1..=self.policy.attempts {
            match self.bus.probe(address).await {
                Ok(()) => return true,
                Err(e) => {
                    self.logger.warn(&format!(
                        "Dimmer @ 0x{:02x}: attempt {}/{} failed: {}",
                        address, attempt, self.policy.attempts, e
                    ));
                    if attempt < self.policy.attempts {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
            }
        }
        false
    }

    async fn discover(&mut self) -> Result<u8> {
        if self.address != 0 {
            let address = self.address;
            self.logger
                .info(&format!("Searching for dimmer @ 0x{:02x}...", address));
            if self.probe_with_retries(address).await {
                return Ok(address);
            }
            return Err(RouterError::discovery(format!(
                "No dimmer answered @ 0x{:02x}",
                address
            )));
        }

        self.logger.info(&format!(
            "Searching for dimmer @ 0x{:02x}-0x{:02x} (discovery)...",
            DISCOVERY_ADDRESSES.start(),
            DISCOVERY_ADDRESSES.end()
        ));
        for address in DISCOVERY_ADDRESSES {
            if self.probe_with_retries(address).await {
                self.address = address;
                return Ok(address);
            }
        }
        Err(RouterError::discovery(format!(
            "No dimmer answered @ 0x{:02x}-0x{:02x}",
            DISCOVERY_ADDRESSES.start(),
            DISCOVERY_ADDRESSES.end()
        )))
    }
}

#[async_trait]
impl Dimmer for BusDimmer {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn duty_cycle(&self) -> f32 {
        self.duty_cycle
    }

    fn duty_cycle_limit(&self) -> f32 {
        self.duty_cycle_limit
    }

    async fn set_duty_cycle(&mut self, duty_cycle: f32) -> Result<()> {
        self.duty_cycle = if duty_cycle.is_finite() {
            duty_cycle.clamp(0.0, self.duty_cycle_limit)
        } else {
            0.0
        };

        // Kept for the next begin() while disabled
        if !self.enabled {
            return Ok(());
        }

        if let Err(e) = self.apply().await {
            self.logger
                .error(&format!("Disable dimmer: failed to apply duty cycle: {}", e));
            self.enabled = false;
            return Err(e);
        }
        self.logger
            .trace(&format!("Dimmer duty cycle set to {:.4}", self.duty_cycle));
        Ok(())
    }

    async fn set_duty_cycle_limit(&mut self, limit: f32) -> Result<()> {
        self.duty_cycle_limit = if limit.is_finite() {
            limit.clamp(0.0, 1.0)
        } else {
            1.0
        };
        if self.duty_cycle > self.duty_cycle_limit {
            let duty = self.duty_cycle;
            return self.set_duty_cycle(duty).await;
        }
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        if self.enabled {
            return Ok(());
        }

        let Some(sku) = self.sku else {
            self.logger.error("Disable dimmer: SKU not set!");
            return Err(RouterError::config("Dimmer SKU not set"));
        };

        if sku.channels() == 1 && self.channel > 0 {
            self.logger.warn(&format!(
                "{:?} has only one channel: switching to channel 0",
                sku
            ));
            self.channel = 0;
        }

        let address = match self.discover().await {
            Ok(address) => address,
            Err(e) => {
                self.logger.error(&format!(
                    "Dimmer: cannot communicate with device: {}",
                    e
                ));
                return Err(e);
            }
        };
        self.logger.info(&format!(
            "Enable dimmer @ 0x{:02x} and channel {}",
            address, self.channel
        ));

        self.logger.info(&format!(
            "Set output range to {}",
            self.output_range.label()
        ));
        if let Err(e) = self
            .bus
            .write_register(
                address,
                REG_OUTPUT_RANGE,
                &[self.output_range.register_value()],
            )
            .await
        {
            self.logger
                .error(&format!("Disable dimmer: cannot set output range: {}", e));
            return Err(e);
        }

        self.enabled = true;

        // Restart with the last stored value
        let duty = self.duty_cycle;
        self.set_duty_cycle(duty).await
    }

    async fn end(&mut self) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        self.logger.info("Disable dimmer");
    }
}
