//! Energy meter readout
//!
//! The meter driver itself is external. Readings reach the router as
//! [`MeterData`] snapshots and the controller only consumes them through
//! the [`Meter`] capability.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// One measurement sample of the routed output
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterData {
    /// Grid voltage (V)
    pub voltage: f32,
    /// Load current (A)
    pub current: f32,
    /// Active power (W)
    pub active_power: f32,
    /// Apparent power (VA)
    pub apparent_power: f32,
    pub power_factor: f32,
    /// Accumulated active energy (kWh)
    pub active_energy: f32,
}

impl MeterData {
    /// Load resistance seen by the meter, P / I²
    pub fn resistance(&self) -> f32 {
        if self.current == 0.0 {
            0.0
        } else {
            self.active_power / (self.current * self.current)
        }
    }

    /// RMS voltage across the load, P / I
    pub fn dimmed_voltage(&self) -> f32 {
        if self.current == 0.0 {
            0.0
        } else {
            self.active_power / self.current
        }
    }

    /// Current harmonic distortion of a phase-cut resistive load
    pub fn thdi(&self) -> f32 {
        if self.power_factor <= 0.0 {
            0.0
        } else {
            (1.0 / (self.power_factor * self.power_factor) - 1.0)
                .max(0.0)
                .sqrt()
        }
    }
}

/// Measurement source of one output
pub trait Meter: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Latest sample, `None` while disconnected
    fn data(&self) -> Option<MeterData>;
}

/// Meter fed from outside (command stream, MQTT bridge...)
#[derive(Debug, Default)]
pub struct SharedMeter {
    latest: RwLock<Option<MeterData>>,
}

impl SharedMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, data: MeterData) {
        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(data);
        }
    }

    pub fn disconnect(&self) {
        if let Ok(mut latest) = self.latest.write() {
            *latest = None;
        }
    }
}

impl Meter for SharedMeter {
    fn is_connected(&self) -> bool {
        self.data().is_some()
    }

    fn data(&self) -> Option<MeterData> {
        self.latest.read().ok().and_then(|latest| *latest)
    }
}
