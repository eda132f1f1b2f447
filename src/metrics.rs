//! Electrical metrics of a router output
//!
//! Two views are produced: closed-form values derived from the duty cycle
//! and the calibrated load resistance, and the live meter readings, which
//! are only meaningful while the output is routing.

use crate::meter::MeterData;
use serde::Serialize;

/// Electrical quantities of one output
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub apparent_power: f32,
    pub current: f32,
    #[serde(rename = "voltage_dimmed")]
    pub dimmed_voltage: f32,
    pub energy: f32,
    pub power: f32,
    pub power_factor: f32,
    pub resistance: f32,
    pub thdi: f32,
    pub voltage: f32,
}

/// Metrics of a phase-cut resistive load at `duty_cycle`
///
/// `energy` is left at 0; it only comes from a meter.
pub fn theoretical_metrics(duty_cycle: f32, resistance: f32, grid_voltage: f32) -> Metrics {
    let duty_cycle = duty_cycle.clamp(0.0, 1.0);
    let voltage = grid_voltage;
    let max_power = if resistance == 0.0 {
        0.0
    } else {
        voltage * voltage / resistance
    };
    let power_factor = duty_cycle.sqrt();
    let dimmed_voltage = power_factor * voltage;
    let current = if resistance == 0.0 {
        0.0
    } else {
        dimmed_voltage / resistance
    };

    Metrics {
        apparent_power: current * voltage,
        current,
        dimmed_voltage,
        energy: 0.0,
        power: duty_cycle * max_power,
        power_factor,
        resistance,
        thdi: if duty_cycle == 0.0 {
            0.0
        } else {
            (1.0 / duty_cycle - 1.0).sqrt()
        },
        voltage,
    }
}

/// Meter readings, zeroed except voltage and energy unless `routing`
pub fn live_measurements(data: &MeterData, routing: bool) -> Metrics {
    let mut metrics = Metrics {
        apparent_power: 0.0,
        current: 0.0,
        dimmed_voltage: 0.0,
        energy: data.active_energy,
        power: 0.0,
        power_factor: 0.0,
        resistance: 0.0,
        thdi: 0.0,
        voltage: data.voltage,
    };

    if routing {
        metrics.apparent_power = data.apparent_power.abs();
        metrics.current = data.current.abs();
        metrics.dimmed_voltage = data.dimmed_voltage().abs();
        metrics.power = data.active_power.abs();
        metrics.power_factor = data.power_factor.abs();
        metrics.resistance = data.resistance().abs();
        metrics.thdi = data.thdi().abs();
    }

    metrics
}
