//! # Solarouter - solar surplus router for resistive loads
//!
//! Diverts surplus locally generated power into resistive loads (water
//! heaters and the like) by modulating bus-driven analog dimmers, with a
//! relay-based full-power bypass driven manually or by a time and
//! temperature schedule.
//!
//! ## Architecture
//!
//! - `bus`: shared, serialized I2C bus access
//! - `dimmer`: dimmer capability and the bus dimmer driver (discovery, register encoding)
//! - `relay`: bypass relay capability
//! - `meter`: energy meter readout
//! - `clock`: time source and time-of-day windows
//! - `expiring`: freshness-tagged readings
//! - `metrics`: theoretical and measured electrical metrics
//! - `output`: per-output controller (state, routing, bypass scheduler)
//! - `router`: composition root running the control loop
//! - `config`: configuration management and validation
//! - `logging`: structured logging and tracing

pub mod bus;
pub mod clock;
pub mod config;
pub mod dimmer;
pub mod error;
pub mod expiring;
pub mod logging;
pub mod meter;
pub mod metrics;
pub mod output;
pub mod relay;
pub mod router;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, RouterError};
pub use output::{OutputController, OutputState};
pub use router::{Router, RouterCommand};

#[cfg(test)]
mod config_tests;
