//! Router composition root
//!
//! The [`Router`] owns every [`OutputController`] and is their single
//! writer: periodic evaluation and external commands are both handled by
//! its loop, so bypass changes never interleave with a scheduler stop.
//! Dimmer discovery runs at startup and on explicit request only.

use crate::bus::SharedBus;
use crate::clock::TimeSource;
use crate::config::{Config, OutputConfig};
use crate::dimmer::{BusDimmer, DiscoveryPolicy};
use crate::error::Result;
use crate::expiring::ExpiringValue;
use crate::logging::{StructuredLogger, get_logger};
use crate::meter::Meter;
use crate::output::{OutputController, OutputState};
use crate::relay::Relay;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, interval};

mod commands;
mod types;

pub use types::{RouterCommand, RouterSnapshot, RouterState};

/// Build one output controller around a bus dimmer
pub fn build_output(
    config: &OutputConfig,
    bus: &SharedBus,
    policy: DiscoveryPolicy,
    relay: Arc<dyn Relay>,
    meter: Arc<dyn Meter>,
    clock: Arc<dyn TimeSource>,
    temperature_expiration_secs: u64,
) -> OutputController {
    let dimmer = BusDimmer::new(bus.clone(), &config.dimmer).with_discovery_policy(policy);
    OutputController::new(
        &config.name,
        config.control.clone(),
        Box::new(dimmer),
        relay,
        meter,
        clock,
    )
    .with_temperature_expiration(temperature_expiration_secs)
}

/// Periodic evaluator of all router outputs
pub struct Router {
    config: Config,
    outputs: Vec<OutputController>,
    grid_voltage: ExpiringValue<f32>,
    grid_power: ExpiringValue<f32>,
    logger: StructuredLogger,
    state: watch::Sender<RouterState>,
    commands_rx: mpsc::UnboundedReceiver<RouterCommand>,
    shutdown_tx: mpsc::UnboundedSender<()>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,
    snapshot_tx: watch::Sender<Arc<RouterSnapshot>>,
    total_ticks: u64,
    overrun_count: u64,
}

impl Router {
    pub fn new(
        config: Config,
        outputs: Vec<OutputController>,
        commands_rx: mpsc::UnboundedReceiver<RouterCommand>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(RouterState::Initializing);
        let initial = Arc::new(RouterSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            state: RouterState::Initializing,
            grid_voltage: config.nominal_grid_voltage,
            grid_power: None,
            routed_power: 0.0,
            total_ticks: 0,
            overrun_count: 0,
            outputs: Vec::new(),
        });
        let (snapshot_tx, _) = watch::channel(initial);

        Self {
            grid_voltage: ExpiringValue::with_expiration_secs(config.grid_expiration_secs),
            grid_power: ExpiringValue::with_expiration_secs(config.grid_expiration_secs),
            config,
            outputs,
            logger: get_logger("router"),
            state,
            commands_rx,
            shutdown_tx,
            shutdown_rx,
            snapshot_tx,
            total_ticks: 0,
            overrun_count: 0,
        }
    }

    pub fn outputs(&self) -> &[OutputController] {
        &self.outputs
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<RouterSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RouterState> {
        self.state.subscribe()
    }

    /// Sender that stops [`Router::run`]
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    /// Grid voltage for this tick: measured when fresh, nominal otherwise
    pub fn grid_voltage(&self) -> f32 {
        self.grid_voltage.or(self.config.nominal_grid_voltage)
    }

    /// Discover and enable every dimmer. Failures leave that dimmer disabled.
    pub async fn start(&mut self) {
        for out in self.outputs.iter_mut() {
            match out.begin_dimmer().await {
                Ok(()) => self
                    .logger
                    .info(&format!("Output '{}' dimmer ready", out.name())),
                Err(e) => self
                    .logger
                    .warn(&format!("Output '{}' dimmer unavailable: {}", out.name(), e)),
            }
        }
        self.state.send_replace(RouterState::Running);
    }

    /// Run the control loop until shutdown
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting router main loop");
        self.start().await;

        let period = Duration::from_millis(self.config.tick_interval_ms.max(1));
        let mut tick_interval = interval(period);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let started = std::time::Instant::now();
                    self.tick().await;
                    if started.elapsed() > period {
                        self.overrun_count = self.overrun_count.saturating_add(1);
                    }
                }
                Some(cmd) = self.commands_rx.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.state.send_replace(RouterState::ShuttingDown);
        self.shutdown().await;
        Ok(())
    }

    /// One evaluation pass over every output
    pub async fn tick(&mut self) {
        for out in self.outputs.iter_mut() {
            out.apply_temperature_limit().await;
            out.apply_auto_bypass().await;
        }

        let grid_voltage = self.grid_voltage();
        let mut available = match self.grid_power.get() {
            Some(grid_power) => self.diverted_power(grid_voltage) - grid_power,
            None => 0.0,
        };

        for out in self.outputs.iter_mut() {
            if !out.is_auto_dimmer_enabled() {
                continue;
            }
            let used = out.auto_divert(grid_voltage, available).await;
            available -= used;
        }

        self.total_ticks = self.total_ticks.saturating_add(1);
        self.publish_snapshot();
    }

    /// Power currently sent to routing outputs
    pub fn routed_power(&self, grid_voltage: f32) -> f32 {
        self.outputs
            .iter()
            .filter(|o| o.state() == OutputState::Routing)
            .map(|o| o.routed_power(grid_voltage))
            .sum()
    }

    /// Power currently sent by routing auto dimmer outputs
    fn diverted_power(&self, grid_voltage: f32) -> f32 {
        self.outputs
            .iter()
            .filter(|o| o.is_auto_dimmer_enabled() && o.state() == OutputState::Routing)
            .map(|o| o.routed_power(grid_voltage))
            .sum()
    }

    pub fn snapshot(&self) -> RouterSnapshot {
        let grid_voltage = self.grid_voltage();
        RouterSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            state: self.state.borrow().clone(),
            grid_voltage,
            grid_power: self.grid_power.get(),
            routed_power: self.routed_power(grid_voltage),
            total_ticks: self.total_ticks,
            overrun_count: self.overrun_count,
            outputs: self
                .outputs
                .iter()
                .map(|o| o.snapshot(grid_voltage))
                .collect(),
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(Arc::new(self.snapshot()));
    }

    /// Leave every load unpowered and release the dimmers
    async fn shutdown(&mut self) {
        for out in self.outputs.iter_mut() {
            out.shutdown().await;
        }
        self.publish_snapshot();
        self.logger.info("Router stopped");
    }
}
