//! Bypass control and the automatic bypass scheduler

use super::OutputController;
use crate::clock::{TimeRange, time_in_range, weekday_token};
use chrono::Datelike;

impl OutputController {
    /// Manual bypass request. Returns the resulting bypass flag.
    ///
    /// Turning bypass off is refused while automatic bypass runs: the
    /// scheduler owns it until one of its stop conditions hits.
    pub async fn set_bypass(&mut self, on: bool) -> bool {
        if self.auto_bypass_enabled && !on {
            self.logger.warn(&format!(
                "Auto Bypass '{}' is activated: unable to turn off bypass",
                self.name
            ));
            return self.bypass_enabled;
        }
        self.activate_bypass(on).await;
        self.bypass_enabled
    }

    /// Drive relay or dimmer into (or out of) full power
    pub(super) async fn activate_bypass(&mut self, on: bool) {
        if on {
            if self.relay.is_enabled() {
                // The relay carries the load alone
                self.set_dimmer_off().await;
                if self.relay.is_off() {
                    self.logger
                        .debug(&format!("Turning Bypass Relay '{}' ON", self.name));
                    self.relay.set_state(true);
                }
                self.bypass_enabled = true;
            } else if self.dimmer.is_enabled() {
                self.logger
                    .debug(&format!("Turning Dimmer '{}' ON", self.name));
                match self.dimmer.on().await {
                    Ok(()) => self.bypass_enabled = true,
                    Err(e) => {
                        self.logger.error(&format!(
                            "Dimmer '{}': unable to activate bypass: {}",
                            self.name, e
                        ));
                        self.bypass_enabled = false;
                    }
                }
            } else {
                self.logger.warn(&format!(
                    "Dimmer '{}' is not connected to the grid: unable to activate bypass",
                    self.name
                ));
                self.bypass_enabled = false;
            }
        } else {
            if self.relay.is_enabled() {
                if self.relay.is_on() {
                    self.logger
                        .debug(&format!("Turning Bypass Relay '{}' OFF", self.name));
                    self.relay.set_state(false);
                }
            } else {
                self.logger
                    .debug(&format!("Turning Dimmer '{}' OFF", self.name));
                self.set_dimmer_off().await;
            }
            self.bypass_enabled = false;
        }
    }

    /// Stop automatic bypass if it runs, reporting `reason`
    async fn stop_auto_bypass(&mut self, reason: &str) {
        if !self.auto_bypass_enabled {
            return;
        }
        self.logger.info(&format!(
            "{}: stopping Auto Bypass '{}'",
            reason, self.name
        ));
        self.auto_bypass_enabled = false;
        self.activate_bypass(false).await;
    }

    /// One evaluation of the automatic bypass schedule
    ///
    /// Checks run in a fixed order and the first failing one wins. A failing
    /// check stops a running automatic bypass and does nothing otherwise.
    pub async fn apply_auto_bypass(&mut self) {
        if !self.config.auto_bypass {
            self.stop_auto_bypass("Auto Bypass disabled").await;
            return;
        }

        if !self.relay.is_enabled() && !self.dimmer.is_enabled() {
            self.stop_auto_bypass("Relay and dimmer disabled").await;
            return;
        }

        if !self.clock.is_synced() {
            self.stop_auto_bypass("Time not synchronized").await;
            return;
        }

        let Some(now) = self.clock.local_time() else {
            self.stop_auto_bypass("Unable to get time").await;
            return;
        };

        if !self.temperature.never_updated() {
            let Some(temperature) = self.temperature.get() else {
                self.stop_auto_bypass("Invalid temperature sensor value").await;
                return;
            };

            if temperature >= f32::from(self.config.auto_stop_temperature) {
                self.stop_auto_bypass(&format!("Temperature reached {:.2} °C", temperature))
                    .await;
                return;
            }

            if temperature >= f32::from(self.config.auto_start_temperature) {
                // Warm enough, nothing to start
                return;
            }
        }

        match time_in_range(
            now.time(),
            &self.config.auto_start_time,
            &self.config.auto_stop_time,
        ) {
            TimeRange::Invalid => {
                let reason = format!(
                    "Time range {} to {} is invalid",
                    self.config.auto_start_time, self.config.auto_stop_time
                );
                self.stop_auto_bypass(&reason).await;
                return;
            }
            TimeRange::Outside => {
                let reason = format!("Time reached {}", self.config.auto_stop_time);
                self.stop_auto_bypass(&reason).await;
                return;
            }
            TimeRange::Inside => {}
        }

        if !self.auto_bypass_enabled {
            if !self.relay.is_enabled() && !self.dimmer.is_enabled() {
                return;
            }
            let weekday = weekday_token(now.weekday());
            if self.config.is_active_on(weekday) {
                self.logger.info(&format!(
                    "Time within {}-{} on {}: starting Auto Bypass '{}' at {:.2} °C",
                    self.config.auto_start_time,
                    self.config.auto_stop_time,
                    weekday,
                    self.name,
                    self.temperature.or(0.0)
                ));
                self.activate_bypass(true).await;
                self.auto_bypass_enabled = self.bypass_enabled;
            }
            return;
        }

        // Running: restore bypass if something switched it off behind our back
        if self.relay.is_on() {
            return;
        }
        if !self.relay.is_enabled() && self.dimmer.is_on_at_full_power() {
            return;
        }
        self.logger.info(&format!(
            "Auto Bypass '{}' is activated: restarting bypass",
            self.name
        ));
        self.activate_bypass(true).await;
    }
}
