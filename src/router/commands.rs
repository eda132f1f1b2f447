use super::{Router, RouterCommand};
use crate::output::OutputController;

impl Router {
    /// Apply one external command
    pub async fn handle_command(&mut self, cmd: RouterCommand) {
        match cmd {
            RouterCommand::SetDutyCycle { output, duty_cycle } => {
                if let Some(out) = self.output_mut(&output) {
                    out.set_dimmer_duty_cycle(duty_cycle).await;
                }
            }
            RouterCommand::SetDutyCycleLimit { output, limit } => {
                let result = match self.output_mut(&output) {
                    Some(out) => out.set_dimmer_duty_cycle_limit(limit).await,
                    None => return,
                };
                if let Err(e) = result {
                    self.logger.error(&format!(
                        "Failed to set duty cycle limit of '{}': {}",
                        output, e
                    ));
                }
            }
            RouterCommand::SetBypass { output, on } => {
                if let Some(out) = self.output_mut(&output) {
                    out.set_bypass(on).await;
                }
            }
            RouterCommand::UpdateGrid { voltage, power } => {
                if let Some(v) = voltage {
                    self.grid_voltage.update(v);
                }
                if let Some(p) = power {
                    self.grid_power.update(p);
                }
            }
            RouterCommand::UpdateTemperature {
                output,
                temperature,
            } => {
                if let Some(out) = self.output_mut(&output) {
                    out.update_temperature(temperature);
                }
            }
            RouterCommand::Rediscover { output } => self.rediscover(output.as_deref()).await,
            RouterCommand::Shutdown => {
                self.shutdown_tx.send(()).ok();
            }
        }
    }

    fn output_mut(&mut self, name: &str) -> Option<&mut OutputController> {
        let found = self.outputs.iter_mut().find(|o| o.name() == name);
        if found.is_none() {
            self.logger.warn(&format!("Unknown output: {}", name));
        }
        found
    }

    /// Restart discovery, outside the tick path
    async fn rediscover(&mut self, name: Option<&str>) {
        for out in self.outputs.iter_mut() {
            if name.is_some_and(|n| n != out.name()) {
                continue;
            }
            out.end_dimmer().await;
            if let Err(e) = out.begin_dimmer().await {
                self.logger
                    .warn(&format!("Dimmer of '{}' unavailable: {}", out.name(), e));
            }
        }
    }
}
