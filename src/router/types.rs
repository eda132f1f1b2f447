use crate::output::OutputSnapshot;
use serde::{Deserialize, Serialize};

/// Router lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RouterState {
    /// Discovering dimmers
    Initializing,
    Running,
    ShuttingDown,
}

/// Commands accepted by the router from external components (console, bridges)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RouterCommand {
    /// Manual dimmer level of one output
    SetDutyCycle { output: String, duty_cycle: f32 },
    /// Dimmer ceiling of one output
    SetDutyCycleLimit { output: String, limit: f32 },
    /// Manual bypass of one output
    SetBypass { output: String, on: bool },
    /// Grid measurement; power is positive when importing
    UpdateGrid {
        #[serde(default)]
        voltage: Option<f32>,
        #[serde(default)]
        power: Option<f32>,
    },
    /// Load temperature; `null` reports an invalid sensor reading
    UpdateTemperature {
        output: String,
        #[serde(default)]
        temperature: Option<f32>,
    },
    /// Re-run dimmer discovery, for one output or all of them
    Rediscover {
        #[serde(default)]
        output: Option<String>,
    },
    Shutdown,
}

/// State published after every tick
#[derive(Debug, Clone, Serialize)]
pub struct RouterSnapshot {
    pub timestamp: String,
    pub state: RouterState,
    /// Grid voltage used for this tick (measured or nominal)
    pub grid_voltage: f32,
    /// Latest fresh grid power, if any
    pub grid_power: Option<f32>,
    /// Total power sent to routing outputs
    pub routed_power: f32,
    pub total_ticks: u64,
    pub overrun_count: u64,
    pub outputs: Vec<OutputSnapshot>,
}
