use anyhow::Result;
use serde::Deserialize;
use solarouter::bus::{DetachedBus, SharedBus};
use solarouter::clock::{SystemClock, TimeSource};
use solarouter::config::Config;
use solarouter::dimmer::DiscoveryPolicy;
use solarouter::meter::{MeterData, SharedMeter};
use solarouter::relay::LatchRelay;
use solarouter::router::{Router, RouterCommand, RouterSnapshot, build_output};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Meter sample pushed on the console for one output
#[derive(Debug, Deserialize)]
struct MeterUpdate {
    output: String,
    /// `null` marks the meter as disconnected
    #[serde(default)]
    data: Option<MeterData>,
}

#[cfg(feature = "linux-i2c")]
fn open_bus(config: &Config) -> SharedBus {
    match solarouter::bus::LinuxI2cBus::open(&config.bus.device) {
        Ok(bus) => SharedBus::new(bus),
        Err(e) => {
            warn!("{}: dimmers stay disabled", e);
            SharedBus::new(DetachedBus)
        }
    }
}

#[cfg(not(feature = "linux-i2c"))]
fn open_bus(config: &Config) -> SharedBus {
    warn!(
        "Built without I2C support: ignoring {}, dimmers stay disabled",
        config.bus.device
    );
    SharedBus::new(DetachedBus)
}

/// Forward JSON lines from stdin: meter samples locally, the rest to the router
async fn read_console(
    commands: mpsc::UnboundedSender<RouterCommand>,
    meters: HashMap<String, Arc<SharedMeter>>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!("Ignoring malformed console line: {}", e);
                continue;
            }
        };

        if value.get("command").and_then(|c| c.as_str()) == Some("update_meter") {
            match serde_json::from_value::<MeterUpdate>(value) {
                Ok(update) => match meters.get(&update.output) {
                    Some(meter) => match update.data {
                        Some(data) => meter.update(data),
                        None => meter.disconnect(),
                    },
                    None => warn!("Unknown output: {}", update.output),
                },
                Err(e) => warn!("Invalid meter update: {}", e),
            }
            continue;
        }

        match serde_json::from_value::<RouterCommand>(value) {
            Ok(cmd) => {
                if commands.send(cmd).is_err() {
                    break;
                }
            }
            Err(e) => warn!("Invalid command: {}", e),
        }
    }
}

/// Print every published snapshot as one JSON line on stdout
async fn print_snapshots(mut snapshots: watch::Receiver<Arc<RouterSnapshot>>) {
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        match serde_json::to_string(&*snapshot) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize snapshot: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    config.validate()?;

    solarouter::logging::init_logging(&config.logging)?;
    info!("Solarouter {} starting up", env!("APP_VERSION"));

    let bus = open_bus(&config);
    let clock: Arc<dyn TimeSource> = Arc::new(SystemClock::from_name(&config.timezone)?);
    let policy = DiscoveryPolicy::from(&config.bus);

    let mut meters = HashMap::new();
    let mut outputs = Vec::with_capacity(config.outputs.len());
    for output in &config.outputs {
        let relay = Arc::new(LatchRelay::new(output.relay.enabled));
        let mut relay_state = relay.subscribe();
        let name = output.name.clone();
        tokio::spawn(async move {
            while relay_state.changed().await.is_ok() {
                let on = *relay_state.borrow_and_update();
                info!("Relay '{}' switched {}", name, if on { "ON" } else { "OFF" });
            }
        });

        let meter = Arc::new(SharedMeter::new());
        meters.insert(output.name.clone(), meter.clone());

        outputs.push(build_output(
            output,
            &bus,
            policy,
            relay,
            meter,
            clock.clone(),
            config.temperature_expiration_secs,
        ));
    }

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<RouterCommand>();
    let mut router = Router::new(config, outputs, cmd_rx);

    let printer = tokio::spawn(print_snapshots(router.subscribe_snapshot()));
    let console = tokio::spawn(read_console(cmd_tx, meters));

    let shutdown = router.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.send(()).ok();
        }
    });

    let result = router.run().await;
    console.abort();
    printer.abort();

    match result {
        Ok(()) => {
            info!("Router shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Router failed with error: {}", e);
            Err(anyhow::anyhow!("Router error: {}", e))
        }
    }
}
