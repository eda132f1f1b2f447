use super::*;
use crate::clock::ManualClock;
use crate::error::RouterError;
use crate::meter::{MeterData, SharedMeter};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

type Events = Arc<Mutex<Vec<String>>>;

struct MockDimmer {
    enabled: bool,
    duty: f32,
    limit: f32,
    fail_writes: bool,
    events: Events,
}

#[async_trait]
impl Dimmer for MockDimmer {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn duty_cycle(&self) -> f32 {
        self.duty
    }

    fn duty_cycle_limit(&self) -> f32 {
        self.limit
    }

    async fn set_duty_cycle(&mut self, duty_cycle: f32) -> Result<()> {
        self.duty = duty_cycle.clamp(0.0, self.limit);
        if !self.enabled {
            return Ok(());
        }
        if self.fail_writes {
            self.enabled = false;
            return Err(RouterError::bus("nack"));
        }
        self.events
            .lock()
            .unwrap()
            .push(format!("dimmer:{:.2}", self.duty));
        Ok(())
    }

    async fn set_duty_cycle_limit(&mut self, limit: f32) -> Result<()> {
        self.limit = limit;
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        self.enabled = true;
        Ok(())
    }

    async fn end(&mut self) {
        self.enabled = false;
    }
}

struct MockRelay {
    enabled: bool,
    on: AtomicBool,
    events: Events,
}

impl Relay for MockRelay {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    fn set_state(&self, on: bool) {
        if !self.enabled {
            return;
        }
        self.on.store(on, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(if on { "relay:on" } else { "relay:off" }.to_string());
    }
}

struct Harness {
    output: OutputController,
    events: Events,
    relay: Arc<MockRelay>,
    meter: Arc<SharedMeter>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

/// Sunday 2024-06-02 at `h:m`
fn sunday(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 2)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn harness(dimmer_enabled: bool, relay_enabled: bool, config: ControlConfig) -> Harness {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let dimmer = MockDimmer {
        enabled: dimmer_enabled,
        duty: 0.0,
        limit: 1.0,
        fail_writes: false,
        events: events.clone(),
    };
    let relay = Arc::new(MockRelay {
        enabled: relay_enabled,
        on: AtomicBool::new(false),
        events: events.clone(),
    });
    let meter = Arc::new(SharedMeter::new());
    let clock = Arc::new(ManualClock::at(sunday(23, 15)));
    let output = OutputController::new(
        "output1",
        config,
        Box::new(dimmer),
        relay.clone(),
        meter.clone(),
        clock.clone(),
    );
    Harness {
        output,
        events,
        relay,
        meter,
        clock,
    }
}

fn auto_dimmer_config(resistance: f32, ratio: f32) -> ControlConfig {
    ControlConfig {
        auto_dimmer: true,
        calibrated_resistance: resistance,
        reserved_excess_power_ratio: ratio,
        ..Default::default()
    }
}

fn auto_bypass_config() -> ControlConfig {
    ControlConfig {
        auto_bypass: true,
        ..Default::default()
    }
}

// state

#[test]
fn disabled_wins_over_every_flag() {
    let mut h = harness(false, false, ControlConfig::default());
    h.output.bypass_enabled = true;
    h.output.auto_bypass_enabled = true;
    assert_eq!(h.output.state(), OutputState::Disabled);
}

#[tokio::test]
async fn state_priority() {
    let mut h = harness(true, true, ControlConfig::default());
    assert_eq!(h.output.state(), OutputState::Idle);

    assert!(h.output.set_dimmer_duty_cycle(0.4).await);
    assert_eq!(h.output.state(), OutputState::Routing);

    h.output.bypass_enabled = true;
    assert_eq!(h.output.state(), OutputState::BypassManual);

    h.output.auto_bypass_enabled = true;
    assert_eq!(h.output.state(), OutputState::BypassAuto);
    assert_eq!(h.output.state().as_str(), "BYPASS_AUTO");
}

#[test]
fn relay_alone_keeps_output_usable() {
    let h = harness(false, true, ControlConfig::default());
    assert_eq!(h.output.state(), OutputState::Idle);
}

// manual duty cycle

#[tokio::test]
async fn manual_duty_guards() {
    let mut h = harness(false, true, ControlConfig::default());
    assert!(!h.output.set_dimmer_duty_cycle(0.5).await);

    let mut h = harness(true, true, auto_dimmer_config(50.0, 1.0));
    assert!(!h.output.set_dimmer_duty_cycle(0.5).await);
    assert_eq!(h.output.dimmer_duty_cycle(), 0.0);

    let mut h = harness(true, true, ControlConfig::default());
    h.output.auto_bypass_enabled = true;
    assert!(!h.output.set_dimmer_duty_cycle(0.5).await);
}

#[tokio::test]
async fn manual_duty_refused_over_temperature_limit() {
    let mut h = harness(
        true,
        true,
        ControlConfig {
            dimmer_temp_limit: 60,
            ..Default::default()
        },
    );
    h.output.update_temperature(Some(65.0));
    assert!(h.output.is_dimmer_temperature_limit_reached());
    assert!(!h.output.set_dimmer_duty_cycle(0.5).await);
    // Turning off is always allowed
    assert!(h.output.set_dimmer_duty_cycle(0.0).await);
}

#[tokio::test]
async fn manual_duty_turns_manual_bypass_off() {
    let mut h = harness(true, true, ControlConfig::default());
    assert!(h.output.set_bypass(true).await);
    assert!(h.relay.is_on());

    assert!(h.output.set_dimmer_duty_cycle(0.3).await);
    assert!(!h.output.is_bypass_on());
    assert!(h.relay.is_off());
    assert_eq!(h.output.state(), OutputState::Routing);
}

// temperature limit

#[tokio::test]
async fn temperature_limit_cuts_routing() {
    let mut h = harness(
        true,
        false,
        ControlConfig {
            dimmer_temp_limit: 60,
            ..Default::default()
        },
    );
    assert!(h.output.set_dimmer_duty_cycle(0.5).await);

    h.output.update_temperature(Some(59.0));
    h.output.apply_temperature_limit().await;
    assert_eq!(h.output.dimmer_duty_cycle(), 0.5);

    h.output.update_temperature(Some(60.0));
    h.output.apply_temperature_limit().await;
    assert_eq!(h.output.dimmer_duty_cycle(), 0.0);
}

#[tokio::test]
async fn missing_temperature_never_limits() {
    let mut h = harness(
        true,
        false,
        ControlConfig {
            dimmer_temp_limit: 60,
            ..Default::default()
        },
    );
    assert!(h.output.set_dimmer_duty_cycle(0.5).await);
    h.output.apply_temperature_limit().await;
    assert_eq!(h.output.dimmer_duty_cycle(), 0.5);

    h.output.update_temperature(None);
    h.output.apply_temperature_limit().await;
    assert_eq!(h.output.dimmer_duty_cycle(), 0.5);
}

#[tokio::test]
async fn temperature_limit_ignored_during_bypass() {
    let mut h = harness(
        true,
        false,
        ControlConfig {
            dimmer_temp_limit: 60,
            ..Default::default()
        },
    );
    assert!(h.output.set_bypass(true).await);
    h.output.update_temperature(Some(80.0));
    h.output.apply_temperature_limit().await;
    assert_eq!(h.output.dimmer_duty_cycle(), 1.0);
}

// auto divert

#[tokio::test]
async fn auto_divert_without_resistance_routes_nothing() {
    let mut h = harness(true, false, auto_dimmer_config(0.0, 1.0));
    assert_eq!(h.output.auto_divert(230.0, 1000.0).await, 0.0);
    assert_eq!(h.output.dimmer_duty_cycle(), 0.0);
}

#[tokio::test]
async fn auto_divert_applies_reserved_ratio() {
    // 230² / 52.9 = 1000 W
    let mut h = harness(true, false, auto_dimmer_config(52.9, 0.5));
    let used = h.output.auto_divert(230.0, 2000.0).await;
    assert!((h.output.dimmer_duty_cycle() - 1.0).abs() < 1e-4);
    assert!((used - 1000.0).abs() < 0.5);

    let used = h.output.auto_divert(230.0, 500.0).await;
    assert!((h.output.dimmer_duty_cycle() - 0.25).abs() < 1e-4);
    assert!((used - 250.0).abs() < 0.5);
}

#[tokio::test]
async fn auto_divert_reports_accepted_power() {
    let mut h = harness(true, false, auto_dimmer_config(52.9, 1.0));
    h.output.set_dimmer_duty_cycle_limit(0.5).await.unwrap();
    let used = h.output.auto_divert(230.0, 900.0).await;
    assert!((used - 500.0).abs() < 0.5);
}

#[tokio::test]
async fn auto_divert_reports_nothing_when_write_fails() {
    let mut h = harness(true, false, auto_dimmer_config(52.9, 1.0));
    h.output.dimmer = Box::new(MockDimmer {
        enabled: true,
        duty: 0.0,
        limit: 1.0,
        fail_writes: true,
        events: h.events.clone(),
    });
    let used = h.output.auto_divert(230.0, 500.0).await;
    assert_eq!(used, 0.0);
    assert!(!h.output.is_dimmer_enabled());
    assert_eq!(h.output.state(), OutputState::Disabled);
}

#[tokio::test]
async fn auto_divert_ignores_negative_excess() {
    let mut h = harness(true, false, auto_dimmer_config(52.9, 1.0));
    assert_eq!(h.output.auto_divert(230.0, -300.0).await, 0.0);
}

#[tokio::test]
async fn auto_divert_stops_at_temperature_limit() {
    let mut config = auto_dimmer_config(52.9, 1.0);
    config.dimmer_temp_limit = 60;
    let mut h = harness(true, false, config);
    assert!(h.output.auto_divert(230.0, 500.0).await > 0.0);

    h.output.update_temperature(Some(61.0));
    assert_eq!(h.output.auto_divert(230.0, 500.0).await, 0.0);
    assert_eq!(h.output.dimmer_duty_cycle(), 0.0);
}

// bypass

#[tokio::test]
async fn bypass_turns_dimmer_off_before_relay_on() {
    let mut h = harness(true, true, ControlConfig::default());
    assert!(h.output.set_dimmer_duty_cycle(0.3).await);
    assert!(h.output.set_bypass(true).await);

    let events = h.events();
    let off = events.iter().rposition(|e| e == "dimmer:0.00").unwrap();
    let on = events.iter().position(|e| e == "relay:on").unwrap();
    assert!(off < on);
    assert_eq!(h.output.dimmer_duty_cycle(), 0.0);
}

#[tokio::test]
async fn bypass_falls_back_to_dimmer() {
    let mut h = harness(true, false, ControlConfig::default());
    assert!(h.output.set_bypass(true).await);
    assert_eq!(h.output.dimmer_duty_cycle(), 1.0);
    assert_eq!(h.output.state(), OutputState::BypassManual);

    assert!(!h.output.set_bypass(false).await);
    assert_eq!(h.output.dimmer_duty_cycle(), 0.0);
}

#[tokio::test]
async fn bypass_without_any_device_fails() {
    let mut h = harness(false, false, ControlConfig::default());
    assert!(!h.output.set_bypass(true).await);
    assert!(!h.output.is_bypass_on());
}

#[tokio::test]
async fn bypass_fallback_failure_is_reported() {
    let mut h = harness(true, false, ControlConfig::default());
    // Swap in a dimmer whose writes fail
    h.output.dimmer = Box::new(MockDimmer {
        enabled: true,
        duty: 0.0,
        limit: 1.0,
        fail_writes: true,
        events: h.events.clone(),
    });
    assert!(!h.output.set_bypass(true).await);
    assert!(!h.output.is_dimmer_enabled());
}

#[tokio::test]
async fn manual_bypass_off_refused_during_auto_bypass() {
    let mut h = harness(true, true, auto_bypass_config());
    h.output.apply_auto_bypass().await;
    assert!(h.output.is_auto_bypass_active());

    assert!(h.output.set_bypass(false).await);
    assert!(h.relay.is_on());
}

// automatic bypass

#[tokio::test]
async fn auto_bypass_starts_inside_window() {
    let mut h = harness(true, true, auto_bypass_config());
    h.output.apply_auto_bypass().await;
    assert!(h.output.is_auto_bypass_active());
    assert!(h.output.is_bypass_on());
    assert_eq!(h.output.state(), OutputState::BypassAuto);
}

#[tokio::test]
async fn auto_bypass_respects_week_days() {
    let mut config = auto_bypass_config();
    config.week_days = "mon,tue,wed,thu,fri".to_string();
    let mut h = harness(true, true, config);
    h.output.apply_auto_bypass().await;
    assert!(!h.output.is_auto_bypass_active());
    assert!(h.relay.is_off());
}

#[tokio::test]
async fn auto_bypass_stops_outside_window() {
    let mut h = harness(true, true, auto_bypass_config());
    h.output.apply_auto_bypass().await;
    assert!(h.output.is_auto_bypass_active());

    h.clock.set(Some(sunday(12, 0)));
    h.output.apply_auto_bypass().await;
    assert!(!h.output.is_auto_bypass_active());
    assert!(!h.output.is_bypass_on());
    assert!(h.relay.is_off());
}

#[tokio::test]
async fn invalid_temperature_stops_auto_bypass() {
    let mut h = harness(true, true, auto_bypass_config());
    h.output.update_temperature(Some(30.0));
    h.output.apply_auto_bypass().await;
    assert!(h.output.is_auto_bypass_active());

    h.output.update_temperature(None);
    h.output.apply_auto_bypass().await;
    assert!(!h.output.is_auto_bypass_active());
    assert!(h.relay.is_off());
}

#[tokio::test]
async fn temperature_hysteresis() {
    // start below 50, stop at 60
    let mut h = harness(true, true, auto_bypass_config());
    h.output.update_temperature(Some(55.0));
    h.output.apply_auto_bypass().await;
    assert!(!h.output.is_auto_bypass_active());

    h.output.update_temperature(Some(45.0));
    h.output.apply_auto_bypass().await;
    assert!(h.output.is_auto_bypass_active());

    h.output.update_temperature(Some(55.0));
    h.output.apply_auto_bypass().await;
    assert!(h.output.is_auto_bypass_active());

    h.output.update_temperature(Some(60.0));
    h.output.apply_auto_bypass().await;
    assert!(!h.output.is_auto_bypass_active());
}

#[tokio::test]
async fn unsynced_clock_stops_auto_bypass() {
    let mut h = harness(true, true, auto_bypass_config());
    h.output.apply_auto_bypass().await;
    assert!(h.output.is_auto_bypass_active());

    h.clock.set_synced(false);
    h.output.apply_auto_bypass().await;
    assert!(!h.output.is_auto_bypass_active());
}

#[tokio::test]
async fn invalid_range_stops_auto_bypass() {
    let mut h = harness(true, true, auto_bypass_config());
    h.output.apply_auto_bypass().await;
    assert!(h.output.is_auto_bypass_active());

    let mut config = h.output.config().clone();
    config.auto_stop_time = "6h".to_string();
    h.output.set_config(config);
    h.output.apply_auto_bypass().await;
    assert!(!h.output.is_auto_bypass_active());
}

#[tokio::test]
async fn disabling_feature_stops_auto_bypass() {
    let mut h = harness(true, true, auto_bypass_config());
    h.output.apply_auto_bypass().await;
    assert!(h.output.is_auto_bypass_active());

    h.output.set_config(ControlConfig::default());
    h.output.apply_auto_bypass().await;
    assert!(!h.output.is_auto_bypass_active());
    assert!(h.relay.is_off());
}

#[tokio::test]
async fn auto_bypass_restores_relay() {
    let mut h = harness(true, true, auto_bypass_config());
    h.output.apply_auto_bypass().await;
    assert!(h.relay.is_on());

    h.relay.on.store(false, Ordering::SeqCst);
    h.output.apply_auto_bypass().await;
    assert!(h.relay.is_on());
    assert!(h.output.is_auto_bypass_active());
}

#[tokio::test]
async fn auto_bypass_restores_dimmer_fallback() {
    let mut h = harness(true, false, auto_bypass_config());
    h.output.apply_auto_bypass().await;
    assert_eq!(h.output.dimmer_duty_cycle(), 1.0);

    h.output.set_dimmer_off().await;
    h.output.apply_auto_bypass().await;
    assert_eq!(h.output.dimmer_duty_cycle(), 1.0);
}

// metrics

#[tokio::test]
async fn measurements_follow_meter_and_state() {
    let mut h = harness(true, false, ControlConfig::default());
    assert!(h.output.measurements().is_none());
    assert_eq!(h.output.output_power(), 0.0);

    h.meter.update(MeterData {
        voltage: 230.0,
        current: 2.0,
        active_power: 400.0,
        apparent_power: 460.0,
        power_factor: 0.87,
        active_energy: 3.0,
    });
    let idle = h.output.measurements().unwrap();
    assert_eq!(idle.power, 0.0);
    assert_eq!(idle.voltage, 230.0);

    assert!(h.output.set_dimmer_duty_cycle(0.5).await);
    let routing = h.output.measurements().unwrap();
    assert_eq!(routing.power, 400.0);
    assert_eq!(h.output.output_power(), 400.0);
    assert_eq!(h.output.dimmer_metrics(230.0).energy, 3.0);
}

#[tokio::test]
async fn snapshot_serializes_state_names() {
    let mut h = harness(
        true,
        true,
        ControlConfig {
            calibrated_resistance: 52.9,
            ..Default::default()
        },
    );
    h.output.set_bypass(true).await;
    let json = serde_json::to_value(h.output.snapshot(230.0)).unwrap();
    assert_eq!(json["name"], "output1");
    assert_eq!(json["bypass"], "on");
    assert_eq!(json["state"], "BYPASS_MANUAL");
    assert_eq!(json["enabled"], true);
    assert!(json["measurements"].is_null());
    assert!(json["metrics"].get("voltage_dimmed").is_some());
}
