#![cfg(test)]

use super::config::*;
use super::dimmer::{DimmerSku, OutputRange};

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.bus.device, "/dev/i2c-1");
    assert_eq!(config.bus.discovery_attempts, 5);
    assert_eq!(config.tick_interval_ms, 1000);
    assert_eq!(config.outputs.len(), 2);
    assert_eq!(config.outputs[1].dimmer.channel, 1);
    assert_eq!(config.outputs[0].dimmer.output_range, OutputRange::High);
    assert!(config.outputs[0].control.is_active_on("sun"));
}

#[test]
fn test_config_validation() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.tick_interval_ms = 0;
    assert!(config.validate().is_err());

    config = Config::default();
    config.timezone = "Nowhere/Town".to_string();
    assert!(config.validate().is_err());

    config = Config::default();
    config.outputs[1].name = "output1".to_string();
    assert!(config.validate().is_err());

    config = Config::default();
    config.outputs[0].dimmer.channel = 3;
    assert!(config.validate().is_err());

    config = Config::default();
    config.outputs[0].dimmer.address = 0x80;
    assert!(config.validate().is_err());

    config = Config::default();
    config.outputs[0].control.reserved_excess_power_ratio = 1.5;
    assert!(config.validate().is_err());

    config = Config::default();
    config.outputs[0].control.week_days = "mon,funday".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_serialization() {
    let mut config = Config::default();
    config.outputs[0].dimmer.sku = Some(DimmerSku::Dfr1073Gp8413);
    let yaml = serde_yaml::to_string(&config).unwrap();
    assert!(yaml.contains("DFR1073"));
    let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(
        deserialized.outputs[0].dimmer.sku,
        Some(DimmerSku::Dfr1073Gp8413)
    );
    assert_eq!(config.outputs[0].control, deserialized.outputs[0].control);
}

#[test]
fn test_partial_yaml_uses_defaults() {
    let yaml = r#"
timezone: Europe/Paris
outputs:
  - name: boiler
    dimmer:
      sku: DFR0971
      output_range: low
    control:
      auto_dimmer: true
      calibrated_resistance: 52.9
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.outputs.len(), 1);
    let output = &config.outputs[0];
    assert_eq!(output.dimmer.output_range, OutputRange::Low);
    assert_eq!(output.dimmer.duty_cycle_limit, 1.0);
    assert_eq!(output.control.auto_start_time, "22:00");
    assert!(!output.relay.enabled);
}
