use super::*;

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/solarouter.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device: "/dev/i2c-1".to_string(),
            discovery_attempts: 5,
            discovery_delay_ms: 10,
        }
    }
}

impl Default for DimmerConfig {
    fn default() -> Self {
        Self {
            sku: None,
            channel: 0,
            address: 0,
            output_range: OutputRange::High,
            duty_cycle_limit: 1.0,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            calibrated_resistance: 0.0,
            auto_dimmer: false,
            dimmer_temp_limit: 0,
            auto_bypass: false,
            auto_start_temperature: 50,
            auto_stop_temperature: 60,
            auto_start_time: "22:00".to_string(),
            auto_stop_time: "06:00".to_string(),
            week_days: WEEKDAY_TOKENS.join(","),
            reserved_excess_power_ratio: 1.0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            name: "output".to_string(),
            dimmer: DimmerConfig::default(),
            relay: RelayConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            bus: BusConfig::default(),
            timezone: "UTC".to_string(),
            tick_interval_ms: 1000,
            nominal_grid_voltage: 230.0,
            grid_expiration_secs: 60,
            temperature_expiration_secs: 300,
            outputs: vec![
                OutputConfig {
                    name: "output1".to_string(),
                    ..Default::default()
                },
                OutputConfig {
                    name: "output2".to_string(),
                    dimmer: DimmerConfig {
                        channel: 1,
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ],
        }
    }
}
