#![no_main]
use libfuzzer_sys::fuzz_target;
use solarouter::dimmer::{duty_payload, encode_duty_register};
use solarouter::router::RouterCommand;

fuzz_target!(|data: &[u8]| {
    // Console lines must never panic the parser
    if let Ok(line) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<RouterCommand>(line);
    }

    // Any duty cycle encodes into a valid payload
    if data.len() >= 5 {
        let duty = f32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let resolution = data[4] % 17;
        let value = encode_duty_register(duty, resolution);
        let _ = duty_payload(data[4] % 4, value);
    }
});
