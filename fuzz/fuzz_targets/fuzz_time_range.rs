#![no_main]
use libfuzzer_sys::fuzz_target;
use solarouter::clock::{TimeRange, time_in_range};

fuzz_target!(|data: &[u8]| {
    // First two bytes pick the time of day, the rest is split into two bounds
    if data.len() < 2 {
        return;
    }
    let minutes = u32::from(u16::from_le_bytes([data[0], data[1]])) % (24 * 60);
    let Some(now) = chrono::NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0) else {
        return;
    };
    let text = String::from_utf8_lossy(&data[2..]);
    let (start, stop) = text.split_once('|').unwrap_or((&text, ""));

    let range = time_in_range(now, start, stop);
    if start == stop {
        assert_ne!(range, TimeRange::Inside);
    }
});
