use chrono::{DateTime, SecondsFormat, Utc};
use rand::{distributions::Uniform, thread_rng, Rng};

const UPPER_ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const LOWER_ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

pub const FRIENDLY_ID_LEN: usize = 6;
pub const API_KEY_LEN: usize = 30;

/// LiPo battery voltage at 0%
const BATTERY_MIN_V: f32 = 3.0;
/// LiPo battery voltage at 100%
const BATTERY_MAX_V: f32 = 4.2;

pub fn ms_since_epoch() -> i64 {
    Utc::now().timestamp_millis()
}

/// Formats epoch millis the way javascript's `Date.toISOString` does.
pub fn iso8601_from_millis(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn random_string(charset: &[u8], len: usize) -> String {
    let dist = Uniform::from(0..charset.len());
    thread_rng()
        .sample_iter(dist)
        .take(len)
        .map(|i| charset[i] as char)
        .collect()
}

pub fn generate_friendly_id() -> String {
    random_string(UPPER_ALPHANUMERIC, FRIENDLY_ID_LEN)
}

pub fn generate_api_key() -> String {
    random_string(LOWER_ALPHANUMERIC, API_KEY_LEN)
}

/// Short random suffix used to defeat the image cache on the device.
pub fn generate_filename_suffix() -> String {
    random_string(LOWER_ALPHANUMERIC, 8)
}

/// MAC addresses are stored trimmed and uppercase.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_uppercase()
}

pub fn battery_percentage(volts: f32) -> u8 {
    if volts <= BATTERY_MIN_V {
        0
    } else if volts >= BATTERY_MAX_V {
        100
    } else {
        ((volts - BATTERY_MIN_V) * 100.0 / (BATTERY_MAX_V - BATTERY_MIN_V)).round() as u8
    }
}
