//! Environment variable helpers
//!
//! All runtime knobs are read through these so a bad value degrades to the
//! compiled-in default instead of failing startup.
//!
//! ```ignore
//! use evtls_core::env::{env_get, env_get_bool, env_get_millis};
//!
//! let workers: usize = env_get("EVTLS_NUM_WORKERS", 4);
//! let debug = env_get_bool("EVTLS_DEBUG", false);
//! let park = env_get_millis("EVTLS_PARK_TIMEOUT_MS", 100);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`; unset or unparsable yields `default`
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T`, or `None` if unset or unparsable
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Boolean flag. "1/true/yes/on" and "0/false/no/off" are recognized
/// (case-insensitive); anything else, including unset, yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

/// Millisecond duration
#[inline]
pub fn env_get_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}

/// Raw string value, or `default`
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Whether `key` is set at all
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var_os(key).is_some()
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
