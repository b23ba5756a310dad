//! Service configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::notify::DEFAULT_BUFFER;
use crate::scan::DEFAULT_STORE_TIMEOUT;

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

pub const ENV_BIND: &str = "SCAN_DESK_BIND";
pub const ENV_STATE_DIR: &str = "SCAN_DESK_STATE_DIR";
pub const ENV_TOKEN_SECRET: &str = "SCAN_DESK_TOKEN_SECRET";
pub const ENV_STORE_TIMEOUT_MS: &str = "SCAN_DESK_STORE_TIMEOUT_MS";
pub const ENV_EVENT_BUFFER: &str = "SCAN_DESK_EVENT_BUFFER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the HTTP server listens on.
    ///
    /// Default: `0.0.0.0:3000`. Configure via `SCAN_DESK_BIND`.
    pub bind: SocketAddr,

    /// Directory holding `participants.log` and `scans.log`.
    ///
    /// `None` keeps everything in memory. Configure via `SCAN_DESK_STATE_DIR`.
    pub state_dir: Option<PathBuf>,

    /// HMAC secret for structured QR tokens. `None` disables signing.
    pub token_secret: Option<Vec<u8>>,

    /// Bound on each registry call made while processing a scan.
    ///
    /// Default: 2 seconds. Configure via `SCAN_DESK_STORE_TIMEOUT_MS`.
    pub store_timeout: Duration,

    /// Change events buffered per subscriber before it is told to resync.
    ///
    /// Default: 1024. Configure via `SCAN_DESK_EVENT_BUFFER`.
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Config {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            state_dir: None,
            token_secret: None,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            event_buffer: DEFAULT_BUFFER,
        }
    }

    /// Reads the `SCAN_DESK_*` environment variables.
    ///
    /// Malformed values are logged and replaced by their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::new();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind = parse_or(ENV_BIND, non_empty(ENV_BIND), defaults.bind);
        let store_timeout_ms = parse_or(
            ENV_STORE_TIMEOUT_MS,
            non_empty(ENV_STORE_TIMEOUT_MS),
            defaults.store_timeout.as_millis() as u64,
        );
        let event_buffer = parse_or(
            ENV_EVENT_BUFFER,
            non_empty(ENV_EVENT_BUFFER),
            defaults.event_buffer,
        );

        Config {
            bind,
            state_dir: non_empty(ENV_STATE_DIR).map(PathBuf::from),
            token_secret: non_empty(ENV_TOKEN_SECRET).map(String::into_bytes),
            store_timeout: Duration::from_millis(store_timeout_ms.max(1)),
            event_buffer: event_buffer.max(1),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> T {
    let Some(raw) = value else {
        return default;
    };
    match raw.trim().parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(key, value = %raw, "Ignoring malformed configuration value");
            default
        }
    }
}
