//! Application-level configuration loading for the facility runtime.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "RANGE_BACK_CONFIG_PATH";

/// Size of the fixed bay pool when no configuration is present.
const DEFAULT_BAY_COUNT: u32 = 20;
/// How often the background sweep closes expired sessions and reservations.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Capacity of the overview broadcast channel.
const DEFAULT_SSE_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Number of bays in the fixed pool (numbered 1..=count). The configured
    /// value is authoritative; historical data never resizes the pool.
    pub bay_count: u32,
    /// How long a reservation holds a bay before the sweeper clears it.
    /// `None` means reservations persist until manually cleared.
    pub reservation_ttl: Option<Duration>,
    /// Interval between background sweep passes.
    pub sweep_interval: Duration,
    /// Capacity of the overview broadcast channel.
    pub sse_capacity: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to
    /// built-in defaults when the file is missing or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        bay_count = config.bay_count,
                        "loaded facility configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bay_count: DEFAULT_BAY_COUNT,
            reservation_ttl: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sse_capacity: DEFAULT_SSE_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    bay_count: Option<u32>,
    reservation_ttl_minutes: Option<u64>,
    sweep_interval_secs: Option<u64>,
    sse_capacity: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            bay_count: raw.bay_count.unwrap_or(defaults.bay_count),
            reservation_ttl: raw
                .reservation_ttl_minutes
                .map(|minutes| Duration::from_secs(minutes * 60)),
            sweep_interval: raw
                .sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            sse_capacity: raw.sse_capacity.unwrap_or(defaults.sse_capacity),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_config_fills_defaults() {
        let raw: RawConfig = serde_json::from_str("{}").unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.bay_count, DEFAULT_BAY_COUNT);
        assert_eq!(config.reservation_ttl, None);
        assert_eq!(config.sweep_interval, DEFAULT_SWEEP_INTERVAL);
    }

    #[test]
    fn raw_config_parses_overrides() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"bay_count": 36, "reservation_ttl_minutes": 15, "sweep_interval_secs": 30}"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.bay_count, 36);
        assert_eq!(config.reservation_ttl, Some(Duration::from_secs(900)));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
    }
}
