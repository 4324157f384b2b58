//! Application-level configuration loading: fan-out tuning, chat previews, reminders,
//! realtime buffering and the push gateway.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PADEL_BACK_CONFIG_PATH";
/// Environment variable that overrides [`PushConfig::gateway_url`].
const PUSH_GATEWAY_ENV: &str = "PUSH_GATEWAY_URL";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub fanout: FanoutConfig,
    pub chat: ChatConfig,
    pub reminders: ReminderConfig,
    pub realtime: RealtimeConfig,
    pub push: PushConfig,
}

/// Notification fan-out tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Maximum number of push deliveries in flight for one event.
    pub concurrency: usize,
    /// Per-delivery timeout in milliseconds.
    pub push_timeout_ms: u64,
    /// Buffer of the delivery report channel.
    pub report_capacity: usize,
}

impl FanoutConfig {
    /// Per-delivery timeout.
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            push_timeout_ms: 5_000,
            report_capacity: 64,
        }
    }
}

/// Chat channel settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of characters of a message shown in its notification body.
    pub preview_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { preview_chars: 100 }
    }
}

/// End-of-match reminder settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub enabled: bool,
    /// Minutes before the end of a match at which the "ending soon" reminder fires.
    pub lead_minutes: u32,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lead_minutes: 5,
        }
    }
}

/// Realtime propagation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Events buffered per subscriber before it starts lagging.
    pub channel_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Push delivery settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Web-push gateway receiving `{subscription, payload}` deliveries.
    pub gateway_url: Option<String>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration");
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
        };

        if let Some(url) = env::var(PUSH_GATEWAY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            config.push.gateway_url = Some(url);
        }
        config.sanitize()
    }

    /// Clamp values that would make the runtime misbehave.
    fn sanitize(mut self) -> Self {
        self.fanout.concurrency = self.fanout.concurrency.max(1);
        self.fanout.report_capacity = self.fanout.report_capacity.max(1);
        self.realtime.channel_capacity = self.realtime.channel_capacity.max(1);
        self
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
