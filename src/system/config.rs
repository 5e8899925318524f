//! Timing configuration for connection handling, menu waits and the watchdog

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScripterConfig {
    /// A menu pushed within this window means the link is live
    pub connection_fresh_ms: u64,
    pub menu_update_timeout_ms: u64,
    pub menu_leave_timeout_ms: u64,
    /// Overall watchdog for one command
    pub command_timeout_ms: u64,
    /// How long an interrupted command gets to stop before it is abandoned
    pub cancel_grace_ms: u64,
    pub idle_disconnect_after_ms: u64,
    pub idle_monitor_start_delay_ms: u64,
    pub idle_check_interval_ms: u64,
    pub idle_disconnect_pause_ms: u64,
    pub key_hold_ms: u64,
    pub menu_update_poll_ms: u64,
    pub menu_leave_poll_ms: u64,
    pub verify_retries: u32,
    pub verify_retry_delay_ms: u64,
}

impl Default for ScripterConfig {
    fn default() -> Self {
        Self {
            connection_fresh_ms: 5_000,
            menu_update_timeout_ms: 90_000,
            menu_leave_timeout_ms: 30_000,
            command_timeout_ms: 60_000,
            cancel_grace_ms: 5_000,
            idle_disconnect_after_ms: 5_000,
            idle_monitor_start_delay_ms: 10_000,
            idle_check_interval_ms: 250,
            idle_disconnect_pause_ms: 1_000,
            key_hold_ms: 100,
            menu_update_poll_ms: 50,
            menu_leave_poll_ms: 10,
            verify_retries: 5,
            verify_retry_delay_ms: 200,
        }
    }
}

impl ScripterConfig {
    /// Missing fields fall back to their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn connection_fresh(&self) -> Duration {
        Duration::from_millis(self.connection_fresh_ms)
    }

    pub fn menu_update_timeout(&self) -> Duration {
        Duration::from_millis(self.menu_update_timeout_ms)
    }

    pub fn menu_leave_timeout(&self) -> Duration {
        Duration::from_millis(self.menu_leave_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn idle_disconnect_after(&self) -> Duration {
        Duration::from_millis(self.idle_disconnect_after_ms)
    }

    pub fn idle_monitor_start_delay(&self) -> Duration {
        Duration::from_millis(self.idle_monitor_start_delay_ms)
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_millis(self.idle_check_interval_ms)
    }

    pub fn idle_disconnect_pause(&self) -> Duration {
        Duration::from_millis(self.idle_disconnect_pause_ms)
    }

    pub fn key_hold(&self) -> Duration {
        Duration::from_millis(self.key_hold_ms)
    }

    pub fn menu_update_poll(&self) -> Duration {
        Duration::from_millis(self.menu_update_poll_ms)
    }

    pub fn menu_leave_poll(&self) -> Duration {
        Duration::from_millis(self.menu_leave_poll_ms)
    }

    pub fn verify_retry_delay(&self) -> Duration {
        Duration::from_millis(self.verify_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ScripterConfig::from_json(r#"{ "command_timeout_ms": 1000 }"#).unwrap();
        assert_eq!(config.command_timeout(), Duration::from_secs(1));
        assert_eq!(config.menu_update_timeout(), Duration::from_secs(90));
        assert_eq!(config.verify_retries, 5);
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(ScripterConfig::from_json("{ command_timeout_ms: }").is_err());
    }
}
