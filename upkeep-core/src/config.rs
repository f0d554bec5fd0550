//! Update configuration
//!
//! Configuration for the update controller and its HTTP binding, typically
//! loaded from /etc/upkeep/agent.yaml under the `updates` section.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default interval between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Update controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Whether update checks are enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Base URL of the update service
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Path prefix of the update endpoints
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// How often to poll status while work is in flight (e.g., "500ms", "2s")
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Connection establishment timeout. Requests themselves are unbounded.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// User-Agent header sent to the service
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Download as soon as a check finds an update
    #[serde(default)]
    pub auto_download: bool,

    /// Install as soon as a download is ready
    #[serde(default)]
    pub auto_install: bool,

    /// Drop a staged payload when a later check reports a different version
    #[serde(default = "default_invalidate_stale_payload")]
    pub invalidate_stale_payload: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_server_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_api_prefix() -> String {
    "/api/update".to_string()
}

fn default_poll_interval() -> String {
    "500ms".to_string()
}

fn default_connect_timeout() -> String {
    "30s".to_string()
}

fn default_invalidate_stale_payload() -> bool {
    true
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            server_url: default_server_url(),
            api_prefix: default_api_prefix(),
            poll_interval: default_poll_interval(),
            connect_timeout: default_connect_timeout(),
            user_agent: None,
            auto_download: false,
            auto_install: false,
            invalidate_stale_payload: default_invalidate_stale_payload(),
        }
    }
}

impl UpdateConfig {
    /// Parse poll interval string to duration
    pub fn poll_interval_duration(&self) -> Duration {
        parse_duration(&self.poll_interval).unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    /// Parse connect timeout string to duration
    pub fn connect_timeout_duration(&self) -> Duration {
        parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(30))
    }

    /// Full URL of one endpoint, e.g. `endpoint("check")`.
    pub fn endpoint(&self, name: &str) -> String {
        let base = self.server_url.trim_end_matches('/');
        match self.api_prefix.trim_matches('/') {
            "" => format!("{}/{}", base, name),
            prefix => format!("{}/{}/{}", base, prefix, name),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server_url.is_empty() {
            return Err("Update server URL cannot be empty".to_string());
        }

        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(format!(
                "Invalid server URL '{}'. Must start with http:// or https://",
                self.server_url
            ));
        }

        match parse_duration(&self.poll_interval) {
            None => {
                return Err(format!(
                    "Invalid poll interval '{}'. Use format like '500ms', '2s', '1m'",
                    self.poll_interval
                ))
            }
            Some(d) if d.is_zero() => return Err("Poll interval must be greater than zero".to_string()),
            Some(_) => {}
        }

        if parse_duration(&self.connect_timeout).is_none() {
            return Err(format!(
                "Invalid connect timeout '{}'. Use format like '10s', '1m'",
                self.connect_timeout
            ));
        }

        if self.auto_install && !self.auto_download {
            return Err("auto_install requires auto_download".to_string());
        }

        Ok(())
    }
}

/// Parse a duration string like "500ms", "30s", "5m", "1h", "1d"
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(num) = s.strip_suffix("ms") {
        return num.trim().parse().ok().map(Duration::from_millis);
    }

    let (unit_start, _) = s.char_indices().last()?;
    let (num, unit) = s.split_at(unit_start);
    let num: u64 = num.trim().parse().ok()?;

    let seconds = match unit {
        "s" => num,
        "m" => num.checked_mul(60)?,
        "h" => num.checked_mul(3600)?,
        "d" => num.checked_mul(86400)?,
        _ => return None,
    };

    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("1d"), Some(Duration::from_secs(86400)));
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration("ms"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("5µ"), None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = UpdateConfig::default();
        assert!(config.validate().is_ok());

        config.server_url = "ftp://updates".to_string();
        assert!(config.validate().is_err());

        config.server_url = "http://127.0.0.1:8000".to_string();
        config.poll_interval = "0ms".to_string();
        assert!(config.validate().is_err());

        config.poll_interval = "fast".to_string();
        assert!(config.validate().is_err());

        config.poll_interval = "1s".to_string();
        config.auto_install = true;
        assert!(config.validate().is_err());

        config.auto_download = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_joins_cleanly() {
        let mut config = UpdateConfig::default();
        assert_eq!(config.endpoint("check"), "http://127.0.0.1:8000/api/update/check");

        config.server_url = "https://updates.example.com/".to_string();
        config.api_prefix = "api/update/".to_string();
        assert_eq!(config.endpoint("status"), "https://updates.example.com/api/update/status");
    }

    #[test]
    fn test_interval_fallback() {
        let config = UpdateConfig {
            poll_interval: "garbage".to_string(),
            ..Default::default()
        };
        assert_eq!(config.poll_interval_duration(), DEFAULT_POLL_INTERVAL);
    }
}
