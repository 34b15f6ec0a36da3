use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

use crate::attempt::{RequestLimits, SiteConfig};
use crate::driver::DriverConfig;
use crate::layout::LayoutConfig;
use crate::notify::NotifyConfig;
use crate::pacing::PacingConfig;
use crate::race::RaceConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub race: RaceConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

impl From<&Config> for RequestLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrency: config.race.max_concurrency,
            min_level: config.pacing.min_level,
            max_level: config.pacing.max_level,
        }
    }
}

/// Sanitized config for API responses (webhook URL redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub site: SiteConfig,
    pub layout: LayoutConfig,
    pub pacing: PacingConfig,
    pub driver: DriverConfig,
    pub race: RaceConfig,
    pub notify: SanitizedNotifyConfig,
}

/// Notification settings with the webhook reduced to a flag
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedNotifyConfig {
    pub webhook_configured: bool,
    pub timeout_secs: u64,
    pub log: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            site: config.site.clone(),
            layout: config.layout.clone(),
            pacing: config.pacing.clone(),
            driver: config.driver.clone(),
            race: config.race.clone(),
            notify: SanitizedNotifyConfig {
                webhook_configured: config
                    .notify
                    .webhook_url
                    .as_deref()
                    .is_some_and(|url| !url.trim().is_empty()),
                timeout_secs: config.notify.timeout_secs,
                log: config.notify.log,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.race.max_concurrency, 4);
        assert_eq!(config.layout.default_columns.standard, 7);
        assert_eq!(config.pacing.default_level, 3);
        assert!(config.notify.webhook_url.is_none());
    }

    #[test]
    fn test_request_limits_from_config() {
        let mut config = Config::default();
        config.race.max_concurrency = 2;
        config.pacing.max_level = 4;

        let limits = RequestLimits::from(&config);
        assert_eq!(limits.max_concurrency, 2);
        assert_eq!(limits.min_level, 1);
        assert_eq!(limits.max_level, 4);
    }

    #[test]
    fn test_sanitized_config_hides_webhook() {
        let mut config = Config::default();
        config.notify.webhook_url = Some("https://hooks.example.com/secret-token".into());

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.notify.webhook_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(json.contains("\"webhook_configured\":true"));
    }

    #[test]
    fn test_sanitized_config_blank_webhook_not_configured() {
        let mut config = Config::default();
        config.notify.webhook_url = Some("  ".into());

        let sanitized = SanitizedConfig::from(&config);
        assert!(!sanitized.notify.webhook_configured);
    }
}
