//! Browser launch configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const BROWSER_CANDIDATES: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
];

const CHROMEDRIVER_CANDIDATES: &[&str] = &["/usr/bin/chromedriver", "/usr/lib/chromium/chromedriver"];

/// Configuration for launching ChromeDriver-backed sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Path to the chromedriver binary. Discovered when unset.
    #[serde(default)]
    pub chromedriver_path: Option<PathBuf>,

    /// Path to the Chrome/Chromium binary. Discovered when unset.
    #[serde(default)]
    pub browser_binary: Option<PathBuf>,

    /// Worker N's chromedriver listens on `port_base + N`.
    #[serde(default = "default_port_base")]
    pub port_base: u16,

    /// Worker N's browser uses `--remote-debugging-port=debug_port_base + N`.
    #[serde(default = "default_debug_port_base")]
    pub debug_port_base: u16,

    /// Directory for per-worker temporary profiles (system temp dir when unset).
    #[serde(default)]
    pub profile_root: Option<PathBuf>,

    #[serde(default = "default_window_size")]
    pub window_size: String,

    /// Extra browser arguments appended after the built-in ones.
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// How long to wait for chromedriver to report ready.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Per-command HTTP timeout against chromedriver.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_port_base() -> u16 {
    9515
}

fn default_debug_port_base() -> u16 {
    9222
}

fn default_window_size() -> String {
    "1280,1000".to_string()
}

fn default_startup_timeout() -> u64 {
    15
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            chromedriver_path: None,
            browser_binary: None,
            port_base: default_port_base(),
            debug_port_base: default_debug_port_base(),
            profile_root: None,
            window_size: default_window_size(),
            extra_args: Vec::new(),
            startup_timeout_secs: default_startup_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl DriverConfig {
    /// Browser binary: configured path, then `CHROME_BIN`, then well-known locations.
    pub fn resolve_browser_binary(&self) -> Option<PathBuf> {
        if let Some(path) = &self.browser_binary {
            return Some(path.clone());
        }
        from_env_or_candidates("CHROME_BIN", BROWSER_CANDIDATES)
    }

    /// chromedriver binary: configured path, then `CHROMEDRIVER_PATH`, then
    /// well-known locations, then whatever `chromedriver` resolves to on PATH.
    pub fn resolve_chromedriver(&self) -> PathBuf {
        if let Some(path) = &self.chromedriver_path {
            return path.clone();
        }
        from_env_or_candidates("CHROMEDRIVER_PATH", CHROMEDRIVER_CANDIDATES)
            .unwrap_or_else(|| PathBuf::from("chromedriver"))
    }
}

fn from_env_or_candidates(var: &str, candidates: &[&str]) -> Option<PathBuf> {
    if let Ok(value) = std::env::var(var) {
        let path = PathBuf::from(value);
        if path.exists() {
            return Some(path);
        }
    }
    candidates
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.port_base, 9515);
        assert_eq!(config.debug_port_base, 9222);
        assert_eq!(config.window_size, "1280,1000");
        assert!(config.extra_args.is_empty());
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            chromedriver_path = "/opt/cd"
            port_base = 10000
        "#;
        let config: DriverConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.resolve_chromedriver(), PathBuf::from("/opt/cd"));
        assert_eq!(config.port_base, 10000);
        assert_eq!(config.startup_timeout_secs, 15);
    }

    #[test]
    fn test_configured_browser_binary_wins() {
        let config = DriverConfig {
            browser_binary: Some(PathBuf::from("/does/not/matter")),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_browser_binary(),
            Some(PathBuf::from("/does/not/matter"))
        );
    }
}
