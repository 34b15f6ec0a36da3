use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

const ENV_PREFIX: &str = "SEATRACE_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("_"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Built-in defaults with environment variable overrides, for running
/// without a config file.
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed(ENV_PREFIX).split("_"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Locator;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.race.max_concurrency, 4);
        assert_eq!(config.layout.default_columns.waitlist, 8);
    }

    #[test]
    fn test_load_config_from_str_sections() {
        let toml = r#"
[server]
port = 9090

[site]
search_url = "http://localhost:4000/search"
date_select = { css = "select.date" }

[layout.default_columns]
standard = 5
premium = 4
waitlist = 6

[pacing]
default_level = 5
no_rows = { baseline_ms = 900, floor_ms = 300 }

[race]
max_concurrency = 2

[notify]
webhook_url = "https://hooks.example.com/seatrace"
"#;

        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.site.search_url, "http://localhost:4000/search");
        assert_eq!(config.site.date_select, Locator::css("select.date"));
        assert_eq!(config.layout.default_columns.standard, 5);
        assert_eq!(config.pacing.default_level, 5);
        assert_eq!(config.pacing.no_rows.floor_ms, 300);
        assert_eq!(config.race.max_concurrency, 2);
        assert_eq!(
            config.notify.webhook_url.as_deref(),
            Some("https://hooks.example.com/seatrace")
        );
    }

    #[test]
    fn test_load_config_from_str_invalid_toml() {
        let result = load_config_from_str("[server\nport = 1");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let result = load_config_from_str("[server]\nport = \"eighty\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/seatrace.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
host = "127.0.0.1"
port = 3000

[driver]
port_base = 20000
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.driver.port_base, 20000);
    }

    #[test]
    fn test_load_config_from_env_defaults() {
        let config = load_config_from_env().unwrap();
        assert_eq!(config.pacing.min_level, 1);
        assert_eq!(config.pacing.max_level, 5);
    }
}
