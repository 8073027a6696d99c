use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Nested keys use a double underscore, e.g. `THREADWATCH_FETCHER__MAX_ATTEMPTS=3`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("THREADWATCH_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[server]
port = 9000

[fetcher]
max_attempts = 3
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.fetcher.max_attempts, 3);
        assert_eq!(config.fetcher.request_timeout_secs, 15);
    }

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.forum.base_url, "https://f95zone.to");
        assert_eq!(config.detector.debounce_days, 3);
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let toml = r#"
[server]
port = "not-a-port"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
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

[image_cache]
dir = "/tmp/covers"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.image_cache.dir.to_str().unwrap(), "/tmp/covers");
        assert_eq!(config.image_cache.web_prefix, "/images");
    }
}
