use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Fetcher attempts and timeout are positive
/// - Forum base URL is an http(s) URL
/// - Image web prefix is absolute
/// - Feed lookup size is positive
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.fetcher.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "fetcher.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.fetcher.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "fetcher.request_timeout_secs cannot be 0".to_string(),
        ));
    }

    let base = config.forum.base_url.trim();
    if base.is_empty() || !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ConfigError::ValidationError(format!(
            "forum.base_url must be an http(s) URL, got '{}'",
            config.forum.base_url
        )));
    }

    if !config.image_cache.web_prefix.starts_with('/') {
        return Err(ConfigError::ValidationError(
            "image_cache.web_prefix must start with '/'".to_string(),
        ));
    }

    if config.detector.feed_limit == 0 {
        return Err(ConfigError::ValidationError(
            "detector.feed_limit cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_attempts_fails() {
        let mut config = Config::default();
        config.fetcher.max_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_base_url_scheme() {
        let mut config = Config::default();
        config.forum.base_url = "f95zone.to".to_string();
        assert!(validate_config(&config).is_err());

        config.forum.base_url = "http://localhost:8000".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_relative_web_prefix_fails() {
        let mut config = Config::default();
        config.image_cache.web_prefix = "images".to_string();
        assert!(validate_config(&config).is_err());
    }
}
