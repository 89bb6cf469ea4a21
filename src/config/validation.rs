use super::{AppConfig, ConfigError};
use crate::observability::LOG_LEVELS;

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_stream_config(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_stream_config(config: &AppConfig) -> Result<(), ConfigError> {
    let stream = &config.stream;
    if stream.provider.trim().is_empty() {
        return Err(validation_err("stream.provider cannot be empty"));
    }
    if stream.text_block_id.is_empty() {
        return Err(validation_err("stream.text_block_id cannot be empty"));
    }
    if stream.read_chunk_size == 0 {
        return Err(validation_err(
            "stream.read_chunk_size must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.logging.log_level.to_uppercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "Invalid log_level '{}'. Must be one of: {}",
            config.logging.log_level,
            LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    fn make_valid_config() -> AppConfig {
        AppConfig::default()
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&make_valid_config()).is_ok());
    }

    #[test]
    fn test_empty_provider() {
        let mut config = make_valid_config();
        config.stream.provider = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("stream.provider"));
    }

    #[test]
    fn test_empty_text_block_id() {
        let mut config = make_valid_config();
        config.stream.text_block_id = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_read_chunk_size() {
        let mut config = make_valid_config();
        config.stream.read_chunk_size = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("read_chunk_size"));
    }

    #[test]
    fn test_log_levels() {
        let mut config = make_valid_config();
        for level in ["debug", "WARNING", "warn", "CRITICAL", "DISABLED"] {
            config.logging.log_level = level.to_string();
            assert!(validate_config(&config).is_ok(), "{level}");
        }
        config.logging.log_level = "VERBOSE".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("VERBOSE"));
    }

    #[test]
    fn test_custom_stream_settings() {
        let mut config = make_valid_config();
        config.stream = StreamConfig {
            dialect: Dialect::Completion,
            provider: "azure".to_string(),
            include_raw_chunks: true,
            text_block_id: "txt-0".to_string(),
            read_chunk_size: 1,
        };
        assert!(validate_config(&config).is_ok());
    }
}
