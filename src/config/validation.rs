use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("download.max_retries must be at least 1")]
    NoAttempts,

    #[error("{field} must be positive")]
    ZeroTimeout { field: &'static str },

    #[error("download.max_image_bytes must be positive")]
    ZeroImageLimit,

    #[error("output.filename_prefix must not be empty")]
    EmptyPrefix,

    #[error("output.filename_prefix '{prefix}' must not contain path separators")]
    PrefixHasSeparator { prefix: String },

    #[error("output.start_index must be below {}", u64::MAX)]
    StartIndexTooLarge,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_download(config)?;
    validate_output(config)?;
    Ok(())
}

fn validate_download(config: &Config) -> Result<(), ValidationError> {
    let download = &config.download;

    if download.max_retries == 0 {
        return Err(ValidationError::NoAttempts);
    }

    if download.request_timeout_ms == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "download.request_timeout_ms",
        });
    }

    if download.connect_timeout_ms == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "download.connect_timeout_ms",
        });
    }

    if download.max_image_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroImageLimit);
    }

    Ok(())
}

/// Prefix ends up inside a file name, so it cannot escape the directory
fn validate_output(config: &Config) -> Result<(), ValidationError> {
    let prefix = &config.output.filename_prefix;

    if prefix.is_empty() {
        return Err(ValidationError::EmptyPrefix);
    }

    if prefix.contains(['/', '\\']) || prefix == "." || prefix == ".." {
        return Err(ValidationError::PrefixHasSeparator {
            prefix: prefix.clone(),
        });
    }

    // The counter must always be able to step past the index it hands out
    if config.output.start_index == u64::MAX {
        return Err(ValidationError::StartIndexTooLarge);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;

    #[test]
    fn test_valid_config() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_retries() {
        let mut config = Config::default();
        config.download.max_retries = 0;

        assert!(matches!(validate(&config), Err(ValidationError::NoAttempts)));
    }

    #[test]
    fn test_zero_timeouts() {
        let mut config = Config::default();
        config.download.request_timeout_ms = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroTimeout {
                field: "download.request_timeout_ms"
            })
        ));

        let mut config = Config::default();
        config.download.connect_timeout_ms = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroTimeout { .. })
        ));
    }

    #[test]
    fn test_zero_retry_delay_is_allowed() {
        let mut config = Config::default();
        config.download.retry_delay_ms = 0;

        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_image_limit() {
        let mut config = Config::default();
        config.download.max_image_bytes = ByteSize(0);

        assert!(matches!(validate(&config), Err(ValidationError::ZeroImageLimit)));
    }

    #[test]
    fn test_prefix_rules() {
        let mut config = Config::default();
        config.output.filename_prefix = String::new();
        assert!(matches!(validate(&config), Err(ValidationError::EmptyPrefix)));

        config.output.filename_prefix = "../escape_".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::PrefixHasSeparator { .. })
        ));

        config.output.filename_prefix = "photo-".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_start_index_upper_bound() {
        let mut config = Config::default();
        config.output.start_index = u64::MAX;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::StartIndexTooLarge)
        ));

        config.output.start_index = u64::MAX - 1;
        assert!(validate(&config).is_ok());
    }
}
