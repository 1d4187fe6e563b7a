use thiserror::Error;

/// Episode settings loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid timeout_ms: {0} (must be > 0)")]
    InvalidTimeout(u64),

    #[error("Invalid port: 0 is reserved")]
    InvalidPort,

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::Io(_)));
    }

    #[test]
    fn config_error_from_toml() {
        let toml_err = toml::from_str::<toml::Value>("not [ valid").unwrap_err();
        let config_err: ConfigError = toml_err.into();
        assert!(matches!(config_err, ConfigError::Toml(_)));
    }

    #[test]
    fn config_error_display_messages() {
        assert_eq!(
            ConfigError::InvalidTimeout(0).to_string(),
            "Invalid timeout_ms: 0 (must be > 0)"
        );
        assert_eq!(
            ConfigError::InvalidPort.to_string(),
            "Invalid port: 0 is reserved"
        );
        assert_eq!(
            ConfigError::InvalidValue {
                field: "weather_id".into(),
                message: "must be >= 0".into()
            }
            .to_string(),
            "Invalid value for weather_id: must be >= 0"
        );
    }
}
