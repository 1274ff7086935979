use thiserror::Error;

/// Main error type for lockwire core operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl CoreError {
    /// Get the error code for JSON output
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidConfig(_) => "invalid_config",
            CoreError::NotFound(_) => "not_found",
            CoreError::Io(_) => "io_error",
            CoreError::TomlParse(_) => "invalid_config",
        }
    }
}
