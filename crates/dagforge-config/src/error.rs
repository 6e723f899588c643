//! Job file parsing errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("job file is not valid KDL: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("{0} is declared more than once")]
    Duplicate(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("invalid job: {0}")]
    Invalid(#[from] dagforge_core::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
