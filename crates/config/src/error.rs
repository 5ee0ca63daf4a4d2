use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error("invalid endpoint {descriptor:?}: {reason}")]
    InvalidEndpoint { descriptor: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Error {
    #[must_use]
    pub fn invalid_endpoint(descriptor: &str, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            descriptor: descriptor.to_owned(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
