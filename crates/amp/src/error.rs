use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed box: {0}")]
    Malformed(String),

    #[error("box key is {length} bytes, the limit is {max}")]
    KeyTooLong { length: usize, max: usize },

    #[error("value for {key:?} is {length} bytes, the limit is {max}")]
    ValueTooLong {
        key: String,
        length: usize,
        max: usize,
    },

    #[error("{0}")]
    Unsupported(String),

    #[error("argument {name:?}: {reason}")]
    Argument { name: String, reason: String },

    #[error("AMP connection closed")]
    ConnectionClosed,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote error {code}: {description}")]
    Remote { code: String, description: String },
}

impl Error {
    #[must_use]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    #[must_use]
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
