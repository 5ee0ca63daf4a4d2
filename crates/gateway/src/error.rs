use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tungstenite(Box<tokio_tungstenite::tungstenite::Error>),

    #[error(transparent)]
    Config(#[from] ampgate_config::Error),

    #[error("netstring length prefix is malformed")]
    NetstringLength,

    #[error("netstring of {length} bytes exceeds the {max} byte limit")]
    FrameTooLarge { length: usize, max: usize },

    #[error("netstring is missing its ',' terminator")]
    MissingTerminator,

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Tungstenite(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
