//! The backend collaborator: something that executes named commands.

use std::{sync::Arc, time::Duration};

use {
    ampgate_amp::{AmpBox, AmpClient, UNHANDLED_ERROR_CODE},
    ampgate_config::ConnectEndpoint,
    ampgate_protocol::{RpcError, error_codes},
    async_trait::async_trait,
    tracing::debug,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The arguments do not fit what `method` accepts.
    #[error("{method}: {detail}")]
    Signature { method: String, detail: String },

    /// The backend answered with an error box.
    #[error("remote error {code}: {description}")]
    Remote { code: String, description: String },

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),

    #[error("backend protocol error: {0}")]
    Protocol(String),
}

impl BackendError {
    /// Classify a client error raised while calling `method`.
    pub fn from_amp(method: &str, err: ampgate_amp::Error) -> Self {
        use ampgate_amp::Error as Amp;
        match err {
            Amp::Remote { code, description } => Self::Remote { code, description },
            Amp::ConnectionClosed => Self::Unavailable("connection closed".into()),
            Amp::Io(e) => Self::Unavailable(e.to_string()),
            Amp::Timeout(after) => Self::Timeout(after),
            e @ (Amp::KeyTooLong { .. }
            | Amp::ValueTooLong { .. }
            | Amp::Argument { .. }
            | Amp::Unsupported(_)) => Self::Signature {
                method: method.to_owned(),
                detail: e.to_string(),
            },
            Amp::Malformed(detail) => Self::Protocol(detail),
        }
    }
}

impl From<BackendError> for RpcError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Signature { method, detail } => {
                Self::bad_parameters(format!("{method}: {detail}"))
            },
            BackendError::Remote { code, description } => {
                if let Ok(numeric) = code.parse::<i64>() {
                    Self::backend(numeric, description)
                } else if code == UNHANDLED_ERROR_CODE {
                    Self::backend(
                        error_codes::METHOD_NOT_FOUND,
                        format!("Method not found: {description}"),
                    )
                } else if description.is_empty() {
                    Self::backend(error_codes::BACKEND_ERROR, code)
                } else {
                    Self::backend(error_codes::BACKEND_ERROR, description)
                }
            },
            BackendError::Unavailable(detail) => Self::backend_unavailable(detail),
            BackendError::Timeout(after) => Self::timeout(format!("no answer within {after:?}")),
            BackendError::Protocol(detail) => Self::internal(detail),
        }
    }
}

// ── Traits ───────────────────────────────────────────────────────────────────

/// A connected backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Run `method` with `arguments`.
    ///
    /// Returns the answer box when `requires_answer` is set, `None` otherwise.
    async fn call_remote(
        &self,
        method: &str,
        requires_answer: bool,
        arguments: AmpBox,
    ) -> Result<Option<AmpBox>, BackendError>;
}

/// Opens one backend connection per client connection.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Backend>, BackendError>;
}

// ── AMP implementation ───────────────────────────────────────────────────────

#[async_trait]
impl Backend for AmpClient {
    async fn call_remote(
        &self,
        method: &str,
        requires_answer: bool,
        arguments: AmpBox,
    ) -> Result<Option<AmpBox>, BackendError> {
        AmpClient::call_remote(self, method, requires_answer, arguments)
            .await
            .map_err(|e| BackendError::from_amp(method, e))
    }
}

/// Dials the configured AMP service.
pub struct AmpConnector {
    target: ConnectEndpoint,
    timeout: Duration,
}

impl AmpConnector {
    pub fn new(target: ConnectEndpoint, timeout: Duration) -> Self {
        Self { target, timeout }
    }
}

#[async_trait]
impl BackendConnector for AmpConnector {
    async fn connect(&self) -> Result<Arc<dyn Backend>, BackendError> {
        let address = self.target.address();
        debug!(%address, "dialing AMP backend");
        match AmpClient::connect(&address, self.timeout).await {
            Ok(client) => Ok(Arc::new(client)),
            Err(ampgate_amp::Error::Timeout(after)) => Err(BackendError::Timeout(after)),
            Err(e) => Err(BackendError::Unavailable(format!("{address}: {e}"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, ampgate_protocol::ErrorKind, rstest::rstest};

    fn remote(code: &str, description: &str) -> RpcError {
        BackendError::Remote {
            code: code.into(),
            description: description.into(),
        }
        .into()
    }

    #[test]
    fn unhandled_maps_to_method_not_found() {
        let err = remote("UNHANDLED", "Unhandled Command: 'Nope'");
        assert_eq!(err.code(), -32_601);
        assert_eq!(err.message(), "Method not found: Unhandled Command: 'Nope'");
    }

    #[test]
    fn numeric_codes_are_carried() {
        let err = remote("42", "custom failure");
        assert_eq!(err.code(), 42);
        assert_eq!(err.message(), "custom failure");
    }

    #[test]
    fn symbolic_codes_become_backend_errors() {
        let err = remote("ZERO_DIVISION", "Divide by zero");
        assert_eq!(err.code(), -32_001);
        assert_eq!(err.message(), "Divide by zero");
        assert_eq!(remote("UNKNOWN", "").message(), "UNKNOWN");
    }

    #[rstest]
    #[case(BackendError::Unavailable("gone".into()), ErrorKind::BackendUnavailable)]
    #[case(BackendError::Timeout(Duration::from_secs(1)), ErrorKind::Timeout)]
    #[case(BackendError::Protocol("bad box".into()), ErrorKind::Internal)]
    #[case(
        BackendError::Signature { method: "Add".into(), detail: "missing b".into() },
        ErrorKind::BadParameters
    )]
    fn error_kinds(#[case] err: BackendError, #[case] kind: ErrorKind) {
        assert_eq!(RpcError::from(err).kind(), kind);
    }

    #[test]
    fn amp_errors_are_classified() {
        assert_eq!(
            BackendError::from_amp("Add", ampgate_amp::Error::ConnectionClosed),
            BackendError::Unavailable("connection closed".into())
        );
        assert!(matches!(
            BackendError::from_amp("Add", ampgate_amp::Error::KeyTooLong {
                length: 300,
                max: 255
            }),
            BackendError::Signature { ref method, .. } if method == "Add"
        ));
    }

    #[tokio::test]
    async fn connector_reports_unreachable_backend() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = AmpConnector::new(
            format!("127.0.0.1:{port}").parse().unwrap(),
            Duration::from_secs(5),
        );
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }
}
