use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    // JSON-RPC 2.0 reserved codes
    pub const PARSE_ERROR: i64 = -32_700;
    pub const INVALID_REQUEST: i64 = -32_600;
    pub const METHOD_NOT_FOUND: i64 = -32_601;
    pub const INVALID_PARAMS: i64 = -32_602;
    pub const INTERNAL_ERROR: i64 = -32_603;

    // Gateway codes (server error range)
    pub const BAD_PARAMETERS: i64 = -32_000;
    pub const BACKEND_ERROR: i64 = -32_001;
    pub const BACKEND_UNAVAILABLE: i64 = -32_002;
    pub const BACKEND_TIMEOUT: i64 = -32_003;
}

// ── Error shape ──────────────────────────────────────────────────────────────

/// The `error` member of a failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
}

// ── Error catalogue ──────────────────────────────────────────────────────────

/// Named error categories, one per [`RpcError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    InvalidRequest,
    BadParameters,
    Encoding,
    BackendUnavailable,
    Timeout,
    Internal,
    Backend,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parse => "parse",
            Self::InvalidRequest => "invalid_request",
            Self::BadParameters => "bad_parameters",
            Self::Encoding => "encoding",
            Self::BackendUnavailable => "backend_unavailable",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
            Self::Backend => "backend",
        })
    }
}

/// A request failure.
///
/// `code()` and `message()` are what the client sees. The `detail` carried by
/// the gateway-side variants is for the operational log only and never leaves
/// the process. Backend failures carry their own code and message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("parse error: {detail}")]
    Parse { detail: String },

    #[error("invalid request: {detail}")]
    InvalidRequest { detail: String },

    #[error("bad parameters: {detail}")]
    BadParameters { detail: String },

    #[error("unsupported parameter: {detail}")]
    Encoding { detail: String },

    #[error("backend unavailable: {detail}")]
    BackendUnavailable { detail: String },

    #[error("backend timeout: {detail}")]
    Timeout { detail: String },

    #[error("internal error: {detail}")]
    Internal { detail: String },

    #[error("backend error {code}: {message}")]
    Backend { code: i64, message: String },
}

impl RpcError {
    #[must_use]
    pub fn parse(detail: impl Into<String>) -> Self {
        Self::Parse {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::InvalidRequest {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn bad_parameters(detail: impl Into<String>) -> Self {
        Self::BadParameters {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn encoding(detail: impl Into<String>) -> Self {
        Self::Encoding {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn backend_unavailable(detail: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::Timeout {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn backend(code: i64, message: impl Into<String>) -> Self {
        Self::Backend {
            code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::Parse,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::BadParameters { .. } => ErrorKind::BadParameters,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Internal { .. } => ErrorKind::Internal,
            Self::Backend { .. } => ErrorKind::Backend,
        }
    }

    /// Wire code.
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse { .. } => error_codes::PARSE_ERROR,
            Self::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            Self::BadParameters { .. } => error_codes::BAD_PARAMETERS,
            Self::Encoding { .. } => error_codes::INVALID_PARAMS,
            Self::BackendUnavailable { .. } => error_codes::BACKEND_UNAVAILABLE,
            Self::Timeout { .. } => error_codes::BACKEND_TIMEOUT,
            Self::Internal { .. } => error_codes::INTERNAL_ERROR,
            Self::Backend { code, .. } => *code,
        }
    }

    /// Wire message.
    pub fn message(&self) -> Cow<'_, str> {
        match self {
            Self::Parse { .. } => Cow::Borrowed("Parse error"),
            Self::InvalidRequest { .. } => Cow::Borrowed("Invalid request"),
            Self::BadParameters { .. } => Cow::Borrowed(
                "Requests need a single parameter mapping with keyword arguments",
            ),
            Self::Encoding { .. } => Cow::Borrowed("Unsupported parameter type"),
            Self::BackendUnavailable { .. } => Cow::Borrowed("Backend unavailable"),
            Self::Timeout { .. } => Cow::Borrowed("Backend timeout"),
            Self::Internal { .. } => Cow::Borrowed("Internal error"),
            Self::Backend { message, .. } => Cow::Borrowed(message.as_str()),
        }
    }

    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject {
            code: self.code(),
            message: self.message().into_owned(),
        }
    }
}
