//! Gateway-facing JSON-RPC 2.0 protocol definitions.
//!
//! Every inbound message is a single JSON object carried in one transport
//! frame. Responses echo the request `id` and carry exactly one of `result`
//! or `error`.
//!
//! - [`decode_request`]: bytes → [`InboundMessage`] (or a [`Rejected`] failure)
//! - [`encode_response`]: outcome → JSON text
//! - [`RpcError`]: the error catalogue, with stable wire codes

pub mod error;
pub mod request;
pub mod response;

pub use {
    error::{ErrorKind, ErrorObject, RpcError, error_codes},
    request::{InboundMessage, ParameterMapping, Rejected, decode_request},
    response::{OutboundResponse, ResponseBody, encode_response},
};

// ── Constants ────────────────────────────────────────────────────────────────

/// The only protocol version accepted in the `jsonrpc` field.
pub const JSONRPC_VERSION: &str = "2.0";
