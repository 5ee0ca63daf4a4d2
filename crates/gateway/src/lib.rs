//! JSON-RPC 2.0 to AMP gateway.
//!
//! Each client connection gets its own backend connection. Inbound
//! netstring frames are decoded as JSON-RPC requests, forwarded to the AMP
//! backend, and answered in request order.
//!
//! Transports: netstrings over TCP ([`GatewayServer::serve_netstring`]) and
//! netstrings tunneled through WebSocket messages
//! ([`GatewayServer::serve_websocket`]).

pub mod backend;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod netstring;
pub mod pipeline;
pub mod server;
pub mod websocket;

pub use {
    backend::{AmpConnector, Backend, BackendConnector, BackendError},
    connection::{ConnectionSettings, ConnectionState, GatewayConnection},
    dispatch::Dispatcher,
    error::{Error, Result},
    netstring::NetstringCodec,
    server::GatewayServer,
};
