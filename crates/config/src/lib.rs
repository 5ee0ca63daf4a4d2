//! Gateway configuration: endpoints, limits, timeouts and optional command
//! signatures, loaded from TOML.

pub mod endpoint;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    endpoint::{ConnectEndpoint, ListenEndpoint},
    error::{Error, Result},
    loader::{DEFAULT_CONFIG_FILE, from_toml_str, load},
    schema::{CommandSignature, EndpointsConfig, GatewayConfig, LimitsConfig, TimeoutsConfig},
};
