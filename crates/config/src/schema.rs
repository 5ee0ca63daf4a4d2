use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use {
    ampgate_amp::ValueKind,
    serde::{Deserialize, Serialize},
};

use crate::{
    endpoint::{ConnectEndpoint, ListenEndpoint},
    error::{Error, Result},
};

/// Root configuration, as read from `ampgate.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub gateway: EndpointsConfig,
    pub limits: LimitsConfig,
    pub timeouts: TimeoutsConfig,
    /// Optional signatures, keyed by method name.
    pub commands: HashMap<String, CommandSignature>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointsConfig {
    /// Netstring-over-TCP listener.
    pub netstring: Option<ListenEndpoint>,
    /// Netstrings tunneled through WebSocket messages.
    pub websocket: Option<ListenEndpoint>,
    /// The AMP service every request is forwarded to.
    pub backend: Option<ConnectEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest accepted netstring payload.
    pub max_frame_bytes: usize,
    /// Requests dispatched concurrently per client connection.
    pub max_in_flight: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 524_288,
            max_in_flight: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutsConfig {
    pub connect_ms: u64,
    pub call_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_ms: 10_000,
            call_ms: 30_000,
        }
    }
}

impl TimeoutsConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn call(&self) -> Duration {
        Duration::from_millis(self.call_ms)
    }
}

/// What a backend command accepts and answers.
///
/// ```toml
/// [commands.Add]
/// arguments = ["a", "b"]
/// response = { sum = "integer" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandSignature {
    pub arguments: Vec<String>,
    pub response: BTreeMap<String, ValueKind>,
}

impl CommandSignature {
    /// Check that `names` is exactly the declared argument set.
    ///
    /// On mismatch the error lists missing and unexpected names.
    pub fn check_arguments<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> std::result::Result<(), String> {
        let given: Vec<&str> = names.into_iter().collect();
        let missing: Vec<&str> = self
            .arguments
            .iter()
            .map(String::as_str)
            .filter(|declared| !given.contains(declared))
            .collect();
        let unexpected: Vec<&str> = given
            .iter()
            .copied()
            .filter(|name| !self.arguments.iter().any(|declared| declared == name))
            .collect();
        if missing.is_empty() && unexpected.is_empty() {
            return Ok(());
        }
        Err(format!("missing {missing:?}, unexpected {unexpected:?}"))
    }
}

impl GatewayConfig {
    /// Reject configurations the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.netstring.is_none() && self.gateway.websocket.is_none() {
            return Err(Error::invalid(
                "at least one of gateway.netstring or gateway.websocket must be set",
            ));
        }
        if self.gateway.backend.is_none() {
            return Err(Error::invalid("gateway.backend must be set"));
        }
        if self.limits.max_in_flight == 0 {
            return Err(Error::invalid("limits.max_in_flight must be at least 1"));
        }
        if self.limits.max_frame_bytes == 0 {
            return Err(Error::invalid("limits.max_frame_bytes must be at least 1"));
        }
        if self.timeouts.connect_ms == 0 || self.timeouts.call_ms == 0 {
            return Err(Error::invalid("timeouts must be non-zero"));
        }
        for (name, signature) in &self.commands {
            if let Some(reserved) = signature
                .arguments
                .iter()
                .chain(signature.response.keys())
                .find(|field| field.starts_with('_'))
            {
                return Err(Error::invalid(format!(
                    "commands.{name}: field {reserved:?} uses the reserved '_' prefix"
                )));
            }
        }
        Ok(())
    }
}
