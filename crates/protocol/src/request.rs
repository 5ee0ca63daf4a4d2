use serde_json::{Map, Value};

use crate::{JSONRPC_VERSION, error::RpcError};

/// Keyword arguments of a single request.
pub type ParameterMapping = Map<String, Value>;

/// A validated JSON-RPC request or notification.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub method: String,
    /// Copied verbatim into the response. `None` marks a notification.
    pub id: Option<Value>,
    pub params: ParameterMapping,
}

impl InboundMessage {
    pub fn requires_answer(&self) -> bool {
        self.id.is_some()
    }
}

/// A request that failed validation.
///
/// `id` is whatever identifier could be read before the failure; a reply is
/// owed only when it is present. The identifier is taken right after parsing,
/// so a request with a bad version, method or `params` but a usable `id`
/// still gets an error reply, as JSON-RPC 2.0 asks.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub id: Option<Value>,
    pub error: RpcError,
}

fn reject(id: &Option<Value>, error: RpcError) -> Rejected {
    Rejected {
        id: id.clone(),
        error,
    }
}

/// Parse and validate one inbound frame.
pub fn decode_request(bytes: &[u8]) -> Result<InboundMessage, Rejected> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| Rejected {
        id: None,
        error: RpcError::parse(e.to_string()),
    })?;
    let Value::Object(mut obj) = value else {
        return Err(Rejected {
            id: None,
            error: RpcError::parse("top-level value is not an object"),
        });
    };

    let id = match obj.remove("id") {
        None | Some(Value::Null) => None,
        Some(id) => Some(id),
    };

    match obj.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {},
        Some(other) => {
            return Err(reject(
                &id,
                RpcError::invalid_request(format!("unsupported jsonrpc version {other}")),
            ));
        },
        None => {
            return Err(reject(
                &id,
                RpcError::invalid_request("missing jsonrpc version"),
            ));
        },
    }

    let method = match obj.remove("method") {
        Some(Value::String(method)) => method,
        Some(_) => {
            return Err(reject(
                &id,
                RpcError::invalid_request("method is not a string"),
            ));
        },
        None => return Err(reject(&id, RpcError::invalid_request("missing method"))),
    };

    let params = match obj.remove("params") {
        Some(Value::Array(items)) => single_mapping(items).map_err(|e| reject(&id, e))?,
        Some(_) => {
            return Err(reject(
                &id,
                RpcError::invalid_request("params is not a sequence"),
            ));
        },
        None => return Err(reject(&id, RpcError::invalid_request("missing params"))),
    };

    Ok(InboundMessage { method, id, params })
}

fn single_mapping(items: Vec<Value>) -> Result<ParameterMapping, RpcError> {
    let count = items.len();
    let mut items = items.into_iter();
    match (items.next(), count) {
        (Some(Value::Object(params)), 1) => Ok(params),
        (Some(_), 1) => Err(RpcError::bad_parameters(
            "the single parameter is not a mapping",
        )),
        _ => Err(RpcError::bad_parameters(format!(
            "expected exactly one parameter mapping, got {count} parameters"
        ))),
    }
}
