use {
    serde::Serialize,
    serde_json::{Map, Value},
};

use crate::{
    JSONRPC_VERSION,
    error::{ErrorObject, RpcError},
};

/// Used only if serialisation itself fails, which a `Map` of JSON values
/// cannot do in practice.
const FALLBACK_RESPONSE: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"}}"#;

#[derive(Debug, Clone, Serialize)]
pub struct OutboundResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseBody {
    Result(Map<String, Value>),
    Error(ErrorObject),
}

impl OutboundResponse {
    pub fn new(outcome: Result<Map<String, Value>, RpcError>, id: Option<Value>) -> Self {
        let body = match outcome {
            Ok(result) => ResponseBody::Result(result),
            Err(err) => ResponseBody::Error(err.to_error_object()),
        };
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            body,
        }
    }
}

/// Render the response envelope for a finished request.
pub fn encode_response(outcome: Result<Map<String, Value>, RpcError>, id: Option<Value>) -> String {
    serde_json::to_string(&OutboundResponse::new(outcome, id))
        .unwrap_or_else(|_| FALLBACK_RESPONSE.to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, serde_json::json};

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn success_envelope() {
        let mut result = Map::new();
        result.insert("sum".into(), json!(4));
        let text = encode_response(Ok(result), Some(json!(1)));
        assert_eq!(
            parse(&text),
            json!({"jsonrpc": "2.0", "id": 1, "result": {"sum": 4}})
        );
    }

    #[test]
    fn failure_envelope() {
        let text = encode_response(Err(RpcError::bad_parameters("two mappings")), Some(json!("a")));
        let value = parse(&text);
        assert_eq!(value["id"], json!("a"));
        assert_eq!(value["error"]["code"], json!(-32_000));
        assert_eq!(
            value["error"]["message"],
            json!("Requests need a single parameter mapping with keyword arguments")
        );
        assert!(value.get("result").is_none());
        assert!(!text.contains("two mappings"));
    }

    #[test]
    fn id_omitted_when_absent() {
        let text = encode_response(Ok(Map::new()), None);
        assert_eq!(parse(&text), json!({"jsonrpc": "2.0", "result": {}}));
    }

    #[test]
    fn backend_error_passthrough() {
        let text = encode_response(Err(RpcError::backend(17, "boom")), Some(json!(3)));
        assert_eq!(
            parse(&text),
            json!({"jsonrpc": "2.0", "id": 3, "error": {"code": 17, "message": "boom"}})
        );
    }

    #[test]
    fn fallback_is_valid_json() {
        let value = parse(FALLBACK_RESPONSE);
        assert_eq!(value["error"]["code"], json!(-32_603));
    }
}
