//! Type-directed encoding of JSON parameter values into AMP argument bytes.

use std::{fmt, str::FromStr};

use {
    bytes::{BufMut, Bytes, BytesMut},
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

use crate::{
    AmpBox,
    boxes::{MAX_KEY_LENGTH, MAX_VALUE_LENGTH, keys},
    error::{Error, Result},
};

// ── Kinds ────────────────────────────────────────────────────────────────────

/// The AMP argument type a value is encoded as.
///
/// Written in configuration as `integer`, `float`, `unicode` (alias `text`,
/// `string`) or `list<kind>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueKind {
    Integer,
    Float,
    Text,
    List(Box<ValueKind>),
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("integer"),
            Self::Float => f.write_str("float"),
            Self::Text => f.write_str("unicode"),
            Self::List(element) => write!(f, "list<{element}>"),
        }
    }
}

impl FromStr for ValueKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "unicode" | "text" | "string" => Ok(Self::Text),
            lower => lower
                .strip_prefix("list<")
                .and_then(|rest| rest.strip_suffix('>'))
                .ok_or_else(|| Error::unsupported(format!("unknown value kind {s:?}")))?
                .parse()
                .map(|element| Self::List(Box::new(element))),
        }
    }
}

impl TryFrom<String> for ValueKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ValueKind> for String {
    fn from(kind: ValueKind) -> Self {
        kind.to_string()
    }
}

// ── Values ───────────────────────────────────────────────────────────────────

/// A parameter value that has an AMP encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Integer(i64),
    Float(f64),
    Text(String),
    /// Non-empty and homogeneous: every item has kind `element`.
    List {
        element: ValueKind,
        items: Vec<ArgumentValue>,
    },
}

impl ArgumentValue {
    /// Classify a decoded JSON value.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            // Numbers keep their source text, so an integer literal that does
            // not fit an i64 is never mistaken for a float.
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Integer(i))
                } else if n.is_f64() {
                    n.as_f64()
                        .map(Self::Float)
                        .ok_or_else(|| Error::unsupported(format!("number {n} has no encoding")))
                } else {
                    Err(Error::unsupported(format!("number {n} is out of range")))
                }
            },
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Array(items) => {
                let items = items
                    .iter()
                    .map(Self::from_json)
                    .collect::<Result<Vec<_>>>()?;
                let Some(first) = items.first() else {
                    return Err(Error::unsupported("empty list has no element type"));
                };
                let element = first.kind();
                if let Some(odd) = items.iter().find(|item| item.kind() != element) {
                    return Err(Error::unsupported(format!(
                        "list of {element} contains a {}",
                        odd.kind()
                    )));
                }
                Ok(Self::List { element, items })
            },
            Value::Bool(_) => Err(Error::unsupported("booleans are not supported")),
            Value::Null => Err(Error::unsupported("null is not supported")),
            Value::Object(_) => Err(Error::unsupported("mappings are not supported")),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Integer(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::List { element, .. } => ValueKind::List(Box::new(element.clone())),
        }
    }

    /// Wire bytes for this value.
    pub fn encode(&self) -> Result<Bytes> {
        match self {
            Self::Integer(i) => Ok(Bytes::from(i.to_string())),
            // `{:?}` is the shortest text that parses back to the same f64.
            Self::Float(f) => Ok(Bytes::from(format!("{f:?}"))),
            Self::Text(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            Self::List { items, .. } => {
                let mut buf = BytesMut::new();
                for item in items {
                    let encoded = item.encode()?;
                    if encoded.len() > MAX_VALUE_LENGTH {
                        return Err(Error::unsupported(format!(
                            "list element is {} bytes, the limit is {MAX_VALUE_LENGTH}",
                            encoded.len()
                        )));
                    }
                    buf.put_u16(encoded.len() as u16);
                    buf.put_slice(&encoded);
                }
                Ok(buf.freeze())
            },
        }
    }
}

/// Encode every parameter of a request into a box of arguments.
pub fn encode_all(params: &Map<String, Value>) -> Result<AmpBox> {
    let mut amp_box = AmpBox::new();
    for (name, value) in params {
        let argument_error = |reason: String| Error::Argument {
            name: name.clone(),
            reason,
        };
        if name.is_empty() || name.len() > MAX_KEY_LENGTH {
            return Err(argument_error(format!(
                "names must be 1 to {MAX_KEY_LENGTH} bytes"
            )));
        }
        if keys::is_reserved(name) {
            return Err(argument_error("names starting with '_' are reserved".into()));
        }
        let encoded = ArgumentValue::from_json(value)
            .and_then(|v| v.encode())
            .map_err(|e| argument_error(e.to_string()))?;
        if encoded.len() > MAX_VALUE_LENGTH {
            return Err(argument_error(format!(
                "encoded value is {} bytes, the limit is {MAX_VALUE_LENGTH}",
                encoded.len()
            )));
        }
        amp_box.insert(name.clone(), encoded);
    }
    Ok(amp_box)
}
