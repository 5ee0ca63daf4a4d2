//! Decoding answer boxes back into JSON values.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use crate::{
    AmpBox,
    argument::ValueKind,
    boxes::keys,
    error::{Error, Result},
};

fn utf8(raw: &[u8]) -> Result<&str> {
    std::str::from_utf8(raw).map_err(|_| Error::malformed("value is not valid UTF-8"))
}

fn float(f: f64) -> Result<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| Error::malformed(format!("float {f} has no JSON representation")))
}

/// Split a `ListOf` payload into its length-prefixed elements.
fn list_elements(mut raw: &[u8]) -> Result<Vec<&[u8]>> {
    let mut elements = Vec::new();
    while !raw.is_empty() {
        let [hi, lo, rest @ ..] = raw else {
            return Err(Error::malformed("truncated list element length"));
        };
        let len = usize::from(u16::from_be_bytes([*hi, *lo]));
        if rest.len() < len {
            return Err(Error::malformed("truncated list element"));
        }
        let (element, tail) = rest.split_at(len);
        elements.push(element);
        raw = tail;
    }
    Ok(elements)
}

/// Decode a value whose AMP type is known.
pub fn decode_value(kind: &ValueKind, raw: &[u8]) -> Result<Value> {
    match kind {
        ValueKind::Integer => {
            let text = utf8(raw)?;
            text.trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| Error::malformed(format!("integer {text:?}: {e}")))
        },
        ValueKind::Float => {
            let text = utf8(raw)?;
            let f = text
                .trim()
                .parse::<f64>()
                .map_err(|e| Error::malformed(format!("float {text:?}: {e}")))?;
            float(f)
        },
        ValueKind::Text => utf8(raw).map(Value::from),
        ValueKind::List(element) => list_elements(raw)?
            .into_iter()
            .map(|item| decode_value(element, item))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
    }
}

fn is_integer_text(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'))
}

fn is_float_text(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    body.starts_with(|c: char| c.is_ascii_digit())
        && body.contains(['.', 'e', 'E'])
        && body
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
}

/// Decode a value of unknown AMP type.
///
/// Canonical integer text becomes a number, decimal float text becomes a
/// number, anything else is returned as text (lossily, if it is not UTF-8).
pub fn infer_value(raw: &[u8]) -> Value {
    let Ok(text) = std::str::from_utf8(raw) else {
        return Value::String(String::from_utf8_lossy(raw).into_owned());
    };
    if is_integer_text(text)
        && let Ok(i) = text.parse::<i64>()
    {
        return Value::from(i);
    }
    if is_float_text(text)
        && let Ok(f) = text.parse::<f64>()
        && let Ok(value) = float(f)
    {
        return value;
    }
    Value::String(text.to_owned())
}

/// Turn an answer box into a JSON mapping.
///
/// Protocol keys are skipped. Fields listed in `kinds` are decoded with their
/// declared type; everything else is inferred.
pub fn decode_answer(
    answer: &AmpBox,
    kinds: Option<&BTreeMap<String, ValueKind>>,
) -> Result<Map<String, Value>> {
    let mut result = Map::new();
    for (key, raw) in answer {
        if keys::is_reserved(key) {
            continue;
        }
        let value = match kinds.and_then(|k| k.get(key)) {
            Some(kind) => decode_value(kind, raw)
                .map_err(|e| Error::malformed(format!("answer field {key:?}: {e}")))?,
            None => infer_value(raw),
        };
        result.insert(key.clone(), value);
    }
    Ok(result)
}
