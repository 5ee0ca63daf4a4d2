//! Client-side support for the Asynchronous Messaging Protocol (AMP).
//!
//! An AMP message is a box of byte-string keys and values. Commands travel
//! as boxes carrying `_command` (and `_ask` when an answer is wanted);
//! answers carry `_answer`, failures carry `_error`.

pub mod argument;
pub mod boxes;
pub mod client;
pub mod codec;
pub mod error;
pub mod value;

pub use {
    argument::{ArgumentValue, ValueKind, encode_all},
    boxes::{AmpBox, MAX_KEY_LENGTH, MAX_VALUE_LENGTH, UNHANDLED_ERROR_CODE, keys},
    client::AmpClient,
    codec::AmpCodec,
    error::{Error, Result},
    value::{decode_answer, decode_value, infer_value},
};
