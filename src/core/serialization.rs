//! # Payload Serialization
//!
//! Packet payloads are UTF-8 JSON text. Calls travel as a two element array
//! `[function, arguments]`, results as an object carrying at least `success`.
//!
//! An empty payload is not malformed: it decodes as an empty object, which a
//! response check then reports as a missing return code.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, RpcError};

/// Serialize any JSON-representable value to compact JSON bytes.
pub fn encode<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(value).map_err(|e| RpcError::SerializeError(e.to_string()))
}

/// Parse a payload; an empty buffer yields `{}`.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(bytes).map_err(|e| RpcError::DeserializeError(e.to_string()))
}

/// Parse a payload straight into a typed value.
pub fn decode_as<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let value = decode(bytes)?;
    serde_json::from_value(value).map_err(|e| RpcError::DeserializeError(e.to_string()))
}
