//! Call and Result shapes exchanged inside frames.
//!
//! A call is `[function, {name: value, ...}]`. A result is an object with a
//! `success` flag and whatever else the remote function returns.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{constants, RemoteError, Result, RpcError};
use crate::protocol::dialect::ProtocolDialect;

/// Named arguments of a call.
pub type Arguments = Map<String, Value>;

/// Convert any serializable value to JSON.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| RpcError::SerializeError(e.to_string()))
}

/// Convert a serializable value into call arguments.
///
/// Objects become the argument map, `null` (e.g. `()`) becomes no arguments.
/// Anything else cannot be expressed as named arguments.
pub fn to_arguments<T: Serialize + ?Sized>(value: &T) -> Result<Arguments> {
    match to_value(value)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Arguments::new()),
        other => Err(RpcError::SerializeError(format!(
            "call arguments must be a JSON object, got {other}"
        ))),
    }
}

/// A function call: name plus named arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub function: String,
    pub arguments: Arguments,
}

impl Call {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            arguments: Arguments::new(),
        }
    }

    pub fn with_arguments(function: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            function: function.into(),
            arguments,
        }
    }

    /// Add one named argument. A repeated name replaces the earlier value.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }
}

impl Serialize for Call {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (&self.function, &self.arguments).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Call {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (function, arguments) = <(String, Arguments)>::deserialize(deserializer)?;
        Ok(Self {
            function,
            arguments,
        })
    }
}

/// Result object returned by the remote.
///
/// `fields` always holds the complete object, `success` included.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    success: bool,
    fields: Map<String, Value>,
}

impl Default for Response {
    fn default() -> Self {
        let mut fields = Map::new();
        fields.insert("success".into(), Value::Bool(false));
        Self {
            success: false,
            fields,
        }
    }
}

impl Response {
    /// Validate a decoded payload as a result object.
    ///
    /// # Errors
    /// `Protocol("missing return code")` when there is no `success` key, even
    /// if other fields are present.
    pub fn from_value(value: Value) -> Result<Self> {
        let fields = match value {
            Value::Object(map) => map,
            _ => return Err(RpcError::Protocol(constants::ERR_RESPONSE_NOT_OBJECT.into())),
        };

        let success = match fields.get("success") {
            None => return Err(RpcError::Protocol(constants::ERR_MISSING_RETURN_CODE.into())),
            Some(flag) => truthiness(flag)
                .ok_or_else(|| RpcError::Protocol(constants::ERR_INVALID_RETURN_CODE.into()))?,
        };

        Ok(Self { success, fields })
    }

    /// Successful result carrying `fields`.
    pub fn success(mut fields: Map<String, Value>) -> Self {
        fields.insert("success".into(), Value::Bool(true));
        Self {
            success: true,
            fields,
        }
    }

    /// Successful result with no other fields.
    pub fn ok() -> Self {
        Self::success(Map::new())
    }

    /// Failed result with `message` under the dialect's error field.
    pub fn failure(dialect: ProtocolDialect, message: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("success".into(), Value::Bool(false));
        fields.insert(
            dialect.error_field().into(),
            Value::String(message.into()),
        );
        Self {
            success: false,
            fields,
        }
    }

    /// Add or replace a field. `success` cannot be changed this way.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "success" {
            self.fields.insert(key, value.into());
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Boolean field; integers count as flags (non-zero is true), `null` as false.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(truthiness)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Error text of a failed result, `"unknown error"` if the remote sent none.
    pub fn error_message(&self, dialect: ProtocolDialect) -> &str {
        self.get_str(dialect.error_field())
            .unwrap_or(constants::ERR_UNKNOWN_REMOTE_ERROR)
    }

    /// Turn a failed result into a classified [`RemoteError`].
    pub fn into_result(self, dialect: ProtocolDialect) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        let message = self.error_message(dialect).to_owned();
        Err(RpcError::Remote(RemoteError::new(message, self)))
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

fn truthiness(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Null => Some(false),
        Value::Number(n) => n
            .as_i64()
            .map(|v| v != 0)
            .or_else(|| n.as_u64().map(|v| v != 0))
            .or_else(|| n.as_f64().map(|v| v != 0.0)),
        _ => None,
    }
}
