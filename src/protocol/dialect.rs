//! Protocol dialects.
//!
//! Two generations of the protocol are deployed. They share the framing and
//! the call shape but differ in a handful of conventions:
//!
//! | | `Legacy` | `Current` |
//! |---|---|---|
//! | error text field | `msg` | `error` |
//! | introspection function | `list` | `functions` |
//! | handshake ends when | `data` is absent | `finished` is true |
//! | seal when unspecified | no | yes |
//! | unknown function category | `invalid function` | `unknown function` |
//!
//! The dialect is always chosen explicitly; nothing guesses it from traffic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{constants, Result, RpcError};
use crate::protocol::message::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolDialect {
    /// First generation: `msg` errors, `list`, handshake ends on missing `data`
    Legacy,
    /// Second generation: `error` errors, `functions`, explicit `finished` flag
    #[default]
    Current,
}

impl ProtocolDialect {
    pub fn name(self) -> &'static str {
        match self {
            ProtocolDialect::Legacy => "legacy",
            ProtocolDialect::Current => "current",
        }
    }

    /// Response field carrying the error text of a failed call.
    pub fn error_field(self) -> &'static str {
        match self {
            ProtocolDialect::Legacy => "msg",
            ProtocolDialect::Current => "error",
        }
    }

    /// Reserved function returning `{functions: [...]}`.
    pub fn introspection_function(self) -> &'static str {
        match self {
            ProtocolDialect::Legacy => "list",
            ProtocolDialect::Current => "functions",
        }
    }

    /// Category prefix a server uses for calls to unregistered functions.
    pub fn unknown_function_category(self) -> &'static str {
        match self {
            ProtocolDialect::Legacy => "invalid function",
            ProtocolDialect::Current => "unknown function",
        }
    }

    /// Seal preference assumed when the final auth response carries no `seal`.
    pub fn default_seal(self) -> bool {
        match self {
            ProtocolDialect::Legacy => false,
            ProtocolDialect::Current => true,
        }
    }

    /// `seal` value sent with the first auth round when the caller did not choose one.
    pub fn default_seal_request(self) -> Option<bool> {
        match self {
            ProtocolDialect::Legacy => Some(false),
            ProtocolDialect::Current => None,
        }
    }

    /// Whether an auth response ends the negotiation.
    ///
    /// # Errors
    /// `Protocol` if a current-dialect response has no `finished` flag.
    pub fn handshake_finished(self, response: &Response) -> Result<bool> {
        match self {
            ProtocolDialect::Legacy => Ok(!response.contains("data")),
            ProtocolDialect::Current => response
                .get_bool("finished")
                .ok_or_else(|| RpcError::Protocol(constants::ERR_MISSING_FINISHED.into())),
        }
    }

    /// Seal decision from the final auth response.
    pub fn negotiated_seal(self, response: &Response) -> bool {
        response
            .get_bool("seal")
            .unwrap_or_else(|| self.default_seal())
    }
}

impl fmt::Display for ProtocolDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProtocolDialect {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "v1" | "1" => Ok(ProtocolDialect::Legacy),
            "current" | "v2" | "2" => Ok(ProtocolDialect::Current),
            other => Err(RpcError::ConfigError(format!(
                "Unknown protocol dialect: '{other}' (expected 'legacy' or 'current')"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: serde_json::Value) -> Response {
        Response::from_value(value).unwrap()
    }

    #[test]
    fn test_current_requires_finished_flag() {
        let dialect = ProtocolDialect::Current;
        assert!(dialect
            .handshake_finished(&response(json!({"success": true, "finished": true})))
            .unwrap());
        assert!(!dialect
            .handshake_finished(&response(json!({"success": true, "finished": false, "data": ""})))
            .unwrap());
        assert!(matches!(
            dialect.handshake_finished(&response(json!({"success": true, "data": "AA=="}))),
            Err(RpcError::Protocol(_))
        ));
    }

    #[test]
    fn test_legacy_finishes_without_data() {
        let dialect = ProtocolDialect::Legacy;
        assert!(!dialect
            .handshake_finished(&response(json!({"success": true, "data": "AA=="})))
            .unwrap());
        assert!(dialect
            .handshake_finished(&response(json!({"success": true, "user": "alice"})))
            .unwrap());
    }

    #[test]
    fn test_seal_defaults() {
        let done = response(json!({"success": true, "finished": true}));
        assert!(ProtocolDialect::Current.negotiated_seal(&done));
        assert!(!ProtocolDialect::Legacy.negotiated_seal(&done));

        let plain = response(json!({"success": true, "finished": true, "seal": false}));
        assert!(!ProtocolDialect::Current.negotiated_seal(&plain));

        let numeric = response(json!({"success": true, "seal": 1}));
        assert!(ProtocolDialect::Legacy.negotiated_seal(&numeric));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            "legacy".parse::<ProtocolDialect>().unwrap(),
            ProtocolDialect::Legacy
        );
        assert_eq!(" V2 ".parse::<ProtocolDialect>().unwrap(), ProtocolDialect::Current);
        assert!("v3".parse::<ProtocolDialect>().is_err());
    }
}
