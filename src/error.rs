//! # Error Types
//!
//! Comprehensive error handling for the RPC protocol.
//!
//! This module defines all error variants that can occur during protocol operations,
//! from low-level stream failures to failures reported by the remote function itself.
//!
//! ## Error Categories
//! - **Transport Errors**: I/O failures, streams closed mid-read, oversized packets
//! - **Framing Errors**: Invalid packet headers (`ProtocolMismatch`)
//! - **Protocol Errors**: Well-framed responses missing a required field
//! - **Remote Errors**: The remote explicitly reported `success: false`
//! - **Authentication Errors**: The handshake was rejected or could not complete
//!
//! Nothing is retried internally; every failure surfaces as a distinct variant
//! carrying the original diagnostic text.
//!
//! ## Example Usage
//! ```rust
//! use rpc_protocol::error::{RemoteErrorKind, RpcError};
//!
//! fn describe(err: &RpcError) -> &'static str {
//!     match err.remote_kind() {
//!         Some(RemoteErrorKind::AccessDenied) => "not allowed",
//!         Some(RemoteErrorKind::InvalidArgument) => "fix the arguments",
//!         Some(RemoteErrorKind::UnknownFunction) => "no such function",
//!         Some(RemoteErrorKind::Generic) => "remote failure",
//!         None => "session failure",
//!     }
//! }
//!
//! assert_eq!(describe(&RpcError::ConnectionClosed), "session failure");
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

use crate::protocol::message::Response;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Response validation errors
    pub const ERR_MISSING_RETURN_CODE: &str = "missing return code";
    pub const ERR_INVALID_RETURN_CODE: &str = "return code is not a boolean or number";
    pub const ERR_RESPONSE_NOT_OBJECT: &str = "response is not an object";
    pub const ERR_UNKNOWN_REMOTE_ERROR: &str = "unknown error";

    /// Handshake errors
    pub const ERR_MISSING_FINISHED: &str = "auth response has no 'finished' flag";
    pub const ERR_MISSING_CHALLENGE: &str = "auth response has no challenge data";
    pub const ERR_INVALID_TOKEN: &str = "auth token is not valid base64";

    /// Sealing errors
    pub const ERR_ALREADY_SEALED: &str = "peer is already sealed";

    /// Mismatch diagnostic written back to the remote
    pub const PROTOCOL_MISMATCH_REPLY: &[u8] = b"Protocol mismatch\n";
}

/// Category of a failure reported by the remote with `success: false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// `access denied: ...`
    AccessDenied,
    /// `invalid argument: ...`
    InvalidArgument,
    /// `unknown function: ...` or `invalid function: ...`
    UnknownFunction,
    /// Anything else
    Generic,
}

impl RemoteErrorKind {
    /// Classify a remote error message by the prefix before the first `": "`.
    pub fn classify(message: &str) -> Self {
        let category = message.split(": ").next().unwrap_or(message);
        match category {
            "access denied" => RemoteErrorKind::AccessDenied,
            "invalid argument" => RemoteErrorKind::InvalidArgument,
            "unknown function" | "invalid function" => RemoteErrorKind::UnknownFunction,
            _ => RemoteErrorKind::Generic,
        }
    }

    /// Category string used when rendering this kind on the wire.
    pub fn category(self) -> Option<&'static str> {
        match self {
            RemoteErrorKind::AccessDenied => Some("access denied"),
            RemoteErrorKind::InvalidArgument => Some("invalid argument"),
            RemoteErrorKind::UnknownFunction => Some("unknown function"),
            RemoteErrorKind::Generic => None,
        }
    }
}

/// A failure the remote reported explicitly.
///
/// Keeps the whole response so callers can inspect any extra fields the
/// remote attached.
#[derive(Debug, Clone)]
pub struct RemoteError {
    kind: RemoteErrorKind,
    message: String,
    response: Response,
}

impl RemoteError {
    pub fn new(message: impl Into<String>, response: Response) -> Self {
        let message = message.into();
        Self {
            kind: RemoteErrorKind::classify(&message),
            message,
            response,
        }
    }

    pub fn kind(&self) -> RemoteErrorKind {
        self.kind
    }

    /// Full error text as sent by the remote.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Text after the first `": "`, or the whole message when there is no category.
    pub fn detail(&self) -> &str {
        match self.message.split_once(": ") {
            Some((_, detail)) => detail,
            None => &self.message,
        }
    }

    pub fn response(&self) -> &Response {
        &self.response
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// RpcError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed while reading")]
    ConnectionClosed,

    #[error("Protocol mismatch: received {0}")]
    ProtocolMismatch(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Remote(RemoteError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("Seal error: {0}")]
    SealError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Custom error: {0}")]
    Custom(String),
}

impl RpcError {
    /// Remote error category, if the remote reported the failure itself.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            RpcError::Remote(remote) => Some(remote.kind()),
            _ => None,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        self.remote_kind() == Some(RemoteErrorKind::AccessDenied)
    }

    pub fn is_unknown_function(&self) -> bool {
        self.remote_kind() == Some(RemoteErrorKind::UnknownFunction)
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.remote_kind() == Some(RemoteErrorKind::InvalidArgument)
    }

    /// Whether the session can keep being used after this error.
    ///
    /// Only remote-reported failures leave the stream in a known state.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RpcError::Remote(_))
    }
}

/// Type alias for Results using RpcError
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_categories() {
        assert_eq!(
            RemoteErrorKind::classify("access denied: no such user"),
            RemoteErrorKind::AccessDenied
        );
        assert_eq!(
            RemoteErrorKind::classify("invalid argument: uid"),
            RemoteErrorKind::InvalidArgument
        );
        assert_eq!(
            RemoteErrorKind::classify("unknown function: frob"),
            RemoteErrorKind::UnknownFunction
        );
        assert_eq!(
            RemoteErrorKind::classify("invalid function"),
            RemoteErrorKind::UnknownFunction
        );
        assert_eq!(
            RemoteErrorKind::classify("disk full: /var"),
            RemoteErrorKind::Generic
        );
        // Only the first separator counts
        assert_eq!(
            RemoteErrorKind::classify("denied: access denied: x"),
            RemoteErrorKind::Generic
        );
    }

    #[test]
    fn test_remote_error_detail() {
        let err = RemoteError::new("access denied: no such user", Response::default());
        assert_eq!(err.detail(), "no such user");
        assert_eq!(err.to_string(), "access denied: no such user");

        let bare = RemoteError::new("boom", Response::default());
        assert_eq!(bare.detail(), "boom");
        assert_eq!(bare.kind(), RemoteErrorKind::Generic);
    }

    #[test]
    fn test_recoverable() {
        let remote = RpcError::Remote(RemoteError::new("x", Response::default()));
        assert!(remote.is_recoverable());
        assert!(!RpcError::ConnectionClosed.is_recoverable());
    }
}
