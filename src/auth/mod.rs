//! # Authentication Providers
//!
//! - **Provider**: the [`AuthProvider`] trait and the per-negotiation [`AuthSession`]
//! - **Helper**: a provider backed by an external helper process speaking this protocol
//!
//! Tokens travel base64 encoded inside JSON payloads.

pub mod helper;
pub mod provider;

pub use helper::HelperProvider;
pub use provider::{AuthProvider, AuthSession};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{constants, Result, RpcError};

/// Base64 text for a binary token.
pub fn encode_token(token: &[u8]) -> String {
    STANDARD.encode(token)
}

/// Binary token from base64 text.
pub fn decode_token(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| RpcError::Protocol(format!("{}: {e}", constants::ERR_INVALID_TOKEN)))
}
