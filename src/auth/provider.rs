//! The authentication provider capability.
//!
//! The RPC layer never computes mechanism tokens itself. It hands every
//! challenge to an [`AuthProvider`] and, once a sealed channel is negotiated,
//! routes every payload through the same provider's `seal`/`unseal`.

use async_trait::async_trait;

use crate::config::DEFAULT_MECHANISM;
use crate::error::Result;
use crate::protocol::handshake::HandshakeState;

/// Computes authentication tokens and seals payloads for one session.
#[async_trait]
pub trait AuthProvider: Send {
    /// Begin a session and return the initial client token.
    async fn start(&mut self, session: &AuthSession) -> Result<Vec<u8>>;

    /// Answer a server challenge.
    async fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>>;

    /// Protect an outgoing payload with the negotiated security layer.
    async fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Unwrap an incoming payload.
    async fn unseal(&mut self, sealed: &[u8]) -> Result<Vec<u8>>;

    /// Whether the provider still expects another challenge.
    fn needs_step(&self) -> bool {
        true
    }
}

/// State of one authentication negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub mechanism: String,
    pub service: String,
    pub host: String,
    /// Identity to act as; `None` means the authenticated identity itself
    pub authz: Option<String>,
    pub step_required: bool,
    pub sealed: bool,
    pub state: HandshakeState,
    /// Auth calls exchanged so far
    pub rounds: u32,
}

impl AuthSession {
    pub fn new(
        mechanism: impl Into<String>,
        service: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            mechanism: mechanism.into(),
            service: service.into(),
            host: host.into(),
            authz: None,
            step_required: true,
            sealed: false,
            state: HandshakeState::Start,
            rounds: 0,
        }
    }

    pub fn with_authz(mut self, authz: Option<String>) -> Self {
        self.authz = authz;
        self
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new(DEFAULT_MECHANISM, "host", "localhost")
    }
}
