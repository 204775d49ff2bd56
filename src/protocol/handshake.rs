//! Challenge/response authentication over the reserved `auth` function.
//!
//! The negotiation runs `Start → (Challenge ⇄ Respond)* → Finished`:
//!
//! 1. The provider produces an initial token, sent as
//!    `auth {mechanism, data: base64(token)}` (plus `seal` when requested).
//! 2. Each response is either terminal or carries a base64 challenge in `data`.
//!    The current dialect says so with `finished`; the legacy dialect simply
//!    stops sending `data`.
//! 3. Challenges go to the provider's `step`; its answer is sent back as
//!    `auth {data}`.
//! 4. On the terminal response the remote's `seal` preference (or the
//!    dialect default) decides whether the peer is sealed with the provider.
//!
//! Transport failures propagate unchanged. Missing fields are protocol errors.
//! A remote refusal becomes `Authentication`. There are no retries and no
//! timeouts here.

use tracing::{debug, info, instrument, warn};

use crate::auth::{decode_token, encode_token, AuthProvider, AuthSession};
use crate::config::{AuthConfig, DEFAULT_MECHANISM};
use crate::error::{constants, Result, RpcError};
use crate::protocol::dialect::ProtocolDialect;
use crate::protocol::message::{Call, Response};
use crate::protocol::peer::{Peer, RpcRead, RpcWrite};
use crate::utils::metrics::global_metrics;

/// Reserved function name for authentication rounds
pub const AUTH_FUNCTION: &str = "auth";

/// Position of a negotiation in the handshake state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Initial token not yet accepted
    Start,
    /// Remote sent a challenge, an answer is due
    Challenge,
    /// Remote signalled completion
    Finished,
}

/// Caller choices for one authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOptions {
    pub mechanism: String,
    pub authz: Option<String>,
    /// `seal` flag for the first round; `None` defers to the dialect
    pub request_seal: Option<bool>,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self::new(DEFAULT_MECHANISM)
    }
}

impl AuthOptions {
    pub fn new(mechanism: impl Into<String>) -> Self {
        Self {
            mechanism: mechanism.into(),
            authz: None,
            request_seal: None,
        }
    }

    pub fn with_authz(mut self, authz: impl Into<String>) -> Self {
        self.authz = Some(authz.into());
        self
    }

    pub fn with_seal_request(mut self, seal: bool) -> Self {
        self.request_seal = Some(seal);
        self
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            mechanism: config.mechanism.clone(),
            authz: config.authz.clone(),
            request_seal: config.request_seal,
        }
    }
}

/// Result of a completed negotiation.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub session: AuthSession,
    /// Final auth response, including any identity claims
    pub response: Response,
}

impl AuthOutcome {
    pub fn sealed(&self) -> bool {
        self.session.sealed
    }
}

/// Run the handshake on `peer`, sealing it with `provider` if negotiated.
#[instrument(
    skip(peer, session, provider),
    fields(mechanism = %session.mechanism, service = %session.service, host = %session.host)
)]
pub async fn authenticate<R, W>(
    peer: &mut Peer<R, W>,
    dialect: ProtocolDialect,
    mut session: AuthSession,
    mut provider: Box<dyn AuthProvider>,
    request_seal: Option<bool>,
) -> Result<AuthOutcome>
where
    R: RpcRead,
    W: RpcWrite,
{
    let metrics = global_metrics();
    metrics.handshake_attempt();

    let negotiated = negotiate(peer, dialect, &mut session, provider.as_mut(), request_seal).await;
    let response = match negotiated {
        Ok(response) => response,
        Err(e) => {
            metrics.handshake_failed();
            warn!(error = %e, rounds = session.rounds, "Authentication failed");
            return Err(e);
        }
    };

    if session.sealed {
        peer.install_seal(provider)?;
    }

    metrics.handshake_success(session.sealed);
    info!(
        sealed = session.sealed,
        rounds = session.rounds,
        "Authentication finished"
    );

    Ok(AuthOutcome { session, response })
}

async fn negotiate<R, W>(
    peer: &mut Peer<R, W>,
    dialect: ProtocolDialect,
    session: &mut AuthSession,
    provider: &mut dyn AuthProvider,
    request_seal: Option<bool>,
) -> Result<Response>
where
    R: RpcRead,
    W: RpcWrite,
{
    let token = provider.start(session).await?;
    session.step_required = provider.needs_step();

    let mut call = Call::new(AUTH_FUNCTION)
        .arg("mechanism", session.mechanism.clone())
        .arg("data", encode_token(&token));
    if let Some(seal) = request_seal {
        call = call.arg("seal", u8::from(seal));
    }

    loop {
        let response = auth_round(peer, &call, dialect).await?;
        session.rounds += 1;

        if dialect.handshake_finished(&response)? {
            session.state = HandshakeState::Finished;
            session.sealed = dialect.negotiated_seal(&response);
            if session.step_required {
                debug!("Remote finished while the provider expected another step");
            }
            return Ok(response);
        }

        session.state = HandshakeState::Challenge;
        let challenge = response
            .get_str("data")
            .ok_or_else(|| RpcError::Protocol(constants::ERR_MISSING_CHALLENGE.into()))?;
        let challenge = decode_token(challenge)?;
        debug!(round = session.rounds, bytes = challenge.len(), "Auth challenge received");

        let answer = provider.step(&challenge).await?;
        session.step_required = provider.needs_step();

        call = Call::new(AUTH_FUNCTION).arg("data", encode_token(&answer));
    }
}

async fn auth_round<R, W>(
    peer: &mut Peer<R, W>,
    call: &Call,
    dialect: ProtocolDialect,
) -> Result<Response>
where
    R: RpcRead,
    W: RpcWrite,
{
    match peer.call(call, dialect).await {
        Err(RpcError::Remote(remote)) => Err(RpcError::Authentication(remote.message().to_owned())),
        other => other,
    }
}
