//! Provider backed by an external helper process.
//!
//! The helper speaks this same RPC protocol on its stdin/stdout and exposes
//! `new`, `start`, `step`, `encode` and `decode`. Binary values travel as
//! base64 in a `data` field; `step` reports whether another challenge is
//! expected.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::auth::{decode_token, encode_token, AuthProvider, AuthSession};
use crate::config::AuthConfig;
use crate::error::{Result, RpcError};
use crate::protocol::dialect::ProtocolDialect;
use crate::protocol::message::{Call, Response};
use crate::protocol::peer::{Peer, RpcRead, RpcWrite};
use crate::service::client::RpcClient;

pub struct HelperProvider<R, W> {
    client: RpcClient<R, W>,
    child: Option<Child>,
    step_required: bool,
}

impl HelperProvider<ChildStdout, ChildStdin> {
    /// Launch `program` and talk to it over its standard streams.
    ///
    /// The child is killed if the provider is dropped without [`shutdown`](Self::shutdown).
    pub fn spawn(program: impl AsRef<Path>) -> Result<Self> {
        let program = program.as_ref();
        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RpcError::Authentication("auth helper has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RpcError::Authentication("auth helper has no stdout".into()))?;

        info!(program = %program.display(), "Auth helper started");

        let client = RpcClient::new(Peer::new(stdout, stdin), ProtocolDialect::Current);
        Ok(Self {
            client,
            child: Some(child),
            step_required: true,
        })
    }

    /// Launch the helper named by `helper_path`.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        match config.helper_path.as_deref() {
            Some(path) if !path.is_empty() => Self::spawn(path),
            _ => Err(RpcError::ConfigError("no auth helper configured".into())),
        }
    }
}

impl<R: RpcRead, W: RpcWrite> HelperProvider<R, W> {
    /// Provider over an already connected helper.
    pub fn new(client: RpcClient<R, W>) -> Self {
        Self {
            client,
            child: None,
            step_required: true,
        }
    }

    /// Close the helper's stdin and wait for it to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        self.client.close().await?;
        if let Some(mut child) = self.child.take() {
            let status = child.wait().await?;
            debug!(%status, "Auth helper exited");
        }
        Ok(())
    }

    async fn request(&mut self, call: Call) -> Result<Response> {
        let function = call.function.clone();
        match self.client.invoke(call).await {
            Err(RpcError::Remote(remote)) => {
                warn!(%function, error = %remote, "Auth helper refused request");
                Err(RpcError::Remote(remote))
            }
            other => other,
        }
    }

    async fn token_round(&mut self, call: Call) -> Result<Vec<u8>> {
        let response = self.request(call).await.map_err(into_auth_error)?;
        self.step_required = response.get_bool("step").unwrap_or(false);
        response_data(&response)
    }

    async fn transform(&mut self, function: &str, data: &[u8]) -> Result<Vec<u8>> {
        let call = Call::new(function).arg("data", encode_token(data));
        let response = self.request(call).await.map_err(|e| match e {
            RpcError::Remote(remote) => RpcError::SealError(remote.message().to_owned()),
            other => other,
        })?;
        response_data(&response)
    }
}

#[async_trait]
impl<R, W> AuthProvider for HelperProvider<R, W>
where
    R: RpcRead + 'static,
    W: RpcWrite + 'static,
{
    async fn start(&mut self, session: &AuthSession) -> Result<Vec<u8>> {
        let authz = session.authz.clone().map_or(Value::Null, Value::String);
        let new = Call::new("new")
            .arg("mech", session.mechanism.clone())
            .arg("service", session.service.clone())
            .arg("host", session.host.clone())
            .arg("user", authz);
        self.request(new).await.map_err(into_auth_error)?;

        self.token_round(Call::new("start")).await
    }

    async fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        self.token_round(Call::new("step").arg("data", encode_token(challenge)))
            .await
    }

    async fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.transform("encode", plaintext).await
    }

    async fn unseal(&mut self, sealed: &[u8]) -> Result<Vec<u8>> {
        self.transform("decode", sealed).await
    }

    fn needs_step(&self) -> bool {
        self.step_required
    }
}

fn into_auth_error(err: RpcError) -> RpcError {
    match err {
        RpcError::Remote(remote) => RpcError::Authentication(remote.message().to_owned()),
        other => other,
    }
}

fn response_data(response: &Response) -> Result<Vec<u8>> {
    match response.get("data") {
        Some(Value::String(text)) => decode_token(text),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(_) => Err(RpcError::Protocol("auth helper 'data' is not a string".into())),
    }
}
