//! RPC client front end.
//!
//! [`RpcClient`] turns `call(name, args)` into one request/response exchange
//! on its [`Peer`] and raises a typed [`RpcError::Remote`] when the remote
//! reports a failure. Authentication is run through
//! [`authenticate`](RpcClient::authenticate) before ordinary calls.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument};

use crate::auth::{AuthProvider, AuthSession};
use crate::config::{DEFAULT_SERVICE, RpcConfig};
use crate::error::{Result, RpcError};
use crate::protocol::dialect::ProtocolDialect;
use crate::protocol::handshake::{self, AuthOptions};
use crate::protocol::message::{to_arguments, Arguments, Call, Response};
use crate::protocol::peer::{Peer, RpcRead, RpcWrite};
use crate::utils::metrics::{global_metrics, Timer};

pub struct RpcClient<R, W> {
    peer: Peer<R, W>,
    dialect: ProtocolDialect,
    service: String,
    remote_host: String,
    auth_info: Option<Response>,
}

impl<R, W> fmt::Debug for RpcClient<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("peer", &self.peer)
            .field("dialect", &self.dialect)
            .field("service", &self.service)
            .field("remote_host", &self.remote_host)
            .field("authenticated", &self.auth_info.is_some())
            .finish()
    }
}

impl<R: RpcRead, W: RpcWrite> RpcClient<R, W> {
    pub fn new(peer: Peer<R, W>, dialect: ProtocolDialect) -> Self {
        Self {
            peer,
            dialect,
            service: String::from(DEFAULT_SERVICE),
            remote_host: String::from("localhost"),
            auth_info: None,
        }
    }

    /// Client over separate read and write handles.
    pub fn from_halves(reader: R, writer: W, dialect: ProtocolDialect) -> Self {
        Self::new(Peer::new(reader, writer), dialect)
    }

    /// Apply the dialect and authentication service from a configuration.
    pub fn configured(peer: Peer<R, W>, config: &RpcConfig) -> Self {
        Self::new(peer, config.client.dialect)
            .with_service(config.auth.service.clone())
            .with_remote_host(config.client.host.clone())
    }

    /// Service name used as the authentication target.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Host name used as the authentication target.
    pub fn with_remote_host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = host.into();
        self
    }

    pub fn dialect(&self) -> ProtocolDialect {
        self.dialect
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    pub fn peer(&self) -> &Peer<R, W> {
        &self.peer
    }

    pub fn peer_mut(&mut self) -> &mut Peer<R, W> {
        &mut self.peer
    }

    pub fn into_peer(self) -> Peer<R, W> {
        self.peer
    }

    pub fn is_sealed(&self) -> bool {
        self.peer.is_sealed()
    }

    /// Final auth response of a completed authentication.
    pub fn auth_info(&self) -> Option<&Response> {
        self.auth_info.as_ref()
    }

    /// Send `[function, arguments]` and return whatever comes back, unchecked.
    pub async fn rpc_call(&mut self, function: &str, arguments: Arguments) -> Result<Value> {
        self.peer
            .send(&Call::with_arguments(function, arguments))
            .await?;
        self.peer.receive().await
    }

    /// Call `function` with named arguments taken from any serializable object.
    ///
    /// ```no_run
    /// # use rpc_protocol::transport::tcp::TcpClient;
    /// # async fn demo(client: &mut TcpClient) -> rpc_protocol::Result<()> {
    /// let result = client.call("whoami", &serde_json::json!({})).await?;
    /// println!("{:?}", result.get_str("user"));
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// - `Remote` when the remote answers `success: false`, classified by category
    /// - `Protocol` when the answer has no `success` key
    /// - transport errors unchanged
    pub async fn call<A>(&mut self, function: &str, arguments: &A) -> Result<Response>
    where
        A: Serialize + ?Sized,
    {
        let arguments = to_arguments(arguments)?;
        self.invoke(Call::with_arguments(function, arguments)).await
    }

    /// Run a prepared [`Call`].
    #[instrument(skip(self, call), fields(function = %call.function))]
    pub async fn invoke(&mut self, call: Call) -> Result<Response> {
        let metrics = global_metrics();
        metrics.call_issued();
        let _timer = Timer::start("rpc_call");

        match self.peer.call(&call, self.dialect).await {
            Ok(response) => Ok(response),
            Err(RpcError::Remote(remote)) => {
                metrics.call_failed();
                debug!(kind = ?remote.kind(), error = %remote, "Remote reported failure");
                Err(RpcError::Remote(remote))
            }
            Err(err @ RpcError::Protocol(_)) => {
                metrics.protocol_error();
                Err(err)
            }
            Err(err @ (RpcError::ConnectionClosed | RpcError::Io(_))) => {
                metrics.connection_error();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Names of the functions the remote offers.
    pub async fn methods(&mut self) -> Result<Vec<String>> {
        let response = self
            .call(self.dialect.introspection_function(), &())
            .await?;

        let functions = response
            .get("functions")
            .and_then(Value::as_array)
            .ok_or_else(|| RpcError::Protocol("missing 'functions' list".into()))?;

        functions
            .iter()
            .map(|name| {
                name.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| RpcError::Protocol("function name is not a string".into()))
            })
            .collect()
    }

    /// Authenticate against the remote, sealing the channel if negotiated.
    ///
    /// Once authenticated, later calls return the cached identity response
    /// without contacting the remote or the provider.
    pub async fn authenticate(
        &mut self,
        provider: Box<dyn AuthProvider>,
        options: AuthOptions,
    ) -> Result<Response> {
        if let Some(info) = &self.auth_info {
            return Ok(info.clone());
        }

        let session = AuthSession::new(
            options.mechanism,
            self.service.clone(),
            self.remote_host.clone(),
        )
        .with_authz(options.authz);
        let request_seal = options
            .request_seal
            .or_else(|| self.dialect.default_seal_request());

        let outcome =
            handshake::authenticate(&mut self.peer, self.dialect, session, provider, request_seal)
                .await?;

        self.auth_info = Some(outcome.response.clone());
        Ok(outcome.response)
    }

    /// Flush, then close the writer and the reader.
    pub async fn close(&mut self) -> Result<()> {
        self.peer.close().await
    }
}
