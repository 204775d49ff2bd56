//! TCP connections to an RPC service.

use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{info, instrument};

use crate::config::RpcConfig;
use crate::error::Result;
use crate::protocol::dialect::ProtocolDialect;
use crate::protocol::peer::Peer;
use crate::service::client::RpcClient;
use crate::utils::timeout::with_timeout_error;

/// Client over a TCP connection
pub type TcpClient = RpcClient<OwnedReadHalf, OwnedWriteHalf>;

/// Open a TCP connection and wrap it in a [`Peer`].
#[instrument(skip(timeout))]
pub async fn connect_peer(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<Peer<OwnedReadHalf, OwnedWriteHalf>> {
    let stream = with_timeout_error(
        async { Ok(TcpStream::connect((host, port)).await?) },
        timeout,
    )
    .await?;
    stream.set_nodelay(true)?;

    let remote = stream.peer_addr()?;
    info!(%remote, "Connected");

    let (reader, writer) = stream.into_split();
    Ok(Peer::new(reader, writer))
}

/// Connect to `host:port` and speak `dialect`.
///
/// The host name is also used as the authentication target.
pub async fn connect(
    host: &str,
    port: u16,
    dialect: ProtocolDialect,
    timeout: Duration,
) -> Result<TcpClient> {
    let peer = connect_peer(host, port, timeout).await?;
    Ok(RpcClient::new(peer, dialect).with_remote_host(host))
}

/// Connect using the `[client]` and `[auth]` sections of a configuration.
pub async fn connect_with_config(config: &RpcConfig) -> Result<TcpClient> {
    config.validate_strict()?;
    let client = &config.client;
    let peer = connect_peer(&client.host, client.port, client.connect_timeout).await?;
    Ok(RpcClient::configured(peer, config))
}
