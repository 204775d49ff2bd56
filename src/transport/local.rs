//! Unix domain socket transport.
//!
//! Serves a [`Server`] to every accepted connection, one [`Peer`] per
//! connection, until shut down by CTRL+C or an external channel.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::protocol::dialect::ProtocolDialect;
use crate::protocol::peer::Peer;
use crate::service::client::RpcClient;
use crate::service::server::Server;
use crate::utils::timeout::SHUTDOWN_TIMEOUT;

/// Client over a Unix domain socket
pub type LocalClient = RpcClient<ReadHalf<UnixStream>, WriteHalf<UnixStream>>;

/// Serve `server` on a Unix socket until CTRL+C.
#[instrument(skip(path, server), fields(socket_path = %path.as_ref().display()))]
pub async fn start_server<P: AsRef<Path>>(path: P, server: Arc<Server>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    start_server_with_shutdown(path, server, shutdown_rx).await
}

/// Serve `server` on a Unix socket until `shutdown_rx` fires.
///
/// A stale socket file at `path` is replaced. On shutdown, open sessions get
/// a grace period to finish before the socket file is removed.
#[instrument(skip(path, server, shutdown_rx), fields(socket_path = %path.as_ref().display()))]
pub async fn start_server_with_shutdown<P: AsRef<Path>>(
    path: P,
    server: Arc<Server>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let path = path.as_ref().to_path_buf();
    if path.exists() {
        tokio::fs::remove_file(&path).await.ok();
    }

    let listener = UnixListener::bind(&path)?;
    info!(path = %path.display(), dialect = %server.dialect(), "Listening on unix socket");

    let active_sessions = Arc::new(AtomicU32::new(0));

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutting down server. Waiting for sessions to close...");
                drain_sessions(&active_sessions).await;

                if path.exists() {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        error!(error = %e, path = %path.display(), "Failed to remove socket file");
                    } else {
                        info!(path = %path.display(), "Removed socket file");
                    }
                }

                return Ok(());
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _)) => {
                        let active_sessions = active_sessions.clone();
                        let server = server.clone();
                        active_sessions.fetch_add(1, Ordering::SeqCst);

                        tokio::spawn(async move {
                            let mut peer = Peer::from_stream(stream);
                            if let Err(e) = server.serve(&mut peer).await {
                                debug!(error = %e, "Session ended with error");
                            }
                            active_sessions.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }
}

async fn drain_sessions(active_sessions: &AtomicU32) {
    let timeout = tokio::time::sleep(SHUTDOWN_TIMEOUT);
    tokio::pin!(timeout);

    loop {
        let sessions = active_sessions.load(Ordering::SeqCst);
        if sessions == 0 {
            info!("All sessions closed");
            return;
        }
        tokio::select! {
            _ = &mut timeout => {
                warn!(sessions, "Shutdown timeout reached, forcing exit");
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                debug!(sessions, "Waiting for sessions to close");
            }
        }
    }
}

/// Connect to a Unix socket server speaking `dialect`.
#[instrument(skip(path), fields(socket_path = %path.as_ref().display()))]
pub async fn connect<P: AsRef<Path>>(path: P, dialect: ProtocolDialect) -> Result<LocalClient> {
    let stream = UnixStream::connect(path).await?;
    Ok(RpcClient::new(Peer::from_stream(stream), dialect))
}
