//! # RPC Protocol
//!
//! Framed JSON remote procedure calls over any byte stream, with
//! challenge/response authentication and optional sealing of every payload
//! after authentication.
//!
//! ## Layers
//! - **core**: the `!rpc` frame and JSON payload encoding
//! - **protocol**: calls, results, dialects, the [`Peer`] endpoint and the auth handshake
//! - **auth**: the [`AuthProvider`] capability and a helper-process provider
//! - **service**: [`RpcClient`] and [`Server`]
//! - **transport**: TCP and Unix socket setup
//!
//! ## Example
//! ```no_run
//! use rpc_protocol::{transport::tcp, ProtocolDialect};
//! use std::time::Duration;
//!
//! # async fn run() -> rpc_protocol::Result<()> {
//! let timeout = Duration::from_secs(5);
//! let dialect = ProtocolDialect::Current;
//! let mut client = tcp::connect("rpc.example.org", 10875, dialect, timeout).await?;
//! for name in client.methods().await? {
//!     println!("{name}");
//! }
//! match client.call("whoami", &()).await {
//!     Ok(response) => println!("{:?}", response.get_str("user")),
//!     Err(e) if e.is_access_denied() => println!("not allowed"),
//!     Err(e) => return Err(e),
//! }
//! client.close().await
//! # }
//! ```

#![warn(clippy::unwrap_used, clippy::expect_used)]

pub mod auth;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use auth::{AuthProvider, AuthSession, HelperProvider};
pub use config::RpcConfig;
pub use error::{RemoteError, RemoteErrorKind, Result, RpcError};
pub use protocol::dialect::ProtocolDialect;
pub use protocol::dispatcher::{Dispatcher, Fault};
pub use protocol::handshake::{AuthOptions, AuthOutcome};
pub use protocol::message::{Arguments, Call, Response};
pub use protocol::peer::Peer;
pub use service::client::RpcClient;
pub use service::server::Server;
