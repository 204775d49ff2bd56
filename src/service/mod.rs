//! # Service Layer
//!
//! - **Client**: [`RpcClient`](client::RpcClient), the calling side with typed remote errors
//! - **Server**: [`Server`](server::Server), answers calls from a dispatcher
//! - **Stub**: the [`rpc_stub!`](crate::rpc_stub) macro for typed call wrappers

pub mod client;
pub mod server;
pub mod stub;
