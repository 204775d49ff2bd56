//! # Protocol Layer
//!
//! Call/response conventions on top of the packet framing.
//!
//! ## Components
//! - **Message**: `Call` and `Response` shapes
//! - **Dialect**: Versioned protocol conventions
//! - **Peer**: Framing plus optional sealing over a stream pair
//! - **Handshake**: Challenge/response authentication
//! - **Dispatcher**: Server-side function registry

pub mod dialect;
pub mod dispatcher;
pub mod handshake;
pub mod message;
pub mod peer;
