//! # Transport Layer
//!
//! Stream setup for RPC sessions. Framing and sealing live in
//! [`Peer`](crate::protocol::peer::Peer); a transport only opens the byte
//! stream and hands both halves over.
//!
//! - **TCP**: remote services
//! - **Local**: Unix domain sockets for same-host IPC

#[cfg(unix)]
pub mod local;
pub mod tcp;
