//! # Core Protocol Components
//!
//! Packet framing and payload serialization.
//!
//! ## Components
//! - **Packet**: The `!rpc` envelope, async frame reader/writer
//! - **Codec**: Tokio codec for framing over byte streams
//! - **Serialization**: JSON payload encoding
//!
//! ## Wire Format
//! ```text
//! [Magic "!rpc" (4)] [Length hex (4)] [Payload (N <= 65535)]
//! ```

pub mod codec;
pub mod packet;
pub mod serialization;
