//! # Packet Framing
//!
//! Every message on the wire is a self-delimiting packet:
//!
//! ```text
//! [Magic "!rpc" (4)] [Length as 4 lowercase hex digits (4)] [Payload (N)]
//! ```
//!
//! The length is ASCII text so the header stays readable on a terminal and
//! independent of byte order. The cost is the ceiling: a payload can be at
//! most 65535 bytes, and larger payloads are rejected before anything is
//! written.
//!
//! A header that does not start with the magic bytes, or whose length field
//! is not four hex digits, means the remote does not speak this protocol.
//! [`read_frame`] then drains a little of what the remote sent, writes a one
//! line diagnostic back and reports [`RpcError::ProtocolMismatch`].

use crate::config::{HEADER_LEN, MAGIC_BYTES, MAX_PAYLOAD_SIZE, MISMATCH_DRAIN_LIMIT};
use crate::error::{constants, Result, RpcError};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// How long the mismatch drain waits for more bytes from a foreign client
const MISMATCH_DRAIN_WAIT: Duration = Duration::from_millis(100);

/// One framed packet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Build the 8 byte header for a payload of `len` bytes.
    pub fn encode_header(len: usize) -> Result<[u8; HEADER_LEN]> {
        if len > MAX_PAYLOAD_SIZE {
            return Err(RpcError::OversizedPacket(len));
        }

        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(&MAGIC_BYTES);
        header[4..].copy_from_slice(format!("{len:04x}").as_bytes());
        Ok(header)
    }

    /// Validate a header and return the declared payload length.
    ///
    /// `header` must hold at least [`HEADER_LEN`] bytes.
    pub fn parse_header(header: &[u8]) -> Result<usize> {
        if header.len() < HEADER_LEN {
            return Err(RpcError::ConnectionClosed);
        }

        let mismatch = || RpcError::ProtocolMismatch(escape_received(&header[..HEADER_LEN]));

        if header[..4] != MAGIC_BYTES {
            return Err(mismatch());
        }

        let digits = &header[4..HEADER_LEN];
        if !digits.iter().all(u8::is_ascii_hexdigit) {
            return Err(mismatch());
        }

        // All four bytes are ASCII hex digits, so both conversions succeed
        let text = std::str::from_utf8(digits).map_err(|_| mismatch())?;
        let len = u16::from_str_radix(text, 16).map_err(|_| mismatch())?;
        Ok(len as usize)
    }

    /// Serialize header and payload into one buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = Self::encode_header(self.payload.len())?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    /// Parse one packet from the front of `bytes`. Trailing bytes are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let len = Self::parse_header(bytes)?;
        let body = &bytes[HEADER_LEN..];
        if body.len() < len {
            return Err(RpcError::ConnectionClosed);
        }
        Ok(Self {
            payload: body[..len].to_vec(),
        })
    }
}

/// Render bytes received from a foreign peer for diagnostics.
pub fn escape_received(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

/// Write one frame and flush the sink.
///
/// # Errors
/// `OversizedPacket` if the payload exceeds 65535 bytes; nothing is written in that case.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let packet_len = payload.len();
    let header = Packet::encode_header(packet_len)?;

    let mut buf = Vec::with_capacity(HEADER_LEN + packet_len);
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);

    writer.write_all(&buf).await?;
    writer.flush().await?;

    debug!(bytes = packet_len, "Frame written");
    Ok(())
}

/// Read one frame and return its payload.
///
/// `writer` is the other direction of the same connection; it only receives
/// the diagnostic line when the header turns out to be invalid. Closing the
/// connection afterwards is the caller's job.
///
/// # Errors
/// - `ConnectionClosed` if the stream ends inside the header or the payload
/// - `ProtocolMismatch` if the header is not a valid packet header
pub async fn read_frame<R, W>(reader: &mut R, writer: &mut W) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    read_exact_or_closed(reader, &mut header).await?;

    let len = match Packet::parse_header(&header) {
        Ok(len) => len,
        Err(RpcError::ProtocolMismatch(_)) => {
            return Err(reject_foreign_peer(reader, writer, &header).await);
        }
        Err(e) => return Err(e),
    };

    let mut payload = vec![0u8; len];
    read_exact_or_closed(reader, &mut payload).await?;

    debug!(bytes = len, "Frame read");
    Ok(payload)
}

async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(RpcError::ConnectionClosed),
        Err(e) => Err(RpcError::Io(e)),
    }
}

/// Best-effort drain and diagnostic for a peer that sent a bad header.
async fn reject_foreign_peer<R, W>(reader: &mut R, writer: &mut W, header: &[u8]) -> RpcError
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut received = header.to_vec();
    let mut drain = [0u8; MISMATCH_DRAIN_LIMIT];

    if let Ok(Ok(n)) = tokio::time::timeout(MISMATCH_DRAIN_WAIT, reader.read(&mut drain)).await {
        received.extend_from_slice(&drain[..n]);
    }

    if writer
        .write_all(constants::PROTOCOL_MISMATCH_REPLY)
        .await
        .is_ok()
    {
        let _ = writer.flush().await;
    }

    let received = escape_received(&received);
    warn!(received = %received, "Protocol mismatch on incoming frame");
    RpcError::ProtocolMismatch(received)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_zero_padded_lowercase_hex() {
        assert_eq!(&Packet::encode_header(0).unwrap(), b"!rpc0000");
        assert_eq!(&Packet::encode_header(26).unwrap(), b"!rpc001a");
        assert_eq!(&Packet::encode_header(0xFFFF).unwrap(), b"!rpcffff");
    }

    #[test]
    fn test_header_rejects_oversized_length() {
        assert!(matches!(
            Packet::encode_header(0x1_0000),
            Err(RpcError::OversizedPacket(0x1_0000))
        ));
    }

    #[test]
    fn test_parse_header_accepts_uppercase_digits() {
        assert_eq!(Packet::parse_header(b"!rpc00FF").unwrap(), 255);
    }

    #[test]
    fn test_parse_header_rejects_bad_magic() {
        match Packet::parse_header(b"GET / HT") {
            Err(RpcError::ProtocolMismatch(received)) => assert_eq!(received, "GET / HT"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_header_rejects_non_hex_length() {
        assert!(matches!(
            Packet::parse_header(b"!rpc00zz"),
            Err(RpcError::ProtocolMismatch(_))
        ));
        // Sign and whitespace are not digits
        assert!(matches!(
            Packet::parse_header(b"!rpc+fff"),
            Err(RpcError::ProtocolMismatch(_))
        ));
        assert!(matches!(
            Packet::parse_header(b"!rpc fff"),
            Err(RpcError::ProtocolMismatch(_))
        ));
    }

    #[test]
    fn test_short_header_is_connection_closed() {
        assert!(matches!(
            Packet::from_bytes(b"!rpc0"),
            Err(RpcError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_truncated_payload_is_connection_closed() {
        assert!(matches!(
            Packet::from_bytes(b"!rpc0005abc"),
            Err(RpcError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_packet_roundtrip_with_trailing_bytes() {
        let mut bytes = Packet::new(b"[\"ping\", {}]".to_vec()).to_bytes().unwrap();
        bytes.extend_from_slice(b"!rpc");
        let packet = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(packet.payload, b"[\"ping\", {}]");
    }

    #[test]
    fn test_escape_received() {
        assert_eq!(escape_received(b"hi\n\x00"), "hi\\n\\x00");
    }
}
