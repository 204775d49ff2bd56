//! `tokio_util` codec for `!rpc` packets.
//!
//! Lets the packet format be used with `Framed` when a caller prefers a
//! `Stream`/`Sink` over the request/response [`Peer`](crate::protocol::peer::Peer).
//! The codec never writes the mismatch diagnostic; that courtesy belongs to
//! [`read_frame`](crate::core::packet::read_frame).

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::HEADER_LEN;
use crate::core::packet::Packet;
use crate::error::{Result, RpcError};

#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = Packet::parse_header(&src[..HEADER_LEN])?;
        let total = HEADER_LEN + len;

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len);
        Ok(Some(Packet {
            payload: payload.to_vec(),
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        match self.decode(src)? {
            Some(packet) => Ok(Some(packet)),
            None if src.is_empty() => Ok(None),
            None => Err(RpcError::ConnectionClosed),
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = RpcError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        let header = Packet::encode_header(item.payload.len())?;
        dst.reserve(HEADER_LEN + item.payload.len());
        dst.put_slice(&header);
        dst.put_slice(&item.payload);
        Ok(())
    }
}
