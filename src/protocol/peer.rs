//! One endpoint of an RPC stream.
//!
//! A [`Peer`] owns a read side and a write side and moves JSON objects across
//! them as framed packets. Once a handshake negotiates a security layer the
//! peer is sealed: every outgoing payload goes through the provider's `seal`
//! before framing, every incoming payload through `unseal` before parsing.
//! Sealing cannot be turned off again.
//!
//! Every operation takes `&mut self`, so a second call cannot start before
//! the first one has read its response. Share a peer between tasks by
//! wrapping it in a `tokio::sync::Mutex`.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::{debug, instrument, warn};

use crate::auth::AuthProvider;
use crate::core::packet::{read_frame, write_frame};
use crate::core::serialization;
use crate::error::{constants, Result, RpcError};
use crate::protocol::dialect::ProtocolDialect;
use crate::protocol::message::{Call, Response};
use crate::utils::metrics::global_metrics;

/// Readable half accepted by a [`Peer`].
pub trait RpcRead: AsyncRead + Unpin + Send {}
impl<T: AsyncRead + Unpin + Send + ?Sized> RpcRead for T {}

/// Writable half accepted by a [`Peer`].
pub trait RpcWrite: AsyncWrite + Unpin + Send {}
impl<T: AsyncWrite + Unpin + Send + ?Sized> RpcWrite for T {}

pub struct Peer<R, W> {
    reader: Option<R>,
    writer: Option<W>,
    sealer: Option<Box<dyn AuthProvider>>,
}

impl<S> Peer<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send,
{
    /// Peer over a single duplex stream.
    pub fn from_stream(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

impl<R: RpcRead, W: RpcWrite> Peer<R, W> {
    /// Peer over two separate handles, e.g. a child's stdout and stdin.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Some(reader),
            writer: Some(writer),
            sealer: None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealer.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Route all further payloads through `provider`.
    ///
    /// # Errors
    /// `SealError` if the peer is already sealed.
    pub fn install_seal(&mut self, provider: Box<dyn AuthProvider>) -> Result<()> {
        if self.sealer.is_some() {
            return Err(RpcError::SealError(constants::ERR_ALREADY_SEALED.into()));
        }
        self.sealer = Some(provider);
        debug!("Peer sealed");
        Ok(())
    }

    /// Write raw payload bytes as one frame, bypassing JSON and sealing.
    pub async fn send_packed(&mut self, payload: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(RpcError::ConnectionClosed)?;
        write_frame(writer, payload).await?;
        global_metrics().frame_sent(payload.len() as u64);
        Ok(())
    }

    /// Read one frame's raw payload, bypassing JSON and sealing.
    ///
    /// A protocol mismatch closes the peer before the error is returned.
    pub async fn recv_packed(&mut self) -> Result<Vec<u8>> {
        let (reader, writer) = match (self.reader.as_mut(), self.writer.as_mut()) {
            (Some(reader), Some(writer)) => (reader, writer),
            _ => return Err(RpcError::ConnectionClosed),
        };

        let result = read_frame(reader, writer).await;
        match result {
            Ok(payload) => {
                global_metrics().frame_received(payload.len() as u64);
                Ok(payload)
            }
            Err(err @ RpcError::ProtocolMismatch(_)) => {
                global_metrics().protocol_mismatch();
                if let Err(close_err) = self.close().await {
                    warn!(error = %close_err, "Failed to close peer after protocol mismatch");
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Encode, seal if sealed, frame, write.
    pub async fn send<T>(&mut self, message: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let mut payload = serialization::encode(message)?;
        if let Some(sealer) = self.sealer.as_mut() {
            payload = sealer.seal(&payload).await?;
        }
        self.send_packed(&payload).await
    }

    /// Read, unseal if sealed, decode.
    pub async fn receive(&mut self) -> Result<Value> {
        let mut payload = self.recv_packed().await?;
        if let Some(sealer) = self.sealer.as_mut() {
            payload = sealer.unseal(&payload).await?;
        }
        serialization::decode(&payload)
    }

    /// Send a call and read its result.
    ///
    /// # Errors
    /// - `Protocol` if the result has no `success` key
    /// - `Remote` if the result reports `success: false`
    #[instrument(skip(self, call), fields(function = %call.function), level = "debug")]
    pub async fn call(&mut self, call: &Call, dialect: ProtocolDialect) -> Result<Response> {
        self.send(call).await?;
        let value = self.receive().await?;
        Response::from_value(value)?.into_result(dialect)
    }

    /// Flush and shut down the writer, then release both halves.
    ///
    /// Safe to call more than once; later operations fail with `ConnectionClosed`.
    pub async fn close(&mut self) -> Result<()> {
        let mut result = Ok(());

        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush().await {
                result = Err(RpcError::Io(e));
            }
            if let Err(e) = writer.shutdown().await {
                if result.is_ok() {
                    result = Err(RpcError::Io(e));
                }
            }
        }
        self.reader.take();

        result
    }
}

impl<R, W> fmt::Debug for Peer<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("sealed", &self.sealer.is_some())
            .field("closed", &self.writer.is_none())
            .finish()
    }
}
