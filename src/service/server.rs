//! Serving side of the RPC protocol.
//!
//! A [`Server`] answers calls from a [`Dispatcher`]. The dialect's
//! introspection function is answered from the registry itself; every other
//! name goes to its handler. Failures are rendered in the dialect's error
//! field, so a client of the same dialect sees them as typed remote errors.

use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, RpcError};
use crate::protocol::dialect::ProtocolDialect;
use crate::protocol::dispatcher::{Dispatcher, Fault};
use crate::protocol::message::{Call, Response};
use crate::protocol::peer::{Peer, RpcRead, RpcWrite};

#[derive(Debug, Clone, Default)]
pub struct Server {
    dispatcher: Dispatcher,
    dialect: ProtocolDialect,
}

impl Server {
    pub fn new(dialect: ProtocolDialect) -> Self {
        Self::with_dispatcher(Dispatcher::new(), dialect)
    }

    pub fn with_dispatcher(dispatcher: Dispatcher, dialect: ProtocolDialect) -> Self {
        Self {
            dispatcher,
            dialect,
        }
    }

    /// Registry of served functions; handlers can be added while serving.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dialect(&self) -> ProtocolDialect {
        self.dialect
    }

    /// Answer one decoded call.
    pub fn handle(&self, message: Value) -> Response {
        let call: Call = match serde_json::from_value(message) {
            Ok(call) => call,
            Err(e) => return self.fault(Fault::invalid_argument(format!("malformed call: {e}"))),
        };

        if call.function == self.dialect.introspection_function() {
            return match self.dispatcher.names() {
                Ok(names) => Response::ok().with("functions", json!(names)),
                Err(e) => self.fault(Fault::generic(e.to_string())),
            };
        }

        match self.dispatcher.dispatch(&call) {
            Ok(fields) => Response::success(fields),
            Err(fault) => {
                debug!(function = %call.function, error = %fault, "Call failed");
                self.fault(fault)
            }
        }
    }

    /// Answer calls on `peer` until the remote closes the stream.
    ///
    /// Undecodable payloads are answered with an invalid-argument failure.
    /// A protocol mismatch ends the session with an error.
    #[instrument(skip(self, peer), fields(dialect = %self.dialect))]
    pub async fn serve<R: RpcRead, W: RpcWrite>(&self, peer: &mut Peer<R, W>) -> Result<()> {
        let mut served = 0u64;
        loop {
            let response = match peer.receive().await {
                Ok(message) => self.handle(message),
                Err(RpcError::ConnectionClosed) => break,
                Err(RpcError::DeserializeError(e)) => {
                    self.fault(Fault::invalid_argument(format!("malformed payload: {e}")))
                }
                Err(e) => {
                    warn!(error = %e, "Session aborted");
                    return Err(e);
                }
            };

            peer.send(&response).await?;
            served += 1;
        }

        info!(calls = served, "Session closed by remote");
        peer.close().await
    }

    fn fault(&self, fault: Fault) -> Response {
        Response::failure(self.dialect, fault.render(self.dialect))
    }
}
