use crate::error::{constants, RemoteErrorKind, Result, RpcError};
use crate::protocol::dialect::ProtocolDialect;
use crate::protocol::message::{Arguments, Call};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

type HandlerFn =
    dyn Fn(&Arguments) -> std::result::Result<Arguments, Fault> + Send + Sync + 'static;

/// Failure returned by a handler, rendered as `"<category>: <detail>"` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    kind: RemoteErrorKind,
    detail: String,
}

impl Fault {
    pub fn new(kind: RemoteErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn access_denied(detail: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::AccessDenied, detail)
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::InvalidArgument, detail)
    }

    pub fn unknown_function(detail: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::UnknownFunction, detail)
    }

    /// Uncategorised failure; the message is sent as-is.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Generic, message)
    }

    pub fn kind(&self) -> RemoteErrorKind {
        self.kind
    }

    /// Error text as the given dialect spells it.
    pub fn render(&self, dialect: ProtocolDialect) -> String {
        let category = match self.kind {
            RemoteErrorKind::UnknownFunction => Some(dialect.unknown_function_category()),
            kind => kind.category(),
        };
        match category {
            Some(category) => format!("{category}: {}", self.detail),
            None => self.detail.clone(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(ProtocolDialect::Current))
    }
}

/// Function registry with zero-copy name routing for statics.
/// Uses Cow<'static, str> to avoid heap allocations for names known at compile time.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<Cow<'static, str>, Arc<HandlerFn>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register<N, F>(&self, name: N, handler: F) -> Result<()>
    where
        N: Into<Cow<'static, str>>,
        F: Fn(&Arguments) -> std::result::Result<Arguments, Fault> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| RpcError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string()))?;

        handlers.insert(name.into(), Arc::new(handler));
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<bool> {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| RpcError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string()))?;

        Ok(handlers.remove(name).is_some())
    }

    /// Registered function names, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| RpcError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string()))?;

        let mut names: Vec<String> = handlers.keys().map(|name| name.to_string()).collect();
        names.sort();
        Ok(names)
    }

    /// Run the handler for `call`. The registry is unlocked while it runs,
    /// so handlers may register or unregister functions.
    pub fn dispatch(&self, call: &Call) -> std::result::Result<Arguments, Fault> {
        let handler = self
            .handlers
            .read()
            .map_err(|_| Fault::generic(constants::ERR_DISPATCHER_READ_LOCK))?
            .get(call.function.as_str())
            .cloned()
            .ok_or_else(|| Fault::unknown_function(call.function.clone()))?;

        handler(&call.arguments)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("functions", &self.names().unwrap_or_default())
            .finish()
    }
}
