//! Unified error types.

use std::any::Any;

use thiserror::Error;

/// The error a handler returns to signal an application failure.
///
/// The trace layer reports it and hands it back unchanged; the server then
/// answers `500 Internal Server Error`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by routetrace's fallible operations.
///
/// Application-level errors (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: parsing the bind address, binding to a port or
/// accepting a connection.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    Addr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

/// Computing a transaction name panicked.
///
/// Names are built from route captures, and an opaque capture renders through
/// its own `Display`/`Debug` impls. Those impls are the only thing that can
/// fail here.
#[derive(Debug, Error)]
#[error("transaction naming panicked: {0}")]
pub struct NamingError(String);

impl NamingError {
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self(panic_message(payload))
    }
}

/// A handler panicked. Reported to the trace reporter before the panic
/// continues unwinding.
#[derive(Debug, Error)]
#[error("handler panicked: {0}")]
pub struct HandlerPanic(String);

impl HandlerPanic {
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self(panic_message(payload))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else {
        "non-string panic payload".to_owned()
    }
}
