// ABOUTME: Shared error taxonomy for the romp RPC runtime
// ABOUTME: Configuration, transport, codec, protocol, registry, and application errors all fold into RompError

use thiserror::Error;

use crate::codec::CodecError;
use crate::registry::RegistryError;
use crate::value::{ExceptionValue, ValueTypeError};

/// The error type returned by most `romp` operations.
///
/// Each variant corresponds to one of the error kinds from the error
/// handling design: configuration errors are synchronous constructor
/// failures, transport errors terminate the offending session or connect
/// attempt, codec errors become an EXCEPTION reply server-side (or a local
/// error client-side), protocol errors are fatal to the session, registry
/// errors become EXCEPTION replies, and application errors carry the
/// server-supplied exception value back across the wire.
#[derive(Debug, Error)]
pub enum RompError {
    /// Bad endpoint URI, unknown scheme, or other misconfiguration caught
    /// synchronously at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    /// A transport-level I/O failure: bind, accept, connect, or a socket
    /// read/write that failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The value codec could not encode or decode a payload.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A session-fatal protocol violation: exhausted magic resync budget,
    /// an unrecognized `msg_type`, or a reply inconsistent with the
    /// request state the caller was waiting on.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The object registry rejected an operation (unknown id, population
    /// limit reached).
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// An application-level exception escaped the invoked method and
    /// crossed the wire as an EXCEPTION reply.
    #[error("application exception: {}: {}", .0.class_name, .0.message)]
    Application(ExceptionValue),

    /// The proxy refused to forward a call locally (forbidden method name,
    /// or a capability query that short-circuited without a round trip).
    #[error("no such method: {0}")]
    NoSuchMethod(String),

    /// The peer disconnected in the middle of an in-flight call.
    #[error("connection closed")]
    ConnectionClosed,

    /// [`crate::client::Proxy::call_as`] got back a value of the wrong shape.
    #[error("{0}")]
    UnexpectedValue(#[from] ValueTypeError),
}

/// Convenience result alias used throughout the crate.
pub type RompResult<T> = std::result::Result<T, RompError>;
