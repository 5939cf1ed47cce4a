//! Crate-wide error taxonomy.
//!
//! Each variant maps to exactly one of the error buckets described by the
//! error handling design: transport, protocol, codec, lookup,
//! recoverable-at-caller, and replay-consistency.

use std::io;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, RfbError>;

#[derive(Debug, Error)]
pub enum RfbError {
    /// Transport-level failure: connection refused, broken pipe, websocket
    /// closed, peer closed mid-read. Fatal to the session.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Websocket-specific transport failure, kept distinct from plain I/O
    /// so callers can tell a closed socket from a protocol-level close.
    #[error("websocket transport error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),

    /// Malformed or unexpected data on the wire: bad pixel format, bad
    /// security type, malformed rectangle header, unknown message tag,
    /// unknown Tight control byte, mismatched rectangle size.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server offered no security type this client supports (only `None`
    /// is supported).
    #[error("server did not offer an unauthenticated security type")]
    UnsupportedSecurity,

    /// SecurityResult was non-zero.
    #[error("security handshake denied: {0}")]
    SecurityDenied(String),

    /// zlib inflate failure, JPEG decode failure, palette indices out of
    /// range, or other decode-time failure below the message framing
    /// layer.
    #[error("codec error: {0}")]
    Codec(String),

    /// A UTF-8 character has no known X11 keysym mapping. Returned to the
    /// caller of `type_text`; client state is unchanged.
    #[error("no keysym mapping for character {0:?}")]
    NoKeysymMapping(char),

    /// The recording proxy could not bind any port in its retry budget.
    #[error("exhausted {0} attempts to bind a free recording port")]
    PortExhausted(u32),

    /// `stop_recording` was called without a prior recorded original
    /// endpoint, or other operations were invoked out of order.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A recorded trace fails a consistency invariant: missing
    /// ProtocolVersion at stream start, timestamp file shorter than the
    /// data it annotates, non-monotone cumulative length.
    #[error("replay consistency error: {0}")]
    ReplayConsistency(String),
}

impl RfbError {
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        RfbError::Protocol(msg.into())
    }

    pub fn codec<S: Into<String>>(msg: S) -> Self {
        RfbError::Codec(msg.into())
    }

    pub fn replay_consistency<S: Into<String>>(msg: S) -> Self {
        RfbError::ReplayConsistency(msg.into())
    }
}

impl From<tungstenite::Error> for RfbError {
    fn from(err: tungstenite::Error) -> Self {
        RfbError::WebSocket(Box::new(err))
    }
}
