//! Transport abstraction: a blocking byte stream with a non-blocking
//! readiness probe, implemented over plain TCP and over a synchronous
//! WebSocket connection.

mod tcp;
mod ws;

pub use tcp::TcpTransport;
pub use ws::WebSocketTransport;

use crate::error::Result;

/// What the background updater thread polls to decide whether a blocking
/// read would return immediately. `read_exact`/`write_all` are the
/// connection's only other entry points; nothing here buffers partial
/// messages across calls.
pub trait Transport: Send {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Returns `true` if at least one byte can be read without blocking.
    /// Used by the updater thread to poll in short slices rather than
    /// blocking indefinitely inside a single `read_exact`.
    fn read_ready(&mut self, timeout: std::time::Duration) -> Result<bool>;
}

/// A `Transport` plus `std::io::Read`/`Write`, the shape the handshake
/// and session codecs actually consume. Blanket-implemented for anything
/// satisfying both.
pub trait DuplexTransport: Transport + std::io::Read + std::io::Write {}
impl<T: Transport + std::io::Read + std::io::Write> DuplexTransport for T {}

pub(crate) fn would_block(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
