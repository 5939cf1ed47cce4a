//! Recording (§4.5) and replay (§4.6): a WebSocket-tee proxy that records
//! a live session to disk, and a parser that plays a recorded session
//! back into the same `RfbSession` machinery used live.

mod proxy;
mod replay;
mod writer;

pub use proxy::RecordingProxy;
pub use replay::{ReplayParser, ReplayStep};
pub use writer::{emit_handshake_for_recording, RecordingWriter};
