//! `pf-vnc`: an RFB/VNC client, recording proxy, and trace post-processor.
//!
//! The crate is layered leaves-first: the wire codec (`protocol`) and
//! pixel/session state (`pixel`, `session`) have no knowledge of sockets;
//! `handshake` and `transport` compose them into a connected `RfbSession`;
//! `client` exposes the semantic input API a caller actually drives;
//! `recording` tees a live connection to disk through a WebSocket proxy;
//! and `replay`/`actions`/`mapper` turn a recorded trace back into
//! screenshots and synthesized user actions.

#[macro_use]
extern crate log;

pub mod actions;
pub mod client;
pub mod error;
pub mod handshake;
pub mod keysym;
pub mod mapper;
pub mod pixel;
pub mod protocol;
pub mod recording;
pub mod session;
pub mod transport;

pub use client::VncClient;
pub use error::{RfbError, Result};
pub use pixel::PixelFormat;
pub use session::Image;
