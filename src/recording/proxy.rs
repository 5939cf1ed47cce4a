//! The recording proxy (§4.5): a single-connection WebSocket-to-TCP relay
//! that tees every byte it forwards onto a `RecordingWriter`.
//!
//! Generalizes the teacher's `rvncproxy` accept loop (`bin/rvncproxy.rs`)
//! from a bare TCP-to-TCP relay into a WebSocket-accepting, byte-teeing
//! one: the upstream leg is still plain TCP, but the downstream leg now
//! speaks WebSocket so a browser-hosted agent can dial in, and every
//! frame that crosses the relay is timestamped to disk before (egress)
//! or after (ingress) it's forwarded.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::error::{RfbError, Result};
use crate::recording::writer::RecordingWriter;
use crate::transport::{Transport, WebSocketTransport};

const PORT_RANGE_START: u16 = 10_000;
const PORT_RANGE_END: u16 = 65_535;
const BIND_ATTEMPTS: u32 = 64;
const EGRESS_CHUNK: usize = 4096;

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64
}

/// Binds a free local port in `[10000, 65535]`, starting from a
/// randomized offset so repeated runs don't collide on the same port.
fn bind_local_port() -> Result<TcpListener> {
    let span = (PORT_RANGE_END - PORT_RANGE_START) as u32 + 1;
    let start_offset = rand::thread_rng().gen_range(0..span);
    for attempt in 0..BIND_ATTEMPTS {
        let port = PORT_RANGE_START + ((start_offset + attempt) % span) as u16;
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
            return Ok(listener);
        }
    }
    Err(RfbError::PortExhausted(BIND_ATTEMPTS))
}

/// Whether a WebSocket/transport error should be treated as an ordinary
/// peer-initiated close rather than a real failure.
fn is_peer_close(err: &RfbError) -> bool {
    match err {
        RfbError::WebSocket(inner) => matches!(
            **inner,
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
        ),
        _ => false,
    }
}

/// A running recording proxy: a bound listener serving exactly one
/// WebSocket connection at `/`, relaying to `upstream` and teeing every
/// forwarded byte through `writer`.
pub struct RecordingProxy {
    port: u16,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RecordingProxy {
    /// Picks a free port, starts the accept thread, and returns once the
    /// listener actually exists (step 2-3 of §4.5's `start_recording`).
    /// The caller is responsible for probing readiness (step 4) before
    /// dialing in, since `TcpListener::bind` succeeding doesn't guarantee
    /// the accept thread has reached `accept()` yet.
    pub fn spawn(upstream_host: String, upstream_port: u16, writer: Arc<RecordingWriter>) -> Result<RecordingProxy> {
        let listener = bind_local_port()?;
        let port = listener.local_addr()?.port();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        listener.set_nonblocking(true)?;

        let handle = std::thread::spawn(move || {
            accept_loop(listener, upstream_host, upstream_port, writer, thread_stop);
        });

        Ok(RecordingProxy {
            port,
            stop,
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Signals the accept thread to stop taking new connections and
    /// waits for it to finish relaying the current one.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Blocks until the accept thread has served its one connection and
    /// exited on its own, without requesting early shutdown. Used by the
    /// standalone proxy binary, which has no second client reconnecting
    /// it elsewhere and just wants to run until the single recorded
    /// session ends.
    pub fn wait(mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| RfbError::InvalidOperation("recording proxy thread panicked".to_string()))?;
        }
        Ok(())
    }
}

fn accept_loop(
    listener: TcpListener,
    upstream_host: String,
    upstream_port: u16,
    writer: Arc<RecordingWriter>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                if let Err(error) = serve_one(stream, &upstream_host, upstream_port, &writer) {
                    if !is_peer_close(&error) {
                        error!("recording proxy session failed: {}", error);
                    }
                }
                return;
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(error) => {
                error!("recording proxy accept failed: {}", error);
                return;
            }
        }
    }
}

/// Relays one accepted connection until either side closes or errs.
///
/// Rather than splitting ingress/egress across two threads sharing one
/// `WebSocketTransport` (which would deadlock: a blocking read on one
/// side holds the lock a concurrent write needs), a single thread polls
/// both directions with short readiness timeouts, the same pattern the
/// client's background updater (§4.4) uses to interleave its own reads
/// against a stop flag.
fn serve_one(
    client_stream: TcpStream,
    upstream_host: &str,
    upstream_port: u16,
    writer: &Arc<RecordingWriter>,
) -> Result<()> {
    let mut client = WebSocketTransport::accept(client_stream)?;
    let mut upstream = TcpStream::connect((upstream_host, upstream_port))?;
    upstream.set_nodelay(true)?;

    let poll_timeout = Duration::from_millis(20);
    let mut buf = [0u8; EGRESS_CHUNK];

    loop {
        let mut made_progress = false;

        if client.read_ready(poll_timeout)? {
            let n = client.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            upstream.write_all(&buf[..n])?;
            writer.append_client(now_ns(), &buf[..n])?;
            made_progress = true;
        }

        if upstream_ready(&upstream, poll_timeout)? {
            let n = upstream.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            client.write_all(&buf[..n])?;
            writer.append_server(now_ns(), &buf[..n])?;
            made_progress = true;
        }

        if !made_progress {
            std::thread::sleep(poll_timeout);
        }
    }
}

fn upstream_ready(stream: &TcpStream, timeout: Duration) -> Result<bool> {
    stream.set_read_timeout(Some(timeout))?;
    let mut probe = [0u8; 1];
    match stream.peek(&mut probe) {
        Ok(n) => Ok(n > 0),
        Err(ref e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
        {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_within_the_configured_port_range() {
        let listener = bind_local_port().unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!((PORT_RANGE_START..=PORT_RANGE_END).contains(&port));
    }

    #[test]
    fn peer_close_errors_are_recognized() {
        let err: RfbError =
            RfbError::WebSocket(Box::new(tungstenite::Error::ConnectionClosed));
        assert!(is_peer_close(&err));
        let other = RfbError::protocol("boom");
        assert!(!is_peer_close(&other));
    }
}
