use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tungstenite::client::IntoClientRequest;
use tungstenite::protocol::WebSocket;
use tungstenite::Message;

use crate::error::{RfbError, Result};

use super::{would_block, Transport};

/// RFB-over-WebSocket, synchronous. Every RFB byte sequence the caller
/// writes becomes one binary WebSocket frame; frames received from the
/// peer are drained into `read_buf` so `read_exact` can satisfy requests
/// that don't align with frame boundaries, the way the recorded byte
/// streams this crate replays don't either.
pub struct WebSocketTransport {
    socket: WebSocket<TcpStream>,
    read_buf: VecDeque<u8>,
}

impl WebSocketTransport {
    /// Connects as a WebSocket client to `ws://host:port/path`.
    pub fn connect(host: &str, port: u16, path: &str) -> Result<WebSocketTransport> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        let url = format!("ws://{}:{}{}", host, port, path);
        // `into_client_request` fills in the required Host/Connection/
        // Upgrade/Sec-WebSocket-Key/Version headers from the URL; the
        // origin header below is layered on top for servers that
        // require it.
        let mut request = url
            .into_client_request()
            .map_err(|e| RfbError::protocol(format!("invalid websocket url: {}", e)))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Origin", "pf-vnc-client".parse().unwrap());
        let (socket, _response) = tungstenite::client(request, stream)?;
        Ok(WebSocketTransport {
            socket,
            read_buf: VecDeque::new(),
        })
    }

    /// Completes a server-side WebSocket handshake on an already-accepted
    /// TCP connection, used by the recording proxy.
    pub fn accept(stream: TcpStream) -> Result<WebSocketTransport> {
        stream.set_nodelay(true)?;
        let socket = tungstenite::accept(stream)?;
        Ok(WebSocketTransport {
            socket,
            read_buf: VecDeque::new(),
        })
    }

    fn fill_until<F: FnMut(&VecDeque<u8>) -> bool>(&mut self, mut satisfied: F) -> Result<()> {
        while !satisfied(&self.read_buf) {
            match self.socket.read()? {
                Message::Binary(bytes) => self.read_buf.extend(bytes),
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => {
                    return Err(RfbError::protocol("websocket peer closed the connection"))
                }
                Message::Text(_) | Message::Frame(_) => {
                    return Err(RfbError::protocol(
                        "unexpected non-binary websocket frame on an RFB transport",
                    ))
                }
            }
        }
        Ok(())
    }
}

impl Transport for WebSocketTransport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.fill_until(|pending| pending.len() >= buf.len())?;
        for slot in buf.iter_mut() {
            *slot = self.read_buf.pop_front().expect("filled above");
        }
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.socket.send(Message::Binary(buf.to_vec()))?;
        Ok(())
    }

    fn read_ready(&mut self, timeout: Duration) -> Result<bool> {
        if !self.read_buf.is_empty() {
            return Ok(true);
        }
        let stream = self.socket.get_ref();
        stream.set_read_timeout(Some(timeout))?;
        let mut probe = [0u8; 1];
        match stream.peek(&mut probe) {
            Ok(n) => Ok(n > 0),
            Err(ref e) if would_block(e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Read for WebSocketTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_buf.is_empty() {
            match self.socket.read() {
                Ok(Message::Binary(bytes)) => self.read_buf.extend(bytes),
                Ok(_) => return Ok(0),
                Err(tungstenite::Error::Io(e)) => return Err(e),
                Err(e) => return Err(io::Error::new(io::ErrorKind::Other, e)),
            }
        }
        let n = buf.len().min(self.read_buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.read_buf.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for WebSocketTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket
            .send(Message::Binary(buf.to_vec()))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.socket
            .flush()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
