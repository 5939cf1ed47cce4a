use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::Result;

use super::{would_block, Transport};

/// Plain TCP transport, the teacher's only transport. `read_ready` polls
/// with a short read timeout rather than `select`/`poll`, since std's
/// `TcpStream` exposes nothing finer-grained than
/// `set_read_timeout`.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(host: &str, port: u16) -> Result<TcpTransport> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        Ok(TcpTransport { stream })
    }

    pub fn from_stream(stream: TcpStream) -> Result<TcpTransport> {
        stream.set_nodelay(true)?;
        Ok(TcpTransport { stream })
    }
}

impl Transport for TcpTransport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.set_read_timeout(None)?;
        Read::read_exact(&mut self.stream, buf)?;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        Write::write_all(&mut self.stream, buf)?;
        Ok(())
    }

    fn read_ready(&mut self, timeout: Duration) -> Result<bool> {
        self.stream.set_read_timeout(Some(timeout))?;
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe) {
            Ok(n) => Ok(n > 0),
            Err(ref e) if would_block(e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
