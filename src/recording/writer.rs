//! Timestamped byte tee (§4.5, §3 "Recording layout"). Each direction
//! gets an `.rfb.bin` byte file and a `.time.bin` index of
//! `(monotonic_ns, cumulative_len)` records, appended under one mutex
//! per direction so the two directions never block each other.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::Result;
use crate::pixel::PixelFormat;
use crate::protocol::{
    ClientInit, Message, SecurityResult, SecurityType, SecurityTypes, ServerInit, Version,
};

struct DirectionWriter {
    data: BufWriter<File>,
    time: BufWriter<File>,
    cumulative_len: u64,
}

impl DirectionWriter {
    fn open(dir: &Path, data_name: &str, time_name: &str) -> Result<DirectionWriter> {
        let data = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(data_name))?;
        let time = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(time_name))?;
        Ok(DirectionWriter {
            data: BufWriter::new(data),
            time: BufWriter::new(time),
            cumulative_len: 0,
        })
    }

    fn append(&mut self, timestamp_ns: u64, bytes: &[u8]) -> Result<()> {
        self.data.write_all(bytes)?;
        self.data.flush()?;
        self.cumulative_len += bytes.len() as u64;
        self.time.write_u64::<BigEndian>(timestamp_ns)?;
        self.time.write_u64::<BigEndian>(self.cumulative_len)?;
        self.time.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.data.flush()?;
        self.time.flush()?;
        Ok(())
    }
}

/// Owns the four recording files for one directory. `client`/`server`
/// tees are independently locked so neither direction's writer blocks
/// the other, per §5's "the two directions do not lock each other".
pub struct RecordingWriter {
    client: Mutex<DirectionWriter>,
    server: Mutex<DirectionWriter>,
}

impl RecordingWriter {
    pub fn create(dir: &Path) -> Result<RecordingWriter> {
        std::fs::create_dir_all(dir)?;
        Ok(RecordingWriter {
            client: Mutex::new(DirectionWriter::open(
                dir,
                "client.rfb.bin",
                "client.time.bin",
            )?),
            server: Mutex::new(DirectionWriter::open(
                dir,
                "server.rfb.bin",
                "server.time.bin",
            )?),
        })
    }

    pub fn append_client(&self, timestamp_ns: u64, bytes: &[u8]) -> Result<()> {
        self.client.lock().unwrap().append(timestamp_ns, bytes)
    }

    pub fn append_server(&self, timestamp_ns: u64, bytes: &[u8]) -> Result<()> {
        self.server.lock().unwrap().append(timestamp_ns, bytes)
    }

    /// Flushes all four files. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.client.lock().unwrap().close()?;
        self.server.lock().unwrap().close()?;
        Ok(())
    }
}

/// Seeds both tees with a synthesized handshake so a recording started
/// mid-session still opens with a valid `ProtocolVersion` on each
/// stream, per §3's "first bytes are a valid ProtocolVersion" invariant.
/// Uses strictly-increasing 1ns-apart synthetic timestamps, so the
/// replay parser's monotone-timestamp invariant holds even though none
/// of this exchange was actually observed on the wire.
pub fn emit_handshake_for_recording(
    writer: &RecordingWriter,
    base_timestamp_ns: u64,
    width: u16,
    height: u16,
) -> Result<()> {
    let mut server_bytes = Vec::new();
    Version::Rfb38.write_to(&mut server_bytes)?;
    SecurityTypes(vec![SecurityType::None]).write_to(&mut server_bytes)?;
    SecurityResult::Succeeded.write_to(&mut server_bytes)?;
    ServerInit {
        framebuffer_width: width,
        framebuffer_height: height,
        pixel_format: PixelFormat::PREFERRED,
        name: "synthetic".to_string(),
    }
    .write_to(&mut server_bytes)?;
    writer.append_server(base_timestamp_ns, &server_bytes)?;

    let mut client_bytes = Vec::new();
    Version::Rfb38.write_to(&mut client_bytes)?;
    SecurityType::None.write_to(&mut client_bytes)?;
    ClientInit { shared: true }.write_to(&mut client_bytes)?;
    writer.append_client(base_timestamp_ns + 1, &client_bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ReadBytesExt;
    use std::io::Cursor;

    #[test]
    fn writer_appends_monotone_cumulative_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter::create(dir.path()).unwrap();
        writer.append_client(100, b"abc").unwrap();
        writer.append_client(200, b"de").unwrap();
        writer.close().unwrap();

        let data = std::fs::read(dir.path().join("client.rfb.bin")).unwrap();
        assert_eq!(data, b"abcde");

        let time_bytes = std::fs::read(dir.path().join("client.time.bin")).unwrap();
        let mut cursor = Cursor::new(time_bytes);
        let (ts1, len1) = (
            cursor.read_u64::<BigEndian>().unwrap(),
            cursor.read_u64::<BigEndian>().unwrap(),
        );
        let (ts2, len2) = (
            cursor.read_u64::<BigEndian>().unwrap(),
            cursor.read_u64::<BigEndian>().unwrap(),
        );
        assert_eq!((ts1, len1), (100, 3));
        assert_eq!((ts2, len2), (200, 5));
        assert!(len2 > len1);
    }

    #[test]
    fn synthetic_handshake_round_trips_through_handshake_state_machine() {
        use crate::handshake::{HandshakeStateMachine, Side};

        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter::create(dir.path()).unwrap();
        emit_handshake_for_recording(&writer, 1_000, 800, 600).unwrap();
        writer.close().unwrap();

        let server_bytes = std::fs::read(dir.path().join("server.rfb.bin")).unwrap();
        let client_bytes = std::fs::read(dir.path().join("client.rfb.bin")).unwrap();
        let mut server_cursor = Cursor::new(server_bytes);
        let mut client_cursor = Cursor::new(client_bytes);
        let mut hs = HandshakeStateMachine::new();
        let mut session = None;
        for _ in 0..7 {
            if session.is_some() {
                break;
            }
            session = match hs.expected_side() {
                Side::Server => hs.advance(Side::Server, &mut server_cursor).unwrap(),
                Side::Client => hs.advance(Side::Client, &mut client_cursor).unwrap(),
            };
        }
        let session = session.expect("synthetic handshake should parse");
        assert_eq!(session.framebuffer.width(), 800);
        assert_eq!(session.framebuffer.height(), 600);
    }
}
