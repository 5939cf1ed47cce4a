//! Replay parser (§4.6): turns a recorded directory back into an ordered
//! sequence of `(timestamp, image, event)` steps by interleaving the
//! client and server byte streams according to their timestamp indexes.

use std::fs::File;
use std::io::{BufReader, Seek};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{RfbError, Result};
use crate::handshake::{HandshakeStateMachine, Side};
use crate::session::{Image, RawEvent, RfbSession};

/// One `(timestamp, cumulative_len)` record from a `.time.bin` index.
#[derive(Debug, Clone, Copy)]
struct TimeRecord {
    timestamp_ns: u64,
    cumulative_len: u64,
}

/// A parsed `.time.bin` index plus the byte position each record marks
/// the *end* of, so the cursor can be looked up by "how many bytes have
/// I already consumed from this stream".
struct TimeIndex {
    records: Vec<TimeRecord>,
}

impl TimeIndex {
    fn load(path: &Path) -> Result<TimeIndex> {
        let bytes = std::fs::read(path)?;
        if bytes.len() % 16 != 0 {
            return Err(RfbError::replay_consistency(format!(
                "{} has a length not a multiple of 16",
                path.display()
            )));
        }
        let mut records = Vec::with_capacity(bytes.len() / 16);
        let mut cursor = std::io::Cursor::new(bytes);
        let mut prev_len = 0u64;
        while (cursor.position() as usize) < cursor.get_ref().len() {
            let timestamp_ns = cursor.read_u64::<BigEndian>()?;
            let cumulative_len = cursor.read_u64::<BigEndian>()?;
            if cumulative_len < prev_len {
                return Err(RfbError::replay_consistency(format!(
                    "{} has a non-monotone cumulative length",
                    path.display()
                )));
            }
            prev_len = cumulative_len;
            records.push(TimeRecord {
                timestamp_ns,
                cumulative_len,
            });
        }
        Ok(TimeIndex { records })
    }

    /// The timestamp of the record whose span covers byte offset
    /// `position` (the first record whose `cumulative_len` exceeds it).
    /// `None` once `position` has consumed every record.
    fn next_timestamp_after(&self, position: u64) -> Option<u64> {
        self.records
            .iter()
            .find(|r| r.cumulative_len > position)
            .map(|r| r.timestamp_ns)
    }
}

/// One stream (client or server): a byte reader plus its timestamp
/// index, tracking how many bytes have been consumed so far.
struct Stream {
    reader: BufReader<File>,
    index: TimeIndex,
    consumed: u64,
    total_len: u64,
}

impl Stream {
    fn open(data_path: &Path, time_path: &Path) -> Result<Stream> {
        let file = File::open(data_path)?;
        let total_len = file.metadata()?.len();
        Ok(Stream {
            reader: BufReader::new(file),
            index: TimeIndex::load(time_path)?,
            consumed: 0,
            total_len,
        })
    }

    fn has_remaining(&self) -> bool {
        self.consumed < self.total_len
    }

    fn next_timestamp(&self) -> Option<u64> {
        self.index.next_timestamp_after(self.consumed)
    }

    fn mark_consumed_to_position(&mut self) -> Result<()> {
        self.consumed = self.reader.stream_position()?;
        Ok(())
    }
}

/// One yielded replay step: the timestamp the producing message was
/// recorded at, the framebuffer image as of that message, and the raw
/// input event it carried (`None` for framebuffer updates and other
/// non-input messages).
pub struct ReplayStep {
    pub timestamp_ns: u64,
    pub image: Image,
    pub event: Option<RawEvent>,
}

/// Drives a recording directory's four files through the handshake and
/// then through `RfbSession`, yielding one `ReplayStep` per message.
///
/// Call `next_step` in a loop (`while let Some(step) = parser.next_step()?`);
/// it returns `Ok(None)` once both streams are exhausted.
pub struct ReplayParser {
    client: Stream,
    server: Stream,
    handshake: HandshakeStateMachine,
    session: Option<RfbSession>,
}

impl ReplayParser {
    pub fn open(dir: &Path) -> Result<ReplayParser> {
        let client = Stream::open(&dir.join("client.rfb.bin"), &dir.join("client.time.bin"))?;
        let server = Stream::open(&dir.join("server.rfb.bin"), &dir.join("server.time.bin"))?;
        Ok(ReplayParser {
            client,
            server,
            handshake: HandshakeStateMachine::new(),
            session: None,
        })
    }

    /// Picks whichever stream has the earlier next timestamp, draining
    /// whichever stream is solely remaining once the other is exhausted.
    fn choose_side(&self) -> Option<Side> {
        let client_ts = self.client.next_timestamp();
        let server_ts = self.server.next_timestamp();
        match (client_ts, server_ts) {
            (Some(c), Some(s)) => Some(if c <= s { Side::Client } else { Side::Server }),
            (Some(_), None) => Some(Side::Client),
            (None, Some(_)) => Some(Side::Server),
            (None, None) => None,
        }
    }

    pub fn next_step(&mut self) -> Result<Option<ReplayStep>> {
        loop {
            if !self.client.has_remaining() && !self.server.has_remaining() {
                return Ok(None);
            }
            let side = match self.choose_side() {
                Some(side) => side,
                None => return Ok(None),
            };
            let timestamp_ns = match side {
                Side::Client => self.client.next_timestamp(),
                Side::Server => self.server.next_timestamp(),
            }
            .expect("choose_side only picks a side with a pending timestamp");

            if !self.handshake.is_done() {
                if self.handshake.expected_side() != side {
                    // The other side's next message is earlier in
                    // timestamp order but the handshake isn't ready for
                    // it yet; serve the handshake's expected side first.
                    let expected = self.handshake.expected_side();
                    self.session = self.advance_handshake(expected)?;
                    continue;
                }
                self.session = self.advance_handshake(side)?;
                continue;
            }

            let session = self
                .session
                .as_mut()
                .expect("handshake is done, session must exist");

            let event = match side {
                Side::Client => {
                    let event = session.handle_client_stream_message(&mut self.client.reader)?;
                    self.client.mark_consumed_to_position()?;
                    event
                }
                Side::Server => {
                    session.handle_server_message(&mut self.server.reader)?;
                    self.server.mark_consumed_to_position()?;
                    None
                }
            };

            return Ok(Some(ReplayStep {
                timestamp_ns,
                image: session.screenshot(true),
                event,
            }));
        }
    }

    fn advance_handshake(&mut self, side: Side) -> Result<Option<RfbSession>> {
        let session = match side {
            Side::Client => self.handshake.advance(side, &mut self.client.reader)?,
            Side::Server => self.handshake.advance(side, &mut self.server.reader)?,
        };
        match side {
            Side::Client => self.client.mark_consumed_to_position()?,
            Side::Server => self.server.mark_consumed_to_position()?,
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::writer::{emit_handshake_for_recording, RecordingWriter};
    use crate::protocol::{Encoding, Message, C2S, S2C};

    fn write_framebuffer_update_one_raw_rect(
        writer: &RecordingWriter,
        timestamp_ns: u64,
        w: u16,
        h: u16,
    ) {
        use crate::protocol::RectangleHeader;
        let mut bytes = Vec::new();
        S2C::FramebufferUpdate { count: 1 }.write_to(&mut bytes).unwrap();
        RectangleHeader {
            x_position: 0,
            y_position: 0,
            width: w,
            height: h,
            encoding: Encoding::Raw,
        }
        .write_to(&mut bytes)
        .unwrap();
        bytes.extend(std::iter::repeat(0u8).take(w as usize * h as usize * 4));
        writer.append_server(timestamp_ns, &bytes).unwrap();
    }

    #[test]
    fn replay_yields_steps_in_timestamp_order_after_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter::create(dir.path()).unwrap();
        emit_handshake_for_recording(&writer, 1_000, 4, 4).unwrap();

        write_framebuffer_update_one_raw_rect(&writer, 2_000, 4, 4);

        let mut key_bytes = Vec::new();
        C2S::KeyEvent { down: true, key: 0x61 }
            .write_to(&mut key_bytes)
            .unwrap();
        writer.append_client(3_000, &key_bytes).unwrap();
        writer.close().unwrap();

        let mut parser = ReplayParser::open(dir.path()).unwrap();
        let mut timestamps = Vec::new();
        let mut saw_key_event = false;
        while let Some(step) = parser.next_step().unwrap() {
            timestamps.push(step.timestamp_ns);
            if let Some(RawEvent::Key { down, keysym }) = step.event {
                assert!(down);
                assert_eq!(keysym, 0x61);
                saw_key_event = true;
            }
        }
        assert!(saw_key_event);
        assert_eq!(timestamps, vec![2_000, 3_000]);
    }
}
