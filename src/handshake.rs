//! The RFB handshake: protocol version exchange, security negotiation
//! (`None` only), and `ClientInit`/`ServerInit`.
//!
//! Two entry points exist for the same sequence of messages. `perform`
//! drives a live duplex connection, writing the client's half of the
//! conversation and reading the server's. `HandshakeStateMachine` instead
//! *consumes* both halves from two independent byte sources — used by the
//! replay parser, which has already-recorded client and server streams
//! and no live socket to write to.

use std::io::{Read, Write};

use crate::error::{RfbError, Result};
use crate::pixel::PixelFormat;
use crate::protocol::{
    ClientInit, Encoding, Message, SecurityResult, SecurityType, SecurityTypes, ServerInit,
    Version, C2S,
};
use crate::session::RfbSession;

/// Performs the handshake on a live, duplex connection: writes the
/// client's half and reads the server's half in lock-step. Returns a
/// fresh `RfbSession` with the client's preferred encodings already sent
/// and a full-screen update already requested.
pub fn perform<T: Read + Write>(stream: &mut T) -> Result<RfbSession> {
    Version::read_from(stream)?;
    Version::Rfb38.write_to(stream)?;

    let SecurityTypes(offered) = SecurityTypes::read_from(stream)?;
    if !offered.contains(&SecurityType::None) {
        return Err(RfbError::UnsupportedSecurity);
    }
    SecurityType::None.write_to(stream)?;

    let result = SecurityResult::read_from(stream)?;
    if result == SecurityResult::Failed {
        return Err(RfbError::SecurityDenied(
            "server rejected unauthenticated security handshake".to_string(),
        ));
    }

    ClientInit { shared: true }.write_to(stream)?;
    let server_init = ServerInit::read_from(stream)?;

    let mut session = RfbSession::new(
        server_init.framebuffer_width,
        server_init.framebuffer_height,
        server_init.pixel_format,
    );

    send_preferred_setup(stream, &mut session)?;
    Ok(session)
}

/// Sends `SetPixelFormat`, `SetEncodings`, and an initial full
/// `FramebufferUpdateRequest`, the three messages every fresh (or
/// reconnected) session sends once handshake completes.
pub fn send_preferred_setup<T: Write>(stream: &mut T, session: &mut RfbSession) -> Result<()> {
    let set_format = C2S::SetPixelFormat(PixelFormat::PREFERRED);
    set_format.write_to(stream)?;
    session.handle_client_message(&set_format);

    let set_encodings = C2S::SetEncodings(Encoding::preferred().to_vec());
    set_encodings.write_to(stream)?;
    session.handle_client_message(&set_encodings);

    let request = C2S::FramebufferUpdateRequest {
        incremental: false,
        x_position: 0,
        y_position: 0,
        width: session.framebuffer.width(),
        height: session.framebuffer.height(),
    };
    request.write_to(stream)?;
    session.handle_client_message(&request);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    ServerVersion,
    ClientVersion,
    ServerSecurityTypes,
    ClientSecurityChoice,
    ServerSecurityResult,
    ClientInit,
    ServerInit,
    Done,
}

/// Drives the handshake by consuming already-framed bytes from two
/// independent sources (a recorded client stream and a recorded server
/// stream), rather than writing anything itself. Used by the replay
/// parser, which needs to step through a recorded handshake message by
/// message to determine exactly where the framebuffer image becomes
/// well-defined.
pub struct HandshakeStateMachine {
    step: Step,
    width: u16,
    height: u16,
}

impl HandshakeStateMachine {
    pub fn new() -> HandshakeStateMachine {
        HandshakeStateMachine {
            step: Step::ServerVersion,
            width: 0,
            height: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.step == Step::Done
    }

    pub fn expected_side(&self) -> Side {
        match self.step {
            Step::ServerVersion
            | Step::ServerSecurityTypes
            | Step::ServerSecurityResult
            | Step::ServerInit => Side::Server,
            Step::ClientVersion | Step::ClientSecurityChoice | Step::ClientInit => Side::Client,
            Step::Done => Side::Server,
        }
    }

    /// Consumes the next handshake message from `reader`, which must
    /// belong to the side `expected_side()` currently names. Returns
    /// `Some(session)` the moment `ServerInit` has been parsed.
    pub fn advance<R: Read>(&mut self, side: Side, reader: &mut R) -> Result<Option<RfbSession>> {
        if side != self.expected_side() {
            return Err(RfbError::replay_consistency(format!(
                "handshake message arrived from {:?} but {:?} was expected",
                side,
                self.expected_side()
            )));
        }
        match self.step {
            Step::ServerVersion => {
                Version::read_from(reader)?;
                self.step = Step::ClientVersion;
                Ok(None)
            }
            Step::ClientVersion => {
                Version::read_from(reader)?;
                self.step = Step::ServerSecurityTypes;
                Ok(None)
            }
            Step::ServerSecurityTypes => {
                let SecurityTypes(offered) = SecurityTypes::read_from(reader)?;
                if !offered.contains(&SecurityType::None) {
                    return Err(RfbError::UnsupportedSecurity);
                }
                self.step = Step::ClientSecurityChoice;
                Ok(None)
            }
            Step::ClientSecurityChoice => {
                SecurityType::read_from(reader)?;
                self.step = Step::ServerSecurityResult;
                Ok(None)
            }
            Step::ServerSecurityResult => {
                let result = SecurityResult::read_from(reader)?;
                if result == SecurityResult::Failed {
                    return Err(RfbError::SecurityDenied(
                        "server rejected unauthenticated security handshake".to_string(),
                    ));
                }
                self.step = Step::ClientInit;
                Ok(None)
            }
            Step::ClientInit => {
                ClientInit::read_from(reader)?;
                self.step = Step::ServerInit;
                Ok(None)
            }
            Step::ServerInit => {
                let server_init = ServerInit::read_from(reader)?;
                self.width = server_init.framebuffer_width;
                self.height = server_init.framebuffer_height;
                self.step = Step::Done;
                Ok(Some(RfbSession::new(
                    self.width,
                    self.height,
                    server_init.pixel_format,
                )))
            }
            Step::Done => Ok(None),
        }
    }
}

impl Default for HandshakeStateMachine {
    fn default() -> Self {
        HandshakeStateMachine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};
    use std::io::Cursor;

    fn write_server_init(buf: &mut Vec<u8>, width: u16, height: u16) {
        buf.write_u16::<BigEndian>(width).unwrap();
        buf.write_u16::<BigEndian>(height).unwrap();
        PixelFormat::PREFERRED.write_to(buf).unwrap();
        "test".to_string().write_to(buf).unwrap();
    }

    #[test]
    fn replay_state_machine_walks_full_handshake() {
        let mut server_bytes = Vec::new();
        server_bytes.extend_from_slice(b"RFB 003.008\n");
        server_bytes.push(1); // one security type
        server_bytes.push(1); // None
        server_bytes.write_u32::<BigEndian>(0).unwrap(); // SecurityResult OK
        write_server_init(&mut server_bytes, 800, 600);

        let mut client_bytes = Vec::new();
        client_bytes.extend_from_slice(b"RFB 003.008\n");
        client_bytes.push(1); // chosen security type: None

        let mut server_cursor = Cursor::new(server_bytes);
        let mut client_cursor = Cursor::new(client_bytes);
        let mut hs = HandshakeStateMachine::new();
        let mut session = None;
        for _ in 0..7 {
            if session.is_some() {
                break;
            }
            match hs.expected_side() {
                Side::Server => {
                    session = hs.advance(Side::Server, &mut server_cursor).unwrap();
                }
                Side::Client => {
                    session = hs.advance(Side::Client, &mut client_cursor).unwrap();
                }
            }
        }
        let session = session.expect("handshake should complete");
        assert_eq!(session.framebuffer.width(), 800);
        assert_eq!(session.framebuffer.height(), 600);
        assert!(hs.is_done());
    }

    #[test]
    fn rejects_security_without_none() {
        let mut server_bytes = Vec::new();
        server_bytes.extend_from_slice(b"RFB 003.008\n");
        server_bytes.push(1);
        server_bytes.push(2); // VncAuthentication only
        let mut server_cursor = Cursor::new(server_bytes);
        let mut client_cursor = Cursor::new(b"RFB 003.008\n".to_vec());
        let mut hs = HandshakeStateMachine::new();
        hs.advance(Side::Server, &mut server_cursor).unwrap();
        hs.advance(Side::Client, &mut client_cursor).unwrap();
        let err = hs.advance(Side::Server, &mut server_cursor).unwrap_err();
        assert!(matches!(err, RfbError::UnsupportedSecurity));
    }
}
