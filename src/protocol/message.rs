use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{RfbError, Result};
use crate::pixel::PixelFormat;

use super::Message;

impl Message for String {
    fn read_from<R: Read>(reader: &mut R) -> Result<String> {
        let length = reader.read_u32::<BigEndian>()?;
        let mut bytes = vec![0; length as usize];
        reader.read_exact(&mut bytes)?;
        // Latin-1 (ISO 8859-1): every byte maps 1:1 to the codepoint of the
        // same value, so this never fails the way UTF-8 decoding could.
        Ok(bytes.into_iter().map(|b| b as char).collect())
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let bytes: Vec<u8> = self.chars().map(|c| c as u8).collect();
        writer.write_u32::<BigEndian>(bytes.len() as u32)?;
        writer.write_all(&bytes)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Rfb38,
}

impl Message for Version {
    fn read_from<R: Read>(reader: &mut R) -> Result<Version> {
        let mut buf = [0u8; 12];
        reader.read_exact(&mut buf)?;
        match &buf {
            b"RFB 003.008\n" | b"RFB 003.889\n" => Ok(Version::Rfb38),
            _ => Err(RfbError::protocol(format!(
                "unsupported protocol version: {:?}",
                String::from_utf8_lossy(&buf)
            ))),
        }
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(b"RFB 003.008\n")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityType {
    None,
    Other(u8),
}

impl SecurityType {
    fn tag(self) -> u8 {
        match self {
            SecurityType::None => 1,
            SecurityType::Other(tag) => tag,
        }
    }

    fn from_tag(tag: u8) -> SecurityType {
        match tag {
            1 => SecurityType::None,
            other => SecurityType::Other(other),
        }
    }
}

impl Message for SecurityType {
    fn read_from<R: Read>(reader: &mut R) -> Result<SecurityType> {
        Ok(SecurityType::from_tag(reader.read_u8()?))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.tag())?;
        Ok(())
    }
}

/// The server's offered security types, read as a length-prefixed list.
#[derive(Debug, Clone)]
pub struct SecurityTypes(pub Vec<SecurityType>);

impl Message for SecurityTypes {
    fn read_from<R: Read>(reader: &mut R) -> Result<SecurityTypes> {
        let count = reader.read_u8()?;
        let mut types = Vec::with_capacity(count as usize);
        for _ in 0..count {
            types.push(SecurityType::read_from(reader)?);
        }
        Ok(SecurityTypes(types))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.0.len() as u8)?;
        for security_type in &self.0 {
            security_type.write_to(writer)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityResult {
    Succeeded,
    Failed,
}

impl Message for SecurityResult {
    fn read_from<R: Read>(reader: &mut R) -> Result<SecurityResult> {
        match reader.read_u32::<BigEndian>()? {
            0 => Ok(SecurityResult::Succeeded),
            _ => Ok(SecurityResult::Failed),
        }
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(match self {
            SecurityResult::Succeeded => 0,
            SecurityResult::Failed => 1,
        })?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInit {
    pub shared: bool,
}

impl Message for ClientInit {
    fn read_from<R: Read>(reader: &mut R) -> Result<ClientInit> {
        Ok(ClientInit {
            shared: reader.read_u8()? != 0,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.shared as u8)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInit {
    pub framebuffer_width: u16,
    pub framebuffer_height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}

impl Message for ServerInit {
    fn read_from<R: Read>(reader: &mut R) -> Result<ServerInit> {
        let framebuffer_width = reader.read_u16::<BigEndian>()?;
        let framebuffer_height = reader.read_u16::<BigEndian>()?;
        let pixel_format = PixelFormat::read_from(reader)?;
        let name = String::read_from(reader)?;
        Ok(ServerInit {
            framebuffer_width,
            framebuffer_height,
            pixel_format,
            name,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(self.framebuffer_width)?;
        writer.write_u16::<BigEndian>(self.framebuffer_height)?;
        self.pixel_format.write_to(writer)?;
        self.name.write_to(writer)?;
        Ok(())
    }
}

/// Encoding tags, in the order SPEC_FULL §6 lists them. Negative tags are
/// pseudo-encodings that carry no pixel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    CopyRect,
    Tight,
    TightPng,
    Jpeg,
    JpegVariant,
    PseudoCursor,
    PseudoLastRect,
    PseudoDesktopSize,
    PseudoQemuLedState,
    PseudoQemuExtendedKeyEvent,
    Unknown(i32),
}

impl Encoding {
    pub fn tag(self) -> i32 {
        match self {
            Encoding::Raw => 0,
            Encoding::CopyRect => 1,
            Encoding::Tight => 7,
            Encoding::TightPng => -260,
            Encoding::Jpeg => 21,
            Encoding::JpegVariant => 23,
            Encoding::PseudoCursor => -239,
            Encoding::PseudoLastRect => -224,
            Encoding::PseudoDesktopSize => -223,
            Encoding::PseudoQemuLedState => -261,
            Encoding::PseudoQemuExtendedKeyEvent => -258,
            Encoding::Unknown(tag) => tag,
        }
    }

    pub fn from_tag(tag: i32) -> Encoding {
        match tag {
            0 => Encoding::Raw,
            1 => Encoding::CopyRect,
            7 => Encoding::Tight,
            -260 => Encoding::TightPng,
            21 => Encoding::Jpeg,
            23 => Encoding::JpegVariant,
            -239 => Encoding::PseudoCursor,
            -224 => Encoding::PseudoLastRect,
            -223 => Encoding::PseudoDesktopSize,
            -261 => Encoding::PseudoQemuLedState,
            -258 => Encoding::PseudoQemuExtendedKeyEvent,
            other => Encoding::Unknown(other),
        }
    }

    /// The client's preferred encodings, in negotiation order.
    pub fn preferred() -> &'static [Encoding] {
        &[
            Encoding::CopyRect,
            Encoding::Tight,
            Encoding::TightPng,
            Encoding::Jpeg,
            Encoding::JpegVariant,
            Encoding::PseudoCursor,
            Encoding::PseudoLastRect,
        ]
    }
}

/// Client-to-server messages.
#[derive(Debug, Clone)]
pub enum C2S {
    SetPixelFormat(PixelFormat),
    SetEncodings(Vec<Encoding>),
    FramebufferUpdateRequest {
        incremental: bool,
        x_position: u16,
        y_position: u16,
        width: u16,
        height: u16,
    },
    KeyEvent {
        down: bool,
        key: u32,
    },
    PointerEvent {
        button_mask: u8,
        x_position: u16,
        y_position: u16,
    },
    CutText(String),
    QemuExtendedKeyEvent {
        down: bool,
        keysym: u32,
        keycode: u32,
    },
}

impl Message for C2S {
    fn read_from<R: Read>(reader: &mut R) -> Result<C2S> {
        let message_type = match reader.read_u8() {
            Ok(t) => t,
            Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(RfbError::protocol("connection closed before message type"))
            }
            Err(e) => return Err(e.into()),
        };
        match message_type {
            0 => {
                let mut padding = [0u8; 3];
                reader.read_exact(&mut padding)?;
                Ok(C2S::SetPixelFormat(PixelFormat::read_from(reader)?))
            }
            2 => {
                reader.read_u8()?; // padding
                let count = reader.read_u16::<BigEndian>()?;
                let mut encodings = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    encodings.push(Encoding::from_tag(reader.read_i32::<BigEndian>()?));
                }
                Ok(C2S::SetEncodings(encodings))
            }
            3 => {
                let incremental = reader.read_u8()? != 0;
                let x_position = reader.read_u16::<BigEndian>()?;
                let y_position = reader.read_u16::<BigEndian>()?;
                let width = reader.read_u16::<BigEndian>()?;
                let height = reader.read_u16::<BigEndian>()?;
                Ok(C2S::FramebufferUpdateRequest {
                    incremental,
                    x_position,
                    y_position,
                    width,
                    height,
                })
            }
            4 => {
                let down = reader.read_u8()? != 0;
                let mut padding = [0u8; 2];
                reader.read_exact(&mut padding)?;
                let key = reader.read_u32::<BigEndian>()?;
                Ok(C2S::KeyEvent { down, key })
            }
            5 => {
                let button_mask = reader.read_u8()?;
                let x_position = reader.read_u16::<BigEndian>()?;
                let y_position = reader.read_u16::<BigEndian>()?;
                Ok(C2S::PointerEvent {
                    button_mask,
                    x_position,
                    y_position,
                })
            }
            6 => {
                let mut padding = [0u8; 3];
                reader.read_exact(&mut padding)?;
                Ok(C2S::CutText(String::read_from(reader)?))
            }
            255 => {
                let submessage = reader.read_u8()?;
                if submessage != 0 {
                    return Err(RfbError::protocol(
                        "unexpected client to server QEMU submessage type",
                    ));
                }
                let down = reader.read_u16::<BigEndian>()? != 0;
                let keysym = reader.read_u32::<BigEndian>()?;
                let keycode = reader.read_u32::<BigEndian>()?;
                Ok(C2S::QemuExtendedKeyEvent {
                    down,
                    keysym,
                    keycode,
                })
            }
            other => Err(RfbError::protocol(format!(
                "unexpected client to server message type {}",
                other
            ))),
        }
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            C2S::SetPixelFormat(format) => {
                writer.write_u8(0)?;
                writer.write_all(&[0u8; 3])?;
                format.write_to(writer)?;
            }
            C2S::SetEncodings(encodings) => {
                writer.write_u8(2)?;
                writer.write_u8(0)?;
                writer.write_u16::<BigEndian>(encodings.len() as u16)?;
                for encoding in encodings {
                    writer.write_i32::<BigEndian>(encoding.tag())?;
                }
            }
            C2S::FramebufferUpdateRequest {
                incremental,
                x_position,
                y_position,
                width,
                height,
            } => {
                writer.write_u8(3)?;
                writer.write_u8(*incremental as u8)?;
                writer.write_u16::<BigEndian>(*x_position)?;
                writer.write_u16::<BigEndian>(*y_position)?;
                writer.write_u16::<BigEndian>(*width)?;
                writer.write_u16::<BigEndian>(*height)?;
            }
            C2S::KeyEvent { down, key } => {
                writer.write_u8(4)?;
                writer.write_u8(*down as u8)?;
                writer.write_all(&[0u8; 2])?;
                writer.write_u32::<BigEndian>(*key)?;
            }
            C2S::PointerEvent {
                button_mask,
                x_position,
                y_position,
            } => {
                writer.write_u8(5)?;
                writer.write_u8(*button_mask)?;
                writer.write_u16::<BigEndian>(*x_position)?;
                writer.write_u16::<BigEndian>(*y_position)?;
            }
            C2S::CutText(text) => {
                writer.write_u8(6)?;
                writer.write_all(&[0u8; 3])?;
                text.write_to(writer)?;
            }
            C2S::QemuExtendedKeyEvent {
                down,
                keysym,
                keycode,
            } => {
                writer.write_u8(255)?;
                writer.write_u8(0)?;
                writer.write_u16::<BigEndian>(*down as u16)?;
                writer.write_u32::<BigEndian>(*keysym)?;
                writer.write_u32::<BigEndian>(*keycode)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Colour {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

/// Server-to-client messages, excluding the rectangle payloads that follow
/// `FramebufferUpdate` (those are read separately by `session.rs` via
/// `RectangleHeader`/`tight`).
#[derive(Debug, Clone)]
pub enum S2C {
    FramebufferUpdate { count: u16 },
    SetColourMapEntries { first_colour: u16, colours: Vec<Colour> },
    Bell,
    CutText(String),
}

impl Message for S2C {
    fn read_from<R: Read>(reader: &mut R) -> Result<S2C> {
        let message_type = match reader.read_u8() {
            Ok(t) => t,
            Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(RfbError::protocol("connection closed before message type"))
            }
            Err(e) => return Err(e.into()),
        };
        match message_type {
            0 => {
                reader.read_u8()?; // padding
                let count = reader.read_u16::<BigEndian>()?;
                Ok(S2C::FramebufferUpdate { count })
            }
            1 => {
                let first_colour = reader.read_u16::<BigEndian>()?;
                let count = reader.read_u16::<BigEndian>()?;
                let mut colours = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    colours.push(Colour {
                        red: reader.read_u16::<BigEndian>()?,
                        green: reader.read_u16::<BigEndian>()?,
                        blue: reader.read_u16::<BigEndian>()?,
                    });
                }
                Ok(S2C::SetColourMapEntries {
                    first_colour,
                    colours,
                })
            }
            2 => Ok(S2C::Bell),
            3 => {
                let mut padding = [0u8; 3];
                reader.read_exact(&mut padding)?;
                Ok(S2C::CutText(String::read_from(reader)?))
            }
            other => Err(RfbError::protocol(format!(
                "unexpected server to client message type {}",
                other
            ))),
        }
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            S2C::FramebufferUpdate { count } => {
                writer.write_u8(0)?;
                writer.write_u8(0)?;
                writer.write_u16::<BigEndian>(*count)?;
            }
            S2C::SetColourMapEntries {
                first_colour,
                colours,
            } => {
                writer.write_u8(1)?;
                writer.write_u16::<BigEndian>(*first_colour)?;
                writer.write_u16::<BigEndian>(colours.len() as u16)?;
                for colour in colours {
                    writer.write_u16::<BigEndian>(colour.red)?;
                    writer.write_u16::<BigEndian>(colour.green)?;
                    writer.write_u16::<BigEndian>(colour.blue)?;
                }
            }
            S2C::Bell => writer.write_u8(2)?,
            S2C::CutText(text) => {
                writer.write_u8(3)?;
                writer.write_all(&[0u8; 3])?;
                text.write_to(writer)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: C2S) -> C2S {
        let mut buf = Vec::new();
        msg.write_to(&mut buf).unwrap();
        C2S::read_from(&mut &buf[..]).unwrap()
    }

    #[test]
    fn key_event_round_trips() {
        let msg = C2S::KeyEvent { down: true, key: 0x61 };
        match round_trip(msg) {
            C2S::KeyEvent { down, key } => {
                assert!(down);
                assert_eq!(key, 0x61);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pointer_event_round_trips() {
        let msg = C2S::PointerEvent {
            button_mask: 0b0000_0001,
            x_position: 100,
            y_position: 200,
        };
        match round_trip(msg) {
            C2S::PointerEvent {
                button_mask,
                x_position,
                y_position,
            } => {
                assert_eq!(button_mask, 1);
                assert_eq!(x_position, 100);
                assert_eq!(y_position, 200);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn set_encodings_round_trips_preferred_order() {
        let msg = C2S::SetEncodings(Encoding::preferred().to_vec());
        match round_trip(msg) {
            C2S::SetEncodings(encodings) => {
                assert_eq!(encodings, Encoding::preferred());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn cut_text_round_trips_latin1() {
        let msg = C2S::CutText("hello\n".to_string());
        match round_trip(msg) {
            C2S::CutText(text) => assert_eq!(text, "hello\n"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn version_accepts_standard_and_apple_strings() {
        assert_eq!(
            Version::read_from(&mut &b"RFB 003.008\n"[..]).unwrap(),
            Version::Rfb38
        );
        assert_eq!(
            Version::read_from(&mut &b"RFB 003.889\n"[..]).unwrap(),
            Version::Rfb38
        );
        assert!(Version::read_from(&mut &b"GARBAGE0000\n"[..]).is_err());
    }
}
