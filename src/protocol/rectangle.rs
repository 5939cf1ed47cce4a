use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::Result;

use super::message::Encoding;
use super::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectangleHeader {
    pub x_position: u16,
    pub y_position: u16,
    pub width: u16,
    pub height: u16,
    pub encoding: Encoding,
}

impl Message for RectangleHeader {
    fn read_from<R: Read>(reader: &mut R) -> Result<RectangleHeader> {
        let x_position = reader.read_u16::<BigEndian>()?;
        let y_position = reader.read_u16::<BigEndian>()?;
        let width = reader.read_u16::<BigEndian>()?;
        let height = reader.read_u16::<BigEndian>()?;
        let encoding = Encoding::from_tag(reader.read_i32::<BigEndian>()?);
        Ok(RectangleHeader {
            x_position,
            y_position,
            width,
            height,
            encoding,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(self.x_position)?;
        writer.write_u16::<BigEndian>(self.y_position)?;
        writer.write_u16::<BigEndian>(self.width)?;
        writer.write_u16::<BigEndian>(self.height)?;
        writer.write_i32::<BigEndian>(self.encoding.tag())?;
        Ok(())
    }
}

/// The body of a `CopyRect`-encoded rectangle: the source position the
/// destination (carried by the preceding `RectangleHeader`) is copied
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRect {
    pub src_x_position: u16,
    pub src_y_position: u16,
}

impl Message for CopyRect {
    fn read_from<R: Read>(reader: &mut R) -> Result<CopyRect> {
        Ok(CopyRect {
            src_x_position: reader.read_u16::<BigEndian>()?,
            src_y_position: reader.read_u16::<BigEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(self.src_x_position)?;
        writer.write_u16::<BigEndian>(self.src_y_position)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_header_round_trips() {
        let header = RectangleHeader {
            x_position: 10,
            y_position: 20,
            width: 640,
            height: 480,
            encoding: Encoding::Tight,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        let parsed = RectangleHeader::read_from(&mut &buf[..]).unwrap();
        assert_eq!(parsed, header);
    }
}
