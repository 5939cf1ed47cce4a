//! Pixel format negotiation.
//!
//! The codec accepts exactly one pixel format: 32 bits per pixel, depth 24,
//! little-endian, true-color, R/G/B max 255 with shifts 0/8/16. Any other
//! format offered by the server is an immediate fatal `Protocol` error.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{RfbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_colour: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// The single format this client will ever request or accept.
    pub const PREFERRED: PixelFormat = PixelFormat {
        bits_per_pixel: 32,
        depth: 24,
        big_endian: false,
        true_colour: true,
        red_max: 255,
        green_max: 255,
        blue_max: 255,
        red_shift: 0,
        green_shift: 8,
        blue_shift: 16,
    };

    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel as usize / 8
    }

    /// Fails unless this is bit-for-bit the preferred format.
    pub fn ensure_supported(&self) -> Result<()> {
        if *self == Self::PREFERRED {
            Ok(())
        } else {
            Err(RfbError::protocol(format!(
                "unsupported pixel format: {:?}",
                self
            )))
        }
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<PixelFormat> {
        let bits_per_pixel = reader.read_u8()?;
        let depth = reader.read_u8()?;
        let big_endian = reader.read_u8()? != 0;
        let true_colour = reader.read_u8()? != 0;
        let red_max = reader.read_u16::<BigEndian>()?;
        let green_max = reader.read_u16::<BigEndian>()?;
        let blue_max = reader.read_u16::<BigEndian>()?;
        let red_shift = reader.read_u8()?;
        let green_shift = reader.read_u8()?;
        let blue_shift = reader.read_u8()?;
        let mut padding = [0u8; 3];
        reader.read_exact(&mut padding)?;
        Ok(PixelFormat {
            bits_per_pixel,
            depth,
            big_endian,
            true_colour,
            red_max,
            green_max,
            blue_max,
            red_shift,
            green_shift,
            blue_shift,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.bits_per_pixel)?;
        writer.write_u8(self.depth)?;
        writer.write_u8(self.big_endian as u8)?;
        writer.write_u8(self.true_colour as u8)?;
        writer.write_u16::<BigEndian>(self.red_max)?;
        writer.write_u16::<BigEndian>(self.green_max)?;
        writer.write_u16::<BigEndian>(self.blue_max)?;
        writer.write_u8(self.red_shift)?;
        writer.write_u8(self.green_shift)?;
        writer.write_u8(self.blue_shift)?;
        writer.write_all(&[0u8; 3])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_format_round_trips() {
        let mut buf = Vec::new();
        PixelFormat::PREFERRED.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 16);
        let parsed = PixelFormat::read_from(&mut &buf[..]).unwrap();
        assert_eq!(parsed, PixelFormat::PREFERRED);
        assert!(parsed.ensure_supported().is_ok());
    }

    #[test]
    fn rejects_other_formats() {
        let mut other = PixelFormat::PREFERRED;
        other.depth = 16;
        assert!(other.ensure_supported().is_err());
    }
}
