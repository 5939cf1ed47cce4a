//! Decoder for the Tight rectangle encoding: a control byte selecting
//! Fill, JPEG, or one of two zlib-compressed filters (Copy, Palette),
//! plus the four independent per-session zlib streams Tight multiplexes
//! across.

use byteorder::ReadBytesExt;
use flate2::Decompress;
use flate2::FlushDecompress;
use std::io::Read;

use crate::error::{RfbError, Result};

pub const NUM_ZLIB_STREAMS: usize = 4;

/// One of the four independent inflate contexts Tight rectangles can
/// address. Resetting a stream (signaled by the control byte) discards
/// any partially-built dictionary and starts fresh, matching the
/// semantics of `zlib.decompressobj()` being replaced in the original.
pub struct ZlibStream(Decompress);

impl ZlibStream {
    pub fn new() -> ZlibStream {
        ZlibStream(Decompress::new(true))
    }

    pub fn reset(&mut self) {
        self.0 = Decompress::new(true);
    }

    fn inflate(&mut self, compressed: &[u8], out_len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; out_len];
        let before_in = self.0.total_in();
        let before_out = self.0.total_out();
        self.0
            .decompress(compressed, &mut out, FlushDecompress::Sync)
            .map_err(|e| RfbError::codec(format!("zlib inflate failed: {}", e)))?;
        let produced = (self.0.total_out() - before_out) as usize;
        let _consumed = self.0.total_in() - before_in;
        if produced != out_len {
            return Err(RfbError::codec(format!(
                "zlib stream produced {} bytes, expected {}",
                produced, out_len
            )));
        }
        Ok(out)
    }
}

impl Default for ZlibStream {
    fn default() -> Self {
        ZlibStream::new()
    }
}

/// The decoded payload of a Tight rectangle: always exactly
/// `width * height * 3` RGB bytes once decoded, regardless of which
/// sub-variant produced it.
pub struct TightPatch {
    pub rgb: Vec<u8>,
}

struct ControlByte {
    reset_mask: u8,
    kind: TightKind,
}

enum TightKind {
    Fill,
    Jpeg,
    Basic { stream_id: u8, explicit_filter: bool },
}

fn parse_control_byte(byte: u8) -> ControlByte {
    let reset_mask = byte & 0x0F;
    let kind = if byte & 0x80 == 0 {
        TightKind::Basic {
            stream_id: (byte >> 4) & 0x03,
            explicit_filter: byte & 0x40 != 0,
        }
    } else if byte & 0x10 != 0 {
        TightKind::Jpeg
    } else {
        TightKind::Fill
    };
    ControlByte { reset_mask, kind }
}

fn apply_resets(streams: &mut [ZlibStream; NUM_ZLIB_STREAMS], reset_mask: u8) {
    for (i, stream) in streams.iter_mut().enumerate() {
        if reset_mask & (1 << i) != 0 {
            stream.reset();
        }
    }
}

/// Reads the Tight 1-3 byte "compact length" varint: 7 low bits per byte,
/// continuation signaled by the high bit, at most 3 bytes. Also used by
/// the JPEG and Tight-PNG rectangle decoders in `session.rs`, which share
/// the same length-prefix convention.
pub(crate) fn read_compact_len<R: Read>(reader: &mut R) -> Result<u32> {
    let mut len: u32 = 0;
    let byte0 = reader.read_u8()?;
    len |= (byte0 & 0x7f) as u32;
    if byte0 & 0x80 == 0 {
        return Ok(len);
    }
    let byte1 = reader.read_u8()?;
    len |= ((byte1 & 0x7f) as u32) << 7;
    if byte1 & 0x80 == 0 {
        return Ok(len);
    }
    let byte2 = reader.read_u8()?;
    len |= (byte2 as u32) << 14;
    Ok(len)
}

pub fn decode_tight_rectangle<R: Read>(
    reader: &mut R,
    width: u16,
    height: u16,
    streams: &mut [ZlibStream; NUM_ZLIB_STREAMS],
) -> Result<TightPatch> {
    let control = parse_control_byte(reader.read_u8()?);
    apply_resets(streams, control.reset_mask);

    let pixel_count = width as usize * height as usize;
    match control.kind {
        TightKind::Fill => {
            let mut rgb = [0u8; 3];
            reader.read_exact(&mut rgb)?;
            let mut out = Vec::with_capacity(pixel_count * 3);
            for _ in 0..pixel_count {
                out.extend_from_slice(&rgb);
            }
            Ok(TightPatch { rgb: out })
        }
        TightKind::Jpeg => {
            let len = read_compact_len(reader)? as usize;
            let mut jpeg_bytes = vec![0u8; len];
            reader.read_exact(&mut jpeg_bytes)?;
            let rgb = decode_jpeg_to_rgb(&jpeg_bytes, width, height)?;
            Ok(TightPatch { rgb })
        }
        TightKind::Basic {
            stream_id,
            explicit_filter,
        } => {
            let filter_id = if explicit_filter {
                reader.read_u8()?
            } else {
                0 // Copy
            };
            let stream = &mut streams[stream_id as usize];
            match filter_id {
                0 => {
                    // Copy filter: raw 3-bytes-per-pixel RGB, zlib compressed.
                    let len = read_compact_len(reader)? as usize;
                    let mut compressed = vec![0u8; len];
                    reader.read_exact(&mut compressed)?;
                    let rgb = stream.inflate(&compressed, pixel_count * 3)?;
                    Ok(TightPatch { rgb })
                }
                1 => {
                    let palette_count = reader.read_u8()? as usize + 1;
                    if !(1..=256).contains(&palette_count) {
                        return Err(RfbError::codec(format!(
                            "invalid tight palette size {}",
                            palette_count
                        )));
                    }
                    let mut palette = Vec::with_capacity(palette_count);
                    for _ in 0..palette_count {
                        let mut rgb = [0u8; 3];
                        reader.read_exact(&mut rgb)?;
                        palette.push(rgb);
                    }
                    let index_bytes_len = if palette_count == 2 {
                        ((width as usize + 7) / 8) * height as usize
                    } else {
                        pixel_count
                    };
                    let len = read_compact_len(reader)? as usize;
                    let mut compressed = vec![0u8; len];
                    reader.read_exact(&mut compressed)?;
                    let indices = stream.inflate(&compressed, index_bytes_len)?;
                    let rgb = unpack_palette_indices(
                        &indices,
                        &palette,
                        palette_count,
                        width as usize,
                        height as usize,
                    )?;
                    Ok(TightPatch { rgb })
                }
                other => Err(RfbError::protocol(format!(
                    "unknown tight filter id {}",
                    other
                ))),
            }
        }
    }
}

fn unpack_palette_indices(
    indices: &[u8],
    palette: &[[u8; 3]],
    palette_count: usize,
    width: usize,
    height: usize,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(width * height * 3);
    if palette_count == 2 {
        let row_bytes = (width + 7) / 8;
        for y in 0..height {
            let row = &indices[y * row_bytes..y * row_bytes + row_bytes];
            for x in 0..width {
                let byte = row[x / 8];
                let bit = 7 - (x % 8);
                let idx = ((byte >> bit) & 1) as usize;
                out.extend_from_slice(&palette[idx]);
            }
        }
    } else {
        for &idx in indices.iter().take(width * height) {
            let idx = idx as usize;
            if idx >= palette_count {
                return Err(RfbError::codec(format!(
                    "tight palette index {} out of range for palette size {}",
                    idx, palette_count
                )));
            }
            out.extend_from_slice(&palette[idx]);
        }
    }
    Ok(out)
}

fn decode_jpeg_to_rgb(jpeg_bytes: &[u8], width: u16, height: u16) -> Result<Vec<u8>> {
    let img = image::load_from_memory_with_format(jpeg_bytes, image::ImageFormat::Jpeg)
        .map_err(|e| RfbError::codec(format!("jpeg decode failed: {}", e)))?;
    let rgb = img.to_rgb8();
    if rgb.width() != width as u32 || rgb.height() != height as u32 {
        return Err(RfbError::codec(format!(
            "jpeg rectangle decoded to {}x{}, expected {}x{}",
            rgb.width(),
            rgb.height(),
            width,
            height
        )));
    }
    Ok(rgb.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn new_streams() -> [ZlibStream; NUM_ZLIB_STREAMS] {
        [
            ZlibStream::new(),
            ZlibStream::new(),
            ZlibStream::new(),
            ZlibStream::new(),
        ]
    }

    /// Mirrors `read_compact_len`'s 1-3 byte varint so tests can encode
    /// lengths that don't happen to fit in a single byte.
    fn push_compact_len(buf: &mut Vec<u8>, len: usize) {
        let mut rem = len as u32;
        let b0 = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            buf.push(b0);
            return;
        }
        buf.push(b0 | 0x80);
        let b1 = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            buf.push(b1);
            return;
        }
        buf.push(b1 | 0x80);
        buf.push(rem as u8);
    }

    #[test]
    fn fill_rectangle_broadcasts_colour() {
        let mut buf = vec![0b1000_0000u8]; // Fill, no reset
        buf.extend_from_slice(&[10, 20, 30]);
        let mut streams = new_streams();
        let patch = decode_tight_rectangle(&mut &buf[..], 2, 2, &mut streams).unwrap();
        assert_eq!(patch.rgb, vec![10, 20, 30, 10, 20, 30, 10, 20, 30, 10, 20, 30]);
    }

    #[test]
    fn copy_filter_round_trips_through_zlib() {
        let raw_rgb: Vec<u8> = (0..(4 * 3 * 3)).map(|i| i as u8).collect();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw_rgb).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut buf = vec![0b0000_0000u8]; // basic, stream 0, no explicit filter (copy)
        assert!(compressed.len() < 128);
        buf.push(compressed.len() as u8);
        buf.extend_from_slice(&compressed);

        let mut streams = new_streams();
        let patch = decode_tight_rectangle(&mut &buf[..], 4, 3, &mut streams).unwrap();
        assert_eq!(patch.rgb, raw_rgb);
    }

    #[test]
    fn palette_filter_two_colours_packs_one_bit_per_pixel() {
        // 3x2 image, palette of 2 colours: rows padded to a whole byte.
        let palette = [[255u8, 0, 0], [0u8, 255, 0]];
        // Row0: pixels [0,1,0] -> bits 0,1,0 -> byte 0b010_00000 = 0x40
        // Row1: pixels [1,1,1] -> bits 1,1,1 -> byte 0b111_00000 = 0xE0
        let indices_packed = [0x40u8, 0xE0u8];
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&indices_packed).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut buf = vec![0b0100_0000u8]; // basic, stream 0, explicit filter
        buf.push(1u8); // filter id 1 = palette
        buf.push(1u8); // palette_count - 1 = 1 -> count = 2
        for colour in &palette {
            buf.extend_from_slice(colour);
        }
        buf.push(compressed.len() as u8);
        buf.extend_from_slice(&compressed);

        let mut streams = new_streams();
        let patch = decode_tight_rectangle(&mut &buf[..], 3, 2, &mut streams).unwrap();
        let expected: Vec<u8> = [
            palette[0], palette[1], palette[0], // row0: 0,1,0
            palette[1], palette[1], palette[1], // row1: 1,1,1
        ]
        .concat();
        assert_eq!(patch.rgb, expected);
    }

    #[test]
    fn jpeg_control_byte_is_not_misread_as_fill() {
        // Control byte 0x90: top nibble 1001 -> bit 0x80 set (not Basic),
        // bit 0x40 clear, bit 0x10 set -> must classify as Jpeg, not Fill.
        let solid = image::RgbImage::from_pixel(4, 4, image::Rgb([100u8, 150, 200]));
        let mut jpeg_bytes = Vec::new();
        image::DynamicImage::ImageRgb8(solid)
            .write_to(&mut std::io::Cursor::new(&mut jpeg_bytes), image::ImageFormat::Jpeg)
            .unwrap();

        let mut buf = vec![0b1001_0000u8]; // Jpeg, no reset
        push_compact_len(&mut buf, jpeg_bytes.len());
        buf.extend_from_slice(&jpeg_bytes);

        let mut streams = new_streams();
        let patch = decode_tight_rectangle(&mut &buf[..], 4, 4, &mut streams).unwrap();
        assert_eq!(patch.rgb.len(), 4 * 4 * 3);
        // Lossy JPEG, but a near-solid fill should stay close to the source.
        for chunk in patch.rgb.chunks(3) {
            assert!((chunk[0] as i32 - 100).abs() < 20);
            assert!((chunk[1] as i32 - 150).abs() < 20);
            assert!((chunk[2] as i32 - 200).abs() < 20);
        }
    }

    #[test]
    fn reset_mask_replaces_stream_state() {
        let mut streams = new_streams();
        // Feed garbage through stream 0 state conceptually by resetting twice;
        // mainly exercises that reset doesn't panic and stream stays usable.
        apply_resets(&mut streams, 0b0000_0001);
        apply_resets(&mut streams, 0b0000_1111);
    }
}
