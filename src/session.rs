//! Session state: the decoded framebuffer image, cursor overlay, zlib
//! contexts, and pointer position. A `RfbSession` is produced once the
//! handshake completes and lives as long as the transport does.

use std::io::Read;

use crate::error::{RfbError, Result};
use crate::pixel::PixelFormat;
use crate::protocol::tight::{self, ZlibStream, NUM_ZLIB_STREAMS};
use crate::protocol::{CopyRect, Encoding, Message, RectangleHeader, C2S, S2C};

/// The pointer's last known position and currently-pressed button mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerState {
    pub x: u16,
    pub y: u16,
    pub buttons: u8,
}

impl PointerState {
    pub fn handle_update(&mut self, x: u16, y: u16, buttons: u8) {
        self.x = x;
        self.y = y;
        self.buttons = buttons;
    }
}

/// The cursor sprite sent by a `PseudoCursor` rectangle, with its mask
/// expanded to one alpha byte (0 or 255) per pixel.
#[derive(Debug, Clone)]
pub struct CursorSprite {
    pub width: u16,
    pub height: u16,
    pub rgb: Vec<u8>,
    pub alpha: Vec<u8>,
    pub hotspot_x: u16,
    pub hotspot_y: u16,
}

/// An immutable RGB snapshot returned by `screenshot`.
#[derive(Debug, Clone)]
pub struct Image {
    pub width: u16,
    pub height: u16,
    pub rgb: Vec<u8>,
}

/// A raw input event observed while parsing the client stream, surfaced
/// by the replay parser alongside each step.
#[derive(Debug, Clone)]
pub enum RawEvent {
    Key { down: bool, keysym: u32 },
    Pointer { button_mask: u8, x: u16, y: u16 },
}

/// Whether reading one server message applied a new framebuffer image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOutcome {
    FramebufferUpdated,
    Other,
}

pub struct FramebufferState {
    width: u16,
    height: u16,
    image: Vec<u8>, // height * width * 3, RGB
    cursor: Option<CursorSprite>,
    pixel_format: PixelFormat,
    zlib_streams: [ZlibStream; NUM_ZLIB_STREAMS],
    led_state: u8,
}

impl FramebufferState {
    pub fn new(width: u16, height: u16, pixel_format: PixelFormat) -> FramebufferState {
        FramebufferState {
            width,
            height,
            image: vec![0u8; width as usize * height as usize * 3],
            cursor: None,
            pixel_format,
            zlib_streams: [
                ZlibStream::new(),
                ZlibStream::new(),
                ZlibStream::new(),
                ZlibStream::new(),
            ],
            led_state: 0,
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Called for every client message the session observes, whether it
    /// originated locally or was replayed from a recording.
    pub fn observe_client(&mut self, msg: &C2S) {
        if let C2S::PointerEvent {
            button_mask,
            x_position,
            y_position,
        } = msg
        {
            // Pointer position tracking happens in the owning `RfbSession`,
            // which holds the `PointerState`; this hook exists so future
            // client-originated observations (e.g. SetPixelFormat changes
            // requested locally) have a single entry point.
            let _ = (button_mask, x_position, y_position);
        }
    }

    /// Applies a `FramebufferUpdate`'s rectangles, reading them directly
    /// off `reader`.
    pub fn handle_framebuffer_update<R: Read>(&mut self, reader: &mut R, count: u16) -> Result<()> {
        for _ in 0..count {
            let header = RectangleHeader::read_from(reader)?;
            if header.encoding == Encoding::PseudoLastRect {
                break;
            }
            self.apply_rectangle(reader, header)?;
        }
        Ok(())
    }

    fn apply_rectangle<R: Read>(&mut self, reader: &mut R, header: RectangleHeader) -> Result<()> {
        let w = header.width as usize;
        let h = header.height as usize;
        match header.encoding {
            Encoding::Raw => {
                let bpp = self.pixel_format.bytes_per_pixel();
                let mut raw = vec![0u8; w * h * bpp];
                reader.read_exact(&mut raw)?;
                let mut rgb = Vec::with_capacity(w * h * 3);
                for px in raw.chunks_exact(bpp) {
                    rgb.extend_from_slice(&px[0..3]);
                }
                self.blit(header.x_position, header.y_position, w, h, &rgb);
            }
            Encoding::CopyRect => {
                let copy = CopyRect::read_from(reader)?;
                self.copy_rect(
                    copy.src_x_position,
                    copy.src_y_position,
                    header.x_position,
                    header.y_position,
                    w,
                    h,
                );
            }
            Encoding::Tight => {
                let patch = tight::decode_tight_rectangle(
                    reader,
                    header.width,
                    header.height,
                    &mut self.zlib_streams,
                )?;
                self.blit(header.x_position, header.y_position, w, h, &patch.rgb);
            }
            Encoding::TightPng => {
                let rgb = self.read_image_codec(reader, header.width, header.height, image::ImageFormat::Png)?;
                self.blit(header.x_position, header.y_position, w, h, &rgb);
            }
            Encoding::Jpeg | Encoding::JpegVariant => {
                let rgb = self.read_image_codec(reader, header.width, header.height, image::ImageFormat::Jpeg)?;
                self.blit(header.x_position, header.y_position, w, h, &rgb);
            }
            Encoding::PseudoCursor => {
                self.apply_cursor_rectangle(reader, header)?;
            }
            Encoding::PseudoLastRect => unreachable!("handled by caller"),
            Encoding::PseudoDesktopSize => {
                self.resize(header.width, header.height);
            }
            Encoding::PseudoQemuLedState => {
                let mut byte = [0u8; 1];
                reader.read_exact(&mut byte)?;
                self.led_state = byte[0];
            }
            Encoding::PseudoQemuExtendedKeyEvent => {
                // Capability announcement only; carries no payload.
            }
            Encoding::Unknown(tag) => {
                return Err(RfbError::protocol(format!("unknown encoding tag {}", tag)));
            }
        }
        Ok(())
    }

    fn read_image_codec<R: Read>(
        &self,
        reader: &mut R,
        width: u16,
        height: u16,
        format: image::ImageFormat,
    ) -> Result<Vec<u8>> {
        let len = tight::read_compact_len(reader)? as usize;
        let mut bytes = vec![0u8; len];
        reader.read_exact(&mut bytes)?;
        let img = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| RfbError::codec(format!("image decode failed: {}", e)))?;
        let rgb = img.to_rgb8();
        if rgb.width() != width as u32 || rgb.height() != height as u32 {
            return Err(RfbError::codec(format!(
                "decoded image {}x{}, expected {}x{}",
                rgb.width(),
                rgb.height(),
                width,
                height
            )));
        }
        Ok(rgb.into_raw())
    }

    fn apply_cursor_rectangle<R: Read>(&mut self, reader: &mut R, header: RectangleHeader) -> Result<()> {
        let w = header.width as usize;
        let h = header.height as usize;
        if w == 0 || h == 0 {
            self.cursor = None;
            return Ok(());
        }
        let bpp = self.pixel_format.bytes_per_pixel();
        let mut raw = vec![0u8; w * h * bpp];
        reader.read_exact(&mut raw)?;
        let mut rgb = Vec::with_capacity(w * h * 3);
        for px in raw.chunks_exact(bpp) {
            rgb.extend_from_slice(&px[0..3]);
        }
        let mask_row_bytes = (w + 7) / 8;
        let mut mask = vec![0u8; mask_row_bytes * h];
        reader.read_exact(&mut mask)?;
        let mut alpha = Vec::with_capacity(w * h);
        for y in 0..h {
            let row = &mask[y * mask_row_bytes..y * mask_row_bytes + mask_row_bytes];
            for x in 0..w {
                let byte = row[x / 8];
                let bit = 7 - (x % 8);
                alpha.push(if (byte >> bit) & 1 != 0 { 255 } else { 0 });
            }
        }
        self.cursor = Some(CursorSprite {
            width: header.width,
            height: header.height,
            rgb,
            alpha,
            hotspot_x: header.x_position,
            hotspot_y: header.y_position,
        });
        Ok(())
    }

    fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.image = vec![0u8; width as usize * height as usize * 3];
    }

    fn blit(&mut self, x: u16, y: u16, w: usize, h: usize, rgb: &[u8]) {
        let stride = self.width as usize * 3;
        for row in 0..h {
            let dst_y = y as usize + row;
            if dst_y >= self.height as usize {
                break;
            }
            let dst_start = dst_y * stride + x as usize * 3;
            let src_start = row * w * 3;
            let copy_len = w * 3;
            self.image[dst_start..dst_start + copy_len]
                .copy_from_slice(&rgb[src_start..src_start + copy_len]);
        }
    }

    /// `CopyRect`: copies a live region of the framebuffer to a new
    /// location. Iterates in an order safe for overlapping source and
    /// destination (bottom-to-top when the destination is below the
    /// source, right-to-left when it's to the right), matching the RFC's
    /// "relative y then x" requirement.
    fn copy_rect(&mut self, src_x: u16, src_y: u16, dst_x: u16, dst_y: u16, w: usize, h: usize) {
        let stride = self.width as usize * 3;
        let rows: Box<dyn Iterator<Item = usize>> = if dst_y > src_y {
            Box::new((0..h).rev())
        } else {
            Box::new(0..h)
        };
        for row in rows {
            let src_row = src_y as usize + row;
            let dst_row = dst_y as usize + row;
            let src_start = src_row * stride + src_x as usize * 3;
            let dst_start = dst_row * stride + dst_x as usize * 3;
            let len = w * 3;
            // Copy through an owned buffer so overlapping source and
            // destination within the same row (dst_x close to src_x) is
            // always safe regardless of copy direction.
            let tmp: Vec<u8> = self.image[src_start..src_start + len].to_vec();
            self.image[dst_start..dst_start + len].copy_from_slice(&tmp);
        }
    }

    /// Returns an immutable snapshot of the current image, optionally
    /// compositing the cursor sprite at `pointer` using the sprite's
    /// mask alpha (never any RGB-channel alpha).
    pub fn screenshot(&self, pointer: PointerState, with_cursor: bool) -> Image {
        let mut rgb = self.image.clone();
        if with_cursor {
            if let Some(cursor) = &self.cursor {
                composite_cursor(&mut rgb, self.width, self.height, cursor, pointer.x, pointer.y);
            }
        }
        Image {
            width: self.width,
            height: self.height,
            rgb,
        }
    }
}

fn composite_cursor(
    image: &mut [u8],
    image_width: u16,
    image_height: u16,
    cursor: &CursorSprite,
    pointer_x: u16,
    pointer_y: u16,
) {
    let stride = image_width as usize * 3;
    let origin_x = pointer_x as i32 - cursor.hotspot_x as i32;
    let origin_y = pointer_y as i32 - cursor.hotspot_y as i32;
    for cy in 0..cursor.height as i32 {
        let dst_y = origin_y + cy;
        if dst_y < 0 || dst_y >= image_height as i32 {
            continue;
        }
        for cx in 0..cursor.width as i32 {
            let dst_x = origin_x + cx;
            if dst_x < 0 || dst_x >= image_width as i32 {
                continue;
            }
            let src_idx = (cy as usize * cursor.width as usize + cx as usize) * 3;
            let alpha_idx = cy as usize * cursor.width as usize + cx as usize;
            if cursor.alpha[alpha_idx] == 0 {
                continue;
            }
            let dst_idx = dst_y as usize * stride + dst_x as usize * 3;
            image[dst_idx..dst_idx + 3].copy_from_slice(&cursor.rgb[src_idx..src_idx + 3]);
        }
    }
}

/// The connected session, wrapping the framebuffer state and pointer
/// position. Produced once the handshake machine reaches `Connected`.
pub struct RfbSession {
    pub framebuffer: FramebufferState,
    pub pointer: PointerState,
}

impl RfbSession {
    pub fn new(width: u16, height: u16, pixel_format: PixelFormat) -> RfbSession {
        RfbSession {
            framebuffer: FramebufferState::new(width, height, pixel_format),
            pointer: PointerState::default(),
        }
    }

    pub fn handle_client_message(&mut self, msg: &C2S) {
        self.framebuffer.observe_client(msg);
        if let C2S::PointerEvent {
            button_mask,
            x_position,
            y_position,
        } = msg
        {
            self.pointer.handle_update(*x_position, *y_position, *button_mask);
        }
    }

    /// Reads and applies one server message. Server-originated messages
    /// never carry a `RawEvent` (only client input does); callers that
    /// need to know whether the framebuffer image changed should match
    /// on `ServerOutcome` instead.
    pub fn handle_server_message<R: Read>(&mut self, reader: &mut R) -> Result<ServerOutcome> {
        match S2C::read_from(reader)? {
            S2C::FramebufferUpdate { count } => {
                self.framebuffer.handle_framebuffer_update(reader, count)?;
                Ok(ServerOutcome::FramebufferUpdated)
            }
            S2C::SetColourMapEntries { .. } | S2C::Bell | S2C::CutText(_) => {
                Ok(ServerOutcome::Other)
            }
        }
    }

    /// Reads one client-originated message off `reader` and applies it,
    /// the counterpart to `handle_server_message` for the replay parser,
    /// which has a recorded client stream rather than pre-parsed messages
    /// to hand in. Returns the raw input event a key or pointer message
    /// carries.
    pub fn handle_client_stream_message<R: Read>(
        &mut self,
        reader: &mut R,
    ) -> Result<Option<RawEvent>> {
        let msg = C2S::read_from(reader)?;
        let event = match &msg {
            C2S::KeyEvent { down, key } => Some(RawEvent::Key {
                down: *down,
                keysym: *key,
            }),
            C2S::PointerEvent {
                button_mask,
                x_position,
                y_position,
            } => Some(RawEvent::Pointer {
                button_mask: *button_mask,
                x: *x_position,
                y: *y_position,
            }),
            _ => None,
        };
        self.handle_client_message(&msg);
        Ok(event)
    }

    pub fn screenshot(&self, with_cursor: bool) -> Image {
        self.framebuffer.screenshot(self.pointer, with_cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_session(w: u16, h: u16) -> RfbSession {
        RfbSession::new(w, h, PixelFormat::PREFERRED)
    }

    #[test]
    fn raw_rectangle_blits_rgb_dropping_alpha() {
        let mut session = solid_session(2, 2);
        // Two raw pixels, each R,G,B,pad.
        let raw = [1u8, 2, 3, 0xFF, 4, 5, 6, 0xFF];
        let header = RectangleHeader {
            x_position: 0,
            y_position: 0,
            width: 2,
            height: 1,
            encoding: Encoding::Raw,
        };
        session
            .framebuffer
            .apply_rectangle(&mut &raw[..], header)
            .unwrap();
        let img = session.screenshot(false);
        assert_eq!(&img.rgb[0..6], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn copy_rect_duplicates_source_region() {
        let mut session = solid_session(4, 1);
        let raw = [10u8, 20, 30, 0, 40, 50, 60, 0];
        let header = RectangleHeader {
            x_position: 0,
            y_position: 0,
            width: 2,
            height: 1,
            encoding: Encoding::Raw,
        };
        session
            .framebuffer
            .apply_rectangle(&mut &raw[..], header)
            .unwrap();
        session.framebuffer.copy_rect(0, 0, 2, 0, 2, 1);
        let img = session.screenshot(false);
        assert_eq!(&img.rgb[6..12], &[10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn cursor_composites_with_mask_alpha() {
        let mut session = solid_session(4, 4);
        session.pointer.handle_update(1, 1, 0);
        session.framebuffer.cursor = Some(CursorSprite {
            width: 2,
            height: 2,
            rgb: vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 0],
            alpha: vec![255, 0, 0, 255],
            hotspot_x: 0,
            hotspot_y: 0,
        });
        let img = session.screenshot(true);
        // top-left of cursor lands at pointer (1,1): opaque red pixel.
        let idx = (1 * 4 + 1) * 3;
        assert_eq!(&img.rgb[idx..idx + 3], &[255, 0, 0]);
        // bottom-right cursor pixel (transparent) must not overwrite background.
        let bottom_right_idx = (2 * 4 + 2) * 3;
        assert_eq!(&img.rgb[bottom_right_idx..bottom_right_idx + 3], &[0, 0, 0]);
    }

    #[test]
    fn empty_cursor_rectangle_clears_sprite() {
        let mut session = solid_session(4, 4);
        session.framebuffer.cursor = Some(CursorSprite {
            width: 1,
            height: 1,
            rgb: vec![1, 2, 3],
            alpha: vec![255],
            hotspot_x: 0,
            hotspot_y: 0,
        });
        let header = RectangleHeader {
            x_position: 0,
            y_position: 0,
            width: 0,
            height: 0,
            encoding: Encoding::PseudoCursor,
        };
        session
            .framebuffer
            .apply_rectangle(&mut &[][..], header)
            .unwrap();
        assert!(session.framebuffer.cursor.is_none());
    }
}
