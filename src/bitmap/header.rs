//! Container header: fixed little-endian fields at fixed byte offsets.
//!
//! ```text
//! offset  size  field
//!      0     2  signature "BM"
//!      2     4  total file size
//!     10     4  pixel data offset
//!     14     4  info header size
//!     18     4  width
//!     22     4  height (rows stored bottom-up)
//!     26     2  color planes (must be 1)
//!     28     2  bits per pixel (1, 4, 8, 16, 24 or 32; only 24 decodes)
//!     30     4  compression (must be 0)
//!     34     4  pixel data size (0 or exact)
//! ```
//!
//! A [`Header`] is a plain value. [`Header::parse`] and
//! [`Header::for_dimensions`] both validate before returning, so a header
//! obtained from either is known-good; anything that changes dimensions builds
//! a fresh one rather than patching fields.

use super::BitmapError;
use super::calculations::{checked_file_size, checked_pixel_data_size, row_padding, row_stride};

/// Magic bytes at offset 0.
pub const SIGNATURE: [u8; 2] = *b"BM";

/// Bytes inspected by [`Header::parse`].
pub const PROBE_LEN: usize = 38;

/// Size of the file header plus the 40-byte info header written by the encoder.
pub const ENCODED_HEADER_LEN: u32 = 54;

/// Info header size written by the encoder.
pub const INFO_HEADER_LEN: u32 = 40;

/// The only bit depth this crate decodes.
pub const BITS_PER_PIXEL: u16 = 24;

/// Bit depths a well-formed container may declare.
pub const SUPPORTED_BIT_DEPTHS: [u16; 6] = [1, 4, 8, 16, 24, 32];

/// 96 DPI, written into the resolution fields on encode.
const PIXELS_PER_METER: u32 = 3780;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub signature: [u8; 2],
    pub file_size: u32,
    pub pixel_offset: u32,
    pub header_size: u32,
    pub width: u32,
    pub height: u32,
    pub color_planes: u16,
    pub bits_per_pixel: u16,
    pub compression: u32,
    pub pixel_data_size: u32,
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn format_error(msg: impl Into<String>) -> BitmapError {
    BitmapError::Format(msg.into())
}

impl Header {
    /// Header for a freshly encoded `width` x `height` 24-bit image.
    pub fn for_dimensions(width: u32, height: u32) -> Result<Self, BitmapError> {
        let pixel_data_size = checked_pixel_data_size(width, height).ok_or_else(|| {
            format_error(format!("{width}x{height} is too large for a bitmap"))
        })?;
        let file_size = checked_file_size(ENCODED_HEADER_LEN, width, height).ok_or_else(|| {
            format_error(format!("{width}x{height} is too large for a bitmap"))
        })?;
        let header = Self {
            signature: SIGNATURE,
            file_size,
            pixel_offset: ENCODED_HEADER_LEN,
            header_size: INFO_HEADER_LEN,
            width,
            height,
            color_planes: 1,
            bits_per_pixel: BITS_PER_PIXEL,
            compression: 0,
            pixel_data_size,
        };
        header.validate()?;
        Ok(header)
    }

    /// Read the header fields from the first [`PROBE_LEN`] bytes and validate
    /// them. No pixel byte is touched.
    pub fn parse(bytes: &[u8]) -> Result<Self, BitmapError> {
        if bytes.len() < PROBE_LEN {
            return Err(format_error(format!(
                "header is truncated: {} bytes, need at least {PROBE_LEN}",
                bytes.len()
            )));
        }
        let header = Self {
            signature: [bytes[0], bytes[1]],
            file_size: read_u32(bytes, 2),
            pixel_offset: read_u32(bytes, 10),
            header_size: read_u32(bytes, 14),
            width: read_u32(bytes, 18),
            height: read_u32(bytes, 22),
            color_planes: read_u16(bytes, 26),
            bits_per_pixel: read_u16(bytes, 28),
            compression: read_u32(bytes, 30),
            pixel_data_size: read_u32(bytes, 34),
        };
        header.validate()?;
        Ok(header)
    }

    /// Check every field against the constraints of the container.
    pub fn validate(&self) -> Result<(), BitmapError> {
        if self.signature != SIGNATURE {
            return Err(format_error(format!(
                "bad signature {:02x}{:02x}, expected {:02x}{:02x} (\"BM\")",
                self.signature[0], self.signature[1], SIGNATURE[0], SIGNATURE[1]
            )));
        }
        if self.color_planes != 1 {
            return Err(format_error(format!(
                "color plane count is {}, must be 1",
                self.color_planes
            )));
        }
        if !SUPPORTED_BIT_DEPTHS.contains(&self.bits_per_pixel) {
            return Err(format_error(format!(
                "unsupported bits per pixel: {}",
                self.bits_per_pixel
            )));
        }
        if self.bits_per_pixel != BITS_PER_PIXEL {
            return Err(format_error(format!(
                "{}-bit images are not supported, only {BITS_PER_PIXEL}-bit",
                self.bits_per_pixel
            )));
        }
        if self.compression != 0 {
            return Err(format_error(format!(
                "unsupported compression code {}, only 0 (uncompressed)",
                self.compression
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(format_error(format!(
                "image has no pixels: {}x{}",
                self.width, self.height
            )));
        }
        if (self.pixel_offset as usize) < PROBE_LEN {
            return Err(format_error(format!(
                "pixel data offset {} overlaps the header",
                self.pixel_offset
            )));
        }

        let expected_data = checked_pixel_data_size(self.width, self.height).ok_or_else(|| {
            format_error(format!("{}x{} is too large", self.width, self.height))
        })?;
        if self.pixel_data_size != 0 && self.pixel_data_size != expected_data {
            return Err(format_error(format!(
                "declared pixel data size {} does not match {expected_data} implied by {}x{}",
                self.pixel_data_size, self.width, self.height
            )));
        }

        let expected_file = checked_file_size(self.pixel_offset, self.width, self.height)
            .ok_or_else(|| format_error("declared pixel offset and size overflow"))?;
        if self.file_size != expected_file {
            return Err(format_error(format!(
                "declared file size {} does not match {expected_file} (offset {} + {} rows of {} bytes)",
                self.file_size,
                self.pixel_offset,
                self.height,
                self.row_stride()
            )));
        }
        Ok(())
    }

    pub fn row_stride(&self) -> u64 {
        row_stride(self.width)
    }

    pub fn row_padding(&self) -> u64 {
        row_padding(self.width)
    }

    /// Append the standard 54-byte header, zero-filled up to `pixel_offset`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.file_size.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // reserved
        out.extend_from_slice(&self.pixel_offset.to_le_bytes());
        out.extend_from_slice(&self.header_size.to_le_bytes());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.color_planes.to_le_bytes());
        out.extend_from_slice(&self.bits_per_pixel.to_le_bytes());
        out.extend_from_slice(&self.compression.to_le_bytes());
        out.extend_from_slice(&self.pixel_data_size.to_le_bytes());
        out.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
        out.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // colors used
        out.extend_from_slice(&0u32.to_le_bytes()); // important colors
        let written = out.len() - start;
        if (self.pixel_offset as usize) > written {
            out.resize(start + self.pixel_offset as usize, 0);
        }
    }
}
