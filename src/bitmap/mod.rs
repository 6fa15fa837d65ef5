//! Uncompressed 24-bit bitmap codec, bit-exact and hand-written.
//!
//! | Concern | Where |
//! |---|---|
//! | Row stride / padding arithmetic | [`calculations`] |
//! | Fixed-offset header fields, validation, serialization | [`header`] |
//! | In-memory [`Bitmap`], pixel access, decode / encode | [`codec`] |
//! | PNG/JPEG/BMP import and PNG export via the `image` crate | [`import`] |
//!
//! Pixel rows are stored bottom-up, each row padded to a 4-byte boundary,
//! channels in (blue, green, red) order. The accessors on [`Bitmap`] take
//! storage coordinates: `y == 0` is the visually bottom row.
//!
//! Only the first 38 header bytes are inspected when decoding. A decoded
//! bitmap re-emits everything before its pixel array verbatim on encode;
//! bitmaps built in memory get a fresh 54-byte header.

pub mod calculations;
mod codec;
pub mod header;
pub mod import;

use thiserror::Error;

pub use calculations::row_stride;
pub use codec::Bitmap;
pub use header::Header;

#[derive(Error, Debug)]
pub enum BitmapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Format error: {0}")]
    Format(String),
    #[error("Pixel at ({x}, {y}) is outside the {width}x{height} image")]
    OutOfRange {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    #[error("Import failed: {0}")]
    Import(String),
    #[error("Pixel access cancelled: the call ran out of time")]
    Cancelled,
}

/// Decode an encoded bitmap. See [`Bitmap::decode`].
pub fn decode(bytes: &[u8]) -> Result<Bitmap, BitmapError> {
    Bitmap::decode(bytes)
}

/// Encode a bitmap. See [`Bitmap::encode`].
pub fn encode(bitmap: &Bitmap) -> Result<Vec<u8>, BitmapError> {
    bitmap.encode()
}
