use super::BitmapError;
use super::calculations::{BYTES_PER_PIXEL, row_padding, row_stride};
use super::header::Header;
use crate::types::{CancelFlag, Rgb};
use std::path::Path;

/// A decoded 24-bit image.
///
/// `data` holds the pixel array exactly as stored in the file: bottom-up
/// rows of (blue, green, red) triples, each row padded to 4 bytes. A valid
/// bitmap has `data.len() == height * row_stride(width)`; [`Bitmap::validate`]
/// checks that, and every constructor except [`Bitmap::from_raw`] guarantees
/// it.
///
/// A decoded bitmap remembers the bytes that preceded its pixel array and
/// writes them back unchanged on encode. Equality only looks at dimensions
/// and pixel data.
#[derive(Debug, Clone)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
    /// Bytes `0..pixel_offset` of the file this was decoded from.
    preamble: Option<Vec<u8>>,
    cancel: Option<CancelFlag>,
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.data == other.data
    }
}

impl Eq for Bitmap {}

impl Bitmap {
    /// A black `width` x `height` image.
    pub fn new(width: u32, height: u32) -> Result<Self, BitmapError> {
        let header = Header::for_dimensions(width, height)?;
        Ok(Self::from_raw(
            width,
            height,
            vec![0; header.pixel_data_size as usize],
        ))
    }

    /// A `width` x `height` image with every pixel set to `color`.
    pub fn filled(width: u32, height: u32, color: Rgb) -> Result<Self, BitmapError> {
        let mut bitmap = Self::new(width, height)?;
        for y in 0..height {
            for x in 0..width {
                bitmap.set_pixel(x, y, color)?;
            }
        }
        Ok(bitmap)
    }

    /// Wrap a raw pixel array without checking it.
    ///
    /// Anything built this way must pass [`Bitmap::validate`] before it is
    /// encoded; the invocation adapter does exactly that with plugin results.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            preamble: None,
            cancel: None,
        }
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_stride(&self) -> usize {
        row_stride(self.width) as usize
    }

    pub fn row_padding(&self) -> usize {
        row_padding(self.width) as usize
    }

    /// The stored pixel array, padding included.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Make every pixel access fail with [`BitmapError::Cancelled`] once
    /// `flag` is raised.
    pub fn watch(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Header this bitmap encodes with: the decoded one if there is one,
    /// otherwise a fresh 54-byte header.
    pub fn header(&self) -> Result<Header, BitmapError> {
        match &self.preamble {
            Some(preamble) => Header::parse(preamble),
            None => Header::for_dimensions(self.width, self.height),
        }
    }

    /// Check the buffer against the header this bitmap would encode with.
    pub fn validate(&self) -> Result<Header, BitmapError> {
        let header = Header::for_dimensions(self.width, self.height)?;
        if self.data.len() != header.pixel_data_size as usize {
            return Err(BitmapError::Format(format!(
                "pixel buffer holds {} bytes, {}x{} needs {} ({} rows of {} bytes)",
                self.data.len(),
                self.width,
                self.height,
                header.pixel_data_size,
                self.height,
                header.row_stride()
            )));
        }
        Ok(header)
    }

    /// Decode an encoded bitmap. The header is fully validated before any
    /// pixel byte is read.
    pub fn decode(bytes: &[u8]) -> Result<Self, BitmapError> {
        let header = Header::parse(bytes)?;
        if bytes.len() < header.file_size as usize {
            return Err(BitmapError::Format(format!(
                "file is truncated: {} bytes, header declares {}",
                bytes.len(),
                header.file_size
            )));
        }
        let start = header.pixel_offset as usize;
        let end = header.file_size as usize;
        Ok(Self {
            width: header.width,
            height: header.height,
            data: bytes[start..end].to_vec(),
            preamble: Some(bytes[..start].to_vec()),
            cancel: None,
        })
    }

    /// Encode the image. A decoded bitmap keeps its original header bytes,
    /// so `encode(decode(b)) == b` for any `b` that decodes; anything else
    /// gets a fresh 54-byte header. Padding bytes are written as they are
    /// stored; [`Bitmap::new`] zeroes them.
    pub fn encode(&self) -> Result<Vec<u8>, BitmapError> {
        let fresh = self.validate()?;
        let mut out = Vec::with_capacity(fresh.file_size as usize);
        match &self.preamble {
            Some(preamble) => out.extend_from_slice(preamble),
            None => fresh.write_to(&mut out),
        }
        out.extend_from_slice(&self.data);
        Ok(out)
    }

    pub fn read(path: &Path) -> Result<Self, BitmapError> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }

    pub fn write(&self, path: &Path) -> Result<(), BitmapError> {
        std::fs::write(path, self.encode()?)?;
        Ok(())
    }

    /// Byte offset of the (blue) channel of pixel `(x, y)` in storage order.
    fn offset(&self, x: u32, y: u32) -> Result<usize, BitmapError> {
        if self.cancel.as_ref().is_some_and(CancelFlag::is_raised) {
            return Err(BitmapError::Cancelled);
        }
        if x >= self.width || y >= self.height {
            return Err(BitmapError::OutOfRange {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        let offset = y as usize * self.row_stride() + x as usize * BYTES_PER_PIXEL as usize;
        if offset + 3 > self.data.len() {
            return Err(BitmapError::Format(format!(
                "pixel ({x}, {y}) lies past the end of a {}-byte buffer",
                self.data.len()
            )));
        }
        Ok(offset)
    }

    /// Read pixel `(x, y)`; `y == 0` is the bottom row.
    pub fn get_pixel(&self, x: u32, y: u32) -> Result<Rgb, BitmapError> {
        let i = self.offset(x, y)?;
        Ok(Rgb::new(self.data[i + 2], self.data[i + 1], self.data[i]))
    }

    /// Write pixel `(x, y)`; `y == 0` is the bottom row.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgb) -> Result<(), BitmapError> {
        let i = self.offset(x, y)?;
        self.data[i] = color.b;
        self.data[i + 1] = color.g;
        self.data[i + 2] = color.r;
        Ok(())
    }

    /// Storage row of a top-down row index.
    pub fn storage_row(&self, y_top_down: u32) -> Result<u32, BitmapError> {
        if y_top_down >= self.height {
            return Err(BitmapError::OutOfRange {
                x: 0,
                y: y_top_down,
                width: self.width,
                height: self.height,
            });
        }
        Ok(self.height - 1 - y_top_down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{BLUE, GREEN, RED, primaries_2x2};

    #[test]
    fn new_is_black_with_zero_padding() {
        let bitmap = Bitmap::new(3, 2).unwrap();
        assert_eq!(bitmap.row_stride(), 12);
        assert_eq!(bitmap.row_padding(), 3);
        assert!(bitmap.data().iter().all(|&b| b == 0));
        assert_eq!(bitmap.data().len(), 24);
    }

    #[test]
    fn set_pixel_stores_blue_green_red() {
        let mut bitmap = Bitmap::new(2, 1).unwrap();
        bitmap.set_pixel(1, 0, Rgb::new(10, 20, 30)).unwrap();
        assert_eq!(&bitmap.data()[3..6], &[30, 20, 10]);
        assert_eq!(bitmap.get_pixel(1, 0).unwrap(), Rgb::new(10, 20, 30));
    }

    #[test]
    fn row_zero_is_first_in_buffer() {
        let mut bitmap = Bitmap::new(1, 2).unwrap();
        bitmap.set_pixel(0, 0, RED).unwrap();
        // Row 0 occupies bytes 0..4 (3 channel bytes + 1 padding byte).
        assert_eq!(&bitmap.data()[0..4], &[0, 0, 255, 0]);
        assert_eq!(&bitmap.data()[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn out_of_range_is_an_error_not_a_clamp() {
        let mut bitmap = Bitmap::new(2, 2).unwrap();
        assert!(matches!(
            bitmap.get_pixel(2, 0),
            Err(BitmapError::OutOfRange { x: 2, y: 0, .. })
        ));
        assert!(matches!(
            bitmap.set_pixel(0, 5, RED),
            Err(BitmapError::OutOfRange { y: 5, .. })
        ));
    }

    #[test]
    fn encode_decode_round_trip_is_byte_exact() {
        let bytes = primaries_2x2().encode().unwrap();
        assert_eq!(bytes.len(), 54 + 16);
        let decoded = Bitmap::decode(&bytes).unwrap();
        assert_eq!(decoded, primaries_2x2());
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn decode_reads_pixels_after_declared_offset() {
        let mut bytes = Vec::new();
        let mut header = Header::for_dimensions(1, 1).unwrap();
        header.pixel_offset = 60;
        header.file_size = 64;
        header.write_to(&mut bytes);
        assert_eq!(bytes.len(), 60);
        bytes.extend_from_slice(&[1, 2, 3, 0]);

        let bitmap = Bitmap::decode(&bytes).unwrap();
        assert_eq!(bitmap.get_pixel(0, 0).unwrap(), Rgb::new(3, 2, 1));
    }

    #[test]
    fn zero_pixel_data_size_survives_round_trip() {
        let mut bytes = Bitmap::filled(3, 2, RED).unwrap().encode().unwrap();
        bytes[34..38].copy_from_slice(&0u32.to_le_bytes());

        let decoded = Bitmap::decode(&bytes).unwrap();
        assert_eq!(decoded.header().unwrap().pixel_data_size, 0);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn custom_offset_and_resolution_survive_round_trip() {
        let mut bytes = Vec::new();
        let mut header = Header::for_dimensions(2, 2).unwrap();
        header.pixel_offset = 60;
        header.file_size = 60 + 16;
        header.write_to(&mut bytes);
        bytes[38..42].copy_from_slice(&2835u32.to_le_bytes());
        bytes[54..60].copy_from_slice(b"gap!!!");
        bytes.extend_from_slice(primaries_2x2().data());

        let decoded = Bitmap::decode(&bytes).unwrap();
        assert_eq!(decoded, primaries_2x2());
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn edited_decoded_bitmap_keeps_its_header() {
        let mut bytes = primaries_2x2().encode().unwrap();
        bytes[34..38].copy_from_slice(&0u32.to_le_bytes());
        let mut decoded = Bitmap::decode(&bytes).unwrap();
        decoded.set_pixel(0, 0, BLUE).unwrap();

        let encoded = decoded.encode().unwrap();
        assert_eq!(encoded[..54], bytes[..54]);
        assert_eq!(Bitmap::decode(&encoded).unwrap().get_pixel(0, 0).unwrap(), BLUE);
    }

    #[test]
    fn raised_flag_stops_pixel_access() {
        let flag = CancelFlag::new();
        let mut bitmap = primaries_2x2().watch(flag.clone());
        assert_eq!(bitmap.get_pixel(0, 0).unwrap(), RED);

        flag.raise();
        assert!(matches!(bitmap.get_pixel(0, 0), Err(BitmapError::Cancelled)));
        assert!(matches!(bitmap.set_pixel(0, 0, BLUE), Err(BitmapError::Cancelled)));
    }

    #[test]
    fn decode_rejects_truncated_pixels() {
        let bytes = primaries_2x2().encode().unwrap();
        let result = Bitmap::decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(BitmapError::Format(m)) if m.contains("truncated")));
    }

    #[test]
    fn validate_catches_wrong_buffer_length() {
        let bitmap = Bitmap::from_raw(2, 2, vec![0; 12]);
        assert!(matches!(bitmap.validate(), Err(BitmapError::Format(_))));
        assert!(bitmap.encode().is_err());
    }

    #[test]
    fn accessors_on_short_raw_buffer_fail_cleanly() {
        let bitmap = Bitmap::from_raw(2, 2, vec![0; 4]);
        assert!(matches!(bitmap.get_pixel(1, 1), Err(BitmapError::Format(_))));
    }

    #[test]
    fn filled_sets_every_pixel() {
        let bitmap = Bitmap::filled(3, 3, GREEN).unwrap();
        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(bitmap.get_pixel(x, y).unwrap(), GREEN);
            }
        }
    }

    #[test]
    fn storage_row_flips() {
        let bitmap = Bitmap::filled(1, 4, BLUE).unwrap();
        assert_eq!(bitmap.storage_row(0).unwrap(), 3);
        assert_eq!(bitmap.storage_row(3).unwrap(), 0);
        assert!(bitmap.storage_row(4).is_err());
    }

    #[test]
    fn write_and_read_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("p.bmp");
        primaries_2x2().write(&path).unwrap();
        assert_eq!(Bitmap::read(&path).unwrap(), primaries_2x2());
    }
}
