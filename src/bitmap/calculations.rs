//! Pure row-layout arithmetic shared by the encode and validate paths.
//!
//! Everything is computed in `u64` so a hostile header cannot overflow the
//! intermediate products; callers narrow with the `checked_*` helpers.

/// Bytes per stored pixel (blue, green, red).
pub const BYTES_PER_PIXEL: u64 = 3;

/// Rows are padded to a multiple of this many bytes.
pub const ROW_ALIGNMENT: u64 = 4;

/// Bytes occupied by one stored row, padding included.
///
/// ```
/// # use imagelab::bitmap::row_stride;
/// assert_eq!(row_stride(1), 4);
/// assert_eq!(row_stride(4), 12);
/// assert_eq!(row_stride(5), 16);
/// ```
pub fn row_stride(width: u32) -> u64 {
    (width as u64 * BYTES_PER_PIXEL).div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT
}

/// Padding bytes at the end of every stored row.
pub fn row_padding(width: u32) -> u64 {
    row_stride(width) - width as u64 * BYTES_PER_PIXEL
}

/// Size of the whole pixel array, if it fits the header's 32-bit field.
pub fn checked_pixel_data_size(width: u32, height: u32) -> Option<u32> {
    row_stride(width)
        .checked_mul(height as u64)
        .and_then(|n| u32::try_from(n).ok())
}

/// Total file size for a pixel array starting at `pixel_offset`, if it fits
/// the header's 32-bit field.
pub fn checked_file_size(pixel_offset: u32, width: u32, height: u32) -> Option<u32> {
    checked_pixel_data_size(width, height).and_then(|n| n.checked_add(pixel_offset))
}
