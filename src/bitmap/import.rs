//! Bridge to the `image` crate for anything that is not already a 24-bit
//! bitmap: photos dropped into the workspace, PNG originals in an input
//! store, PNG previews of results.
//!
//! Files that carry the `BM` signature always go through the strict codec,
//! so a malformed bitmap surfaces as a format error instead of being
//! silently re-encoded.

use super::header::SIGNATURE;
use super::{Bitmap, BitmapError};
use crate::types::Rgb;
use image::RgbImage;
use std::path::Path;

/// Load any supported image file as a 24-bit bitmap.
pub fn load(path: &Path) -> Result<Bitmap, BitmapError> {
    let bytes = std::fs::read(path)?;
    if bytes.starts_with(&SIGNATURE) {
        return Bitmap::decode(&bytes);
    }
    let img = image::load_from_memory(&bytes).map_err(|e| {
        BitmapError::Import(format!("Failed to decode {}: {}", path.display(), e))
    })?;
    from_rgb_image(&img.to_rgb8())
}

/// Convert a top-down RGB raster into storage order.
pub fn from_rgb_image(img: &RgbImage) -> Result<Bitmap, BitmapError> {
    let (width, height) = img.dimensions();
    let mut bitmap = Bitmap::new(width, height)?;
    for (x, y, px) in img.enumerate_pixels() {
        let [r, g, b] = px.0;
        bitmap.set_pixel(x, height - 1 - y, Rgb::new(r, g, b))?;
    }
    Ok(bitmap)
}

/// Convert a bitmap into a top-down RGB raster.
pub fn to_rgb_image(bitmap: &Bitmap) -> Result<RgbImage, BitmapError> {
    bitmap.validate()?;
    let (width, height) = (bitmap.width(), bitmap.height());
    let mut raster = Vec::with_capacity(width as usize * height as usize * 3);
    for y in (0..height).rev() {
        for x in 0..width {
            let c = bitmap.get_pixel(x, y)?;
            raster.extend_from_slice(&[c.r, c.g, c.b]);
        }
    }
    RgbImage::from_raw(width, height, raster)
        .ok_or_else(|| BitmapError::Import("raster size mismatch".into()))
}

/// Write a PNG preview of `bitmap`.
pub fn export_png(bitmap: &Bitmap, path: &Path) -> Result<(), BitmapError> {
    to_rgb_image(bitmap)?
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| BitmapError::Import(format!("Failed to write {}: {}", path.display(), e)))
}
