//! Shared test utilities for the imagelab test suite.
//!
//! Provides small fixture bitmaps, an on-disk input/golden store builder and
//! a handful of throwaway user modules (correct, buggy, hanging) that the
//! registry, adapter and harness tests share.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let inputs = write_inputs(tmp.path(), &[("quad", primaries_2x2())]);
//! assert_pixels(&inputs.load("quad").unwrap(), &[[RED, GREEN], [BLUE, WHITE]]);
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::bitmap::Bitmap;
use crate::invoke::{Invocation, PluginError};
use crate::registry::{Exports, ManipModule};
use crate::store::InputStore;
use crate::types::Rgb;

pub const RED: Rgb = Rgb::new(255, 0, 0);
pub const GREEN: Rgb = Rgb::new(0, 255, 0);
pub const BLUE: Rgb = Rgb::new(0, 0, 255);
pub const WHITE: Rgb = Rgb::WHITE;

// =========================================================================
// Fixture bitmaps
// =========================================================================

/// 2x2 image, storage order: row 0 = [red, green], row 1 = [blue, white].
pub fn primaries_2x2() -> Bitmap {
    from_rows(&[&[RED, GREEN], &[BLUE, WHITE]])
}

/// Build a bitmap from rows in storage order (first row is `y == 0`).
pub fn from_rows(rows: &[&[Rgb]]) -> Bitmap {
    let height = rows.len() as u32;
    let width = rows[0].len() as u32;
    let mut bitmap = Bitmap::new(width, height).unwrap();
    for (y, row) in rows.iter().enumerate() {
        for (x, color) in row.iter().enumerate() {
            bitmap.set_pixel(x as u32, y as u32, *color).unwrap();
        }
    }
    bitmap
}

/// A `width` x `height` gradient so every pixel is distinct.
pub fn gradient(width: u32, height: u32) -> Bitmap {
    let mut bitmap = Bitmap::new(width, height).unwrap();
    for y in 0..height {
        for x in 0..width {
            let c = Rgb::new((x * 40 % 256) as u8, (y * 40 % 256) as u8, 128);
            bitmap.set_pixel(x, y, c).unwrap();
        }
    }
    bitmap
}

/// Assert every pixel, rows given in storage order. Panics with the first
/// differing coordinate.
pub fn assert_pixels<const W: usize>(bitmap: &Bitmap, rows: &[[Rgb; W]]) {
    assert_eq!(bitmap.height() as usize, rows.len(), "height mismatch");
    assert_eq!(bitmap.width() as usize, W, "width mismatch");
    for (y, row) in rows.iter().enumerate() {
        for (x, expected) in row.iter().enumerate() {
            let actual = bitmap.get_pixel(x as u32, y as u32).unwrap();
            assert_eq!(actual, *expected, "pixel ({x}, {y}) mismatch");
        }
    }
}

// =========================================================================
// Store setup
// =========================================================================

/// Write each bitmap as `<name>.bmp` under `dir` and open it as a store.
pub fn write_inputs(dir: &Path, images: &[(&str, Bitmap)]) -> InputStore {
    std::fs::create_dir_all(dir).unwrap();
    for (name, bitmap) in images {
        bitmap.write(&dir.join(format!("{name}.bmp"))).unwrap();
    }
    InputStore::new(dir)
}

/// Temp dir holding an `inputs/` store with the standard fixtures.
pub fn fixture_inputs() -> (TempDir, InputStore) {
    let tmp = TempDir::new().unwrap();
    let inputs = write_inputs(
        &tmp.path().join("inputs"),
        &[
            ("quad", primaries_2x2()),
            ("wide", gradient(5, 3)),
            ("tall", gradient(3, 6)),
        ],
    );
    (tmp, inputs)
}

// =========================================================================
// Throwaway user modules
// =========================================================================

fn zero_red(mut img: Bitmap, _: &mut Invocation) -> Result<Bitmap, PluginError> {
    for y in 0..img.height() {
        for x in 0..img.width() {
            let c = img.get_pixel(x, y)?;
            img.set_pixel(x, y, Rgb { r: 0, ..c })?;
        }
    }
    Ok(img)
}

fn zero_green(mut img: Bitmap, _: &mut Invocation) -> Result<Bitmap, PluginError> {
    for y in 0..img.height() {
        for x in 0..img.width() {
            let c = img.get_pixel(x, y)?;
            img.set_pixel(x, y, Rgb { g: 0, ..c })?;
        }
    }
    Ok(img)
}

fn paint(mut img: Bitmap, inv: &mut Invocation) -> Result<Bitmap, PluginError> {
    let at = inv
        .clicked_coordinate
        .and_then(|c| c.to_storage(img.height()))
        .ok_or_else(|| PluginError::Failed("no coordinate".into()))?;
    img.set_pixel(at.x, at.y, inv.color)?;
    Ok(img)
}

fn average(mut img: Bitmap, inv: &mut Invocation) -> Result<Bitmap, PluginError> {
    let other = inv
        .other_image
        .as_ref()
        .ok_or_else(|| PluginError::Failed("no second image".into()))?;
    for y in 0..img.height().min(other.height()) {
        for x in 0..img.width().min(other.width()) {
            let a = img.get_pixel(x, y)?;
            let b = other.get_pixel(x, y)?;
            let mid = |p: u8, q: u8| ((p as u16 + q as u16) / 2) as u8;
            img.set_pixel(x, y, Rgb::new(mid(a.r, b.r), mid(a.g, b.g), mid(a.b, b.b)))?;
        }
    }
    Ok(img)
}

fn noise(mut img: Bitmap, inv: &mut Invocation) -> Result<Bitmap, PluginError> {
    use rand::Rng;
    for y in 0..img.height() {
        for x in 0..img.width() {
            let v: u8 = inv.rng.gen_range(0..=255);
            img.set_pixel(x, y, Rgb::new(v, v, v))?;
        }
    }
    Ok(img)
}

/// Never finishes on its own; stops at the first pixel read after the
/// caller gives up.
fn hang(img: Bitmap, _: &mut Invocation) -> Result<Bitmap, PluginError> {
    loop {
        img.get_pixel(0, 0)?;
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

/// Sleeps through its cancellation.
fn stall(img: Bitmap, _: &mut Invocation) -> Result<Bitmap, PluginError> {
    std::thread::sleep(std::time::Duration::from_secs(1));
    Ok(img)
}

fn shrink_buffer(img: Bitmap, _: &mut Invocation) -> Result<Bitmap, PluginError> {
    let (w, h) = (img.width(), img.height());
    let mut data = img.into_raw();
    data.truncate(data.len() / 2);
    Ok(Bitmap::from_raw(w, h, data))
}

fn explode(_: Bitmap, _: &mut Invocation) -> Result<Bitmap, PluginError> {
    panic!("index out of bounds");
}

fn refuse(_: Bitmap, _: &mut Invocation) -> Result<Bitmap, PluginError> {
    Err(PluginError::Failed("extra must be a number".into()))
}

fn crop_to_one(img: Bitmap, _: &mut Invocation) -> Result<Bitmap, PluginError> {
    let mut out = Bitmap::new(1, 1)?;
    out.set_pixel(0, 0, img.get_pixel(0, 0)?)?;
    Ok(out)
}

/// Reference behaviour: `remove_red`, `paint`, `average`, `noise`.
pub struct ReferenceModule;

impl ManipModule for ReferenceModule {
    fn name(&self) -> &str {
        "reference"
    }

    fn export(&self, exports: &mut Exports) -> Result<(), String> {
        exports
            .filter("remove_red", zero_red)
            .tool("paint", paint)
            .filter_with_images("average", 2, average)
            .filter("noise", noise)
            .filter("crop", crop_to_one);
        Ok(())
    }
}

/// Same names as [`ReferenceModule`], with bugs and contract breaches.
pub struct FaultyModule;

impl ManipModule for FaultyModule {
    fn name(&self) -> &str {
        "faulty"
    }

    fn export(&self, exports: &mut Exports) -> Result<(), String> {
        exports
            .filter("remove_red", zero_green)
            .filter("average", average)
            .filter("noise", hang)
            .filter("stall", stall)
            .filter("shrink", shrink_buffer)
            .filter("explode", explode)
            .filter("refuse", refuse);
        Ok(())
    }
}

/// A module whose source "fails to compile".
pub struct BrokenModule;

impl ManipModule for BrokenModule {
    fn name(&self) -> &str {
        "broken"
    }

    fn export(&self, _: &mut Exports) -> Result<(), String> {
        Err("syntax error on line 12".into())
    }
}
