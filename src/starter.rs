//! Starter manipulations linked into the CLI.
//!
//! These are ordinary user code: they reach the harness and the workspace
//! only through [`ManipModule::export`], exactly like a student module
//! would. They double as the reference module for `imagelab snapshot`.

use crate::bitmap::Bitmap;
use crate::invoke::{Invocation, PluginError};
use crate::registry::{Exports, ManipModule};
use crate::types::{Coordinate, Rgb};

pub struct Starter;

impl ManipModule for Starter {
    fn name(&self) -> &str {
        "starter"
    }

    fn export(&self, exports: &mut Exports) -> Result<(), String> {
        exports
            .tool("change_pixel", change_pixel)
            .tool("change_9_pixels", change_9_pixels)
            .filter("remove_red", remove_red)
            .filter("remove_green", remove_green)
            .filter("remove_blue", remove_blue);
        Ok(())
    }
}

fn map_pixels(mut img: Bitmap, f: impl Fn(Rgb) -> Rgb) -> Result<Bitmap, PluginError> {
    for y in 0..img.height() {
        for x in 0..img.width() {
            let c = img.get_pixel(x, y)?;
            img.set_pixel(x, y, f(c))?;
        }
    }
    Ok(img)
}

/// The click in storage coordinates.
fn clicked(img: &Bitmap, inv: &Invocation) -> Result<Coordinate, PluginError> {
    inv.clicked_coordinate
        .ok_or_else(|| PluginError::Failed("no pixel was clicked".into()))?
        .to_storage(img.height())
        .ok_or_else(|| PluginError::Failed("clicked outside the image".into()))
}

pub fn remove_red(img: Bitmap, _: &mut Invocation) -> Result<Bitmap, PluginError> {
    map_pixels(img, |c| Rgb { r: 0, ..c })
}

pub fn remove_green(img: Bitmap, _: &mut Invocation) -> Result<Bitmap, PluginError> {
    map_pixels(img, |c| Rgb { g: 0, ..c })
}

pub fn remove_blue(img: Bitmap, _: &mut Invocation) -> Result<Bitmap, PluginError> {
    map_pixels(img, |c| Rgb { b: 0, ..c })
}

pub fn change_pixel(mut img: Bitmap, inv: &mut Invocation) -> Result<Bitmap, PluginError> {
    let at = clicked(&img, inv)?;
    img.set_pixel(at.x, at.y, inv.color)?;
    Ok(img)
}

/// Paint the clicked pixel and its eight neighbours. Neighbours that fall
/// outside the image are left out.
pub fn change_9_pixels(mut img: Bitmap, inv: &mut Invocation) -> Result<Bitmap, PluginError> {
    let at = clicked(&img, inv)?;
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            let (x, y) = (at.x as i64 + dx, at.y as i64 + dy);
            if x < 0 || y < 0 || x >= img.width() as i64 || y >= img.height() as i64 {
                continue;
            }
            img.set_pixel(x as u32, y as u32, inv.color)?;
        }
    }
    Ok(img)
}
