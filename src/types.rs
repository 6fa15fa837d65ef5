//! Value types shared by the codec, the registry, the invocation adapter and
//! the harness.
//!
//! The value types serialize compactly so they can appear in suite files and JSON
//! reports: [`Rgb`] as `[r, g, b]`, [`Coordinate`] as `[x, y]` and
//! [`ManipKind`] as `"tool"` / `"filter"`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A colour as red, green and blue channel values.
///
/// Bitmaps store channels as (blue, green, red); the codec converts at the
/// pixel accessors so nothing outside [`crate::bitmap`] sees storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Largest per-channel absolute difference to `other`.
    pub fn max_channel_delta(self, other: Rgb) -> u8 {
        self.r
            .abs_diff(other.r)
            .max(self.g.abs_diff(other.g))
            .max(self.b.abs_diff(other.b))
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        [c.r, c.g, c.b]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.r, self.g, self.b)
    }
}

/// A pixel position.
///
/// Whether `y` counts from the top or from the bottom depends on who holds
/// it: click coordinates coming from the GUI are top-down, the codec's pixel
/// accessors are bottom-up (storage order). [`Coordinate::to_storage`]
/// converts the former into the latter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct Coordinate {
    pub x: u32,
    pub y: u32,
}

impl Coordinate {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Flip a top-down coordinate into storage order for an image of
    /// `height` rows. `None` when `y` is not a row of that image.
    pub fn to_storage(self, height: u32) -> Option<Coordinate> {
        if self.y >= height {
            return None;
        }
        Some(Coordinate {
            x: self.x,
            y: height - 1 - self.y,
        })
    }
}

impl From<[u32; 2]> for Coordinate {
    fn from([x, y]: [u32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Coordinate> for [u32; 2] {
    fn from(c: Coordinate) -> Self {
        [c.x, c.y]
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The two kinds of manipulation a user module can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManipKind {
    /// Interactive, driven by a clicked coordinate.
    Tool,
    /// Whole-image, driven only by color and free text.
    Filter,
}

impl fmt::Display for ManipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManipKind::Tool => f.write_str("tool"),
            ManipKind::Filter => f.write_str("filter"),
        }
    }
}

/// Shared flag raised when a supervised call is abandoned.
///
/// Clones observe the same flag. Pixel accessors on a watched
/// [`crate::bitmap::Bitmap`] fail once it is raised, so a plugin looping over
/// pixels stops at its next access.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
