//! Editing session state for an interactive front end.
//!
//! A [`Workspace`] owns two image slots, knows which one is active, and holds
//! the chosen color and the free-text field. Front ends keep one workspace
//! per window and pass it by `&mut` to whatever handles a click or a button.
//!
//! Applying a manipulation runs it on a copy of the active image and, on
//! success, replaces the active image with the result. When the function
//! accepts a second image and the other slot holds one, that image is passed
//! along as `other_image`. A failing call leaves both slots untouched.
//!
//! The `_select_*` helpers are built in rather than exported by user
//! modules, which is why the registry reserves that prefix.

use crate::bitmap::{Bitmap, BitmapError, import};
use crate::invoke::{InvokeError, Params, invoke};
use crate::registry::ManipulationDescriptor;
use crate::types::{Coordinate, ManipKind, Rgb};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Primary,
    Secondary,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::Primary => Slot::Secondary,
            Slot::Secondary => Slot::Primary,
        }
    }

    fn index(self) -> usize {
        match self {
            Slot::Primary => 0,
            Slot::Secondary => 1,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Primary => write!(f, "primary"),
            Slot::Secondary => write!(f, "secondary"),
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("the {0} slot has no image loaded")]
    Empty(Slot),
    #[error("{function}() is a {actual}, not a {expected}")]
    WrongKind {
        function: String,
        expected: ManipKind,
        actual: ManipKind,
    },
    #[error("({x}, {y}) is outside the {width}x{height} image")]
    OutsideImage {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error(transparent)]
    Bitmap(#[from] BitmapError),
}

#[derive(Debug, Clone)]
pub struct Workspace {
    slots: [Option<Bitmap>; 2],
    active: Slot,
    pub color: Rgb,
    pub extra: String,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            slots: [None, None],
            active: Slot::Primary,
            color: Rgb::BLACK,
            extra: String::new(),
        }
    }

    pub fn active(&self) -> Slot {
        self.active
    }

    pub fn set_active(&mut self, slot: Slot) {
        self.active = slot;
    }

    pub fn image(&self, slot: Slot) -> Option<&Bitmap> {
        self.slots[slot.index()].as_ref()
    }

    pub fn set_image(&mut self, slot: Slot, image: Bitmap) {
        self.slots[slot.index()] = Some(image);
    }

    /// Load a BMP, PNG or JPEG into `slot`.
    pub fn load(&mut self, slot: Slot, path: &Path) -> Result<(), WorkspaceError> {
        let image = import::load(path)?;
        log::info!(
            "loaded {} ({}x{}) into the {slot} slot",
            path.display(),
            image.width(),
            image.height()
        );
        self.set_image(slot, image);
        Ok(())
    }

    /// Write `slot` as a 24-bit BMP.
    pub fn save(&self, slot: Slot, path: &Path) -> Result<(), WorkspaceError> {
        let image = self.image(slot).ok_or(WorkspaceError::Empty(slot))?;
        image.write(path)?;
        Ok(())
    }

    fn active_image(&self) -> Result<&Bitmap, WorkspaceError> {
        self.image(self.active)
            .ok_or(WorkspaceError::Empty(self.active))
    }

    fn expect_kind(
        descriptor: &ManipulationDescriptor,
        expected: ManipKind,
    ) -> Result<(), WorkspaceError> {
        let actual = descriptor.kind();
        if actual != expected {
            return Err(WorkspaceError::WrongKind {
                function: descriptor.name.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn run(
        &mut self,
        descriptor: &ManipulationDescriptor,
        click: Option<Coordinate>,
    ) -> Result<(), WorkspaceError> {
        let primary = self.active_image()?;
        let mut params = Params::new(self.color, self.extra.clone());
        if descriptor.images > 1
            && let Some(other) = self.image(self.active.other())
        {
            params = params.with_other_image(other.clone());
        }
        if let Some(at) = click {
            params = params.with_click(at);
        }
        let result = invoke(descriptor, primary, params, rand::random::<u64>())?;
        self.set_image(self.active, result);
        Ok(())
    }

    /// Run a filter over the active image.
    pub fn apply_filter(
        &mut self,
        descriptor: &ManipulationDescriptor,
    ) -> Result<(), WorkspaceError> {
        Self::expect_kind(descriptor, ManipKind::Filter)?;
        self.run(descriptor, None)
    }

    /// Run a tool at a top-down click position on the active image.
    pub fn apply_tool(
        &mut self,
        descriptor: &ManipulationDescriptor,
        at: Coordinate,
    ) -> Result<(), WorkspaceError> {
        Self::expect_kind(descriptor, ManipKind::Tool)?;
        self.run(descriptor, Some(at))
    }

    /// Pick up the color under a top-down position of the active image.
    pub fn select_color(&mut self, at: Coordinate) -> Result<Rgb, WorkspaceError> {
        let image = self.active_image()?;
        let outside = || WorkspaceError::OutsideImage {
            x: at.x,
            y: at.y,
            width: image.width(),
            height: image.height(),
        };
        let storage = at.to_storage(image.height()).ok_or_else(outside)?;
        let color = image
            .get_pixel(storage.x, storage.y)
            .map_err(|_| outside())?;
        self.color = color;
        Ok(color)
    }

    /// Write a top-down position into the free-text field as `"x, y"`.
    pub fn select_coordinate(&mut self, at: Coordinate) {
        self.extra = format!("{}, {}", at.x, at.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::starter::Starter;
    use crate::test_helpers::{
        BLUE, GREEN, ReferenceModule, WHITE, assert_pixels, primaries_2x2,
    };
    use tempfile::TempDir;

    fn loaded() -> Workspace {
        let mut ws = Workspace::new();
        ws.set_image(Slot::Primary, primaries_2x2());
        ws
    }

    #[test]
    fn filter_replaces_only_the_active_slot() {
        let registry = Registry::load(&Starter).unwrap();
        let mut ws = loaded();
        ws.set_image(Slot::Secondary, primaries_2x2());

        ws.apply_filter(registry.get("remove_red").unwrap()).unwrap();
        assert_eq!(ws.image(Slot::Primary).unwrap().get_pixel(0, 0).unwrap(), Rgb::BLACK);
        assert_eq!(ws.image(Slot::Secondary).unwrap(), &primaries_2x2());
    }

    #[test]
    fn tool_paints_with_the_chosen_color() {
        let registry = Registry::load(&Starter).unwrap();
        let mut ws = loaded();
        ws.color = Rgb::new(1, 2, 3);
        ws.apply_tool(registry.get("change_pixel").unwrap(), Coordinate::new(0, 1))
            .unwrap();
        assert_pixels(
            ws.image(Slot::Primary).unwrap(),
            &[[Rgb::new(1, 2, 3), GREEN], [BLUE, WHITE]],
        );
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let registry = Registry::load(&Starter).unwrap();
        let mut ws = loaded();
        let err = ws
            .apply_filter(registry.get("change_pixel").unwrap())
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::WrongKind { .. }));
        assert_eq!(ws.image(Slot::Primary).unwrap(), &primaries_2x2());
    }

    #[test]
    fn other_slot_is_passed_to_two_image_functions() {
        let registry = Registry::load(&ReferenceModule).unwrap();
        let mut ws = Workspace::new();
        ws.set_image(Slot::Secondary, Bitmap::filled(2, 2, Rgb::BLACK).unwrap());
        ws.set_image(Slot::Primary, Bitmap::filled(2, 2, WHITE).unwrap());
        ws.set_active(Slot::Secondary);

        ws.apply_filter(registry.get("average").unwrap()).unwrap();
        assert_eq!(
            ws.image(Slot::Secondary).unwrap().get_pixel(0, 0).unwrap(),
            Rgb::new(127, 127, 127)
        );
    }

    #[test]
    fn empty_active_slot_is_an_error() {
        let registry = Registry::load(&Starter).unwrap();
        let mut ws = Workspace::new();
        let err = ws
            .apply_filter(registry.get("remove_red").unwrap())
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::Empty(Slot::Primary)));
    }

    #[test]
    fn select_helpers() {
        let mut ws = loaded();
        // top-down (0, 0) is storage row 1: blue
        assert_eq!(ws.select_color(Coordinate::new(0, 0)).unwrap(), BLUE);
        assert_eq!(ws.color, BLUE);
        assert!(matches!(
            ws.select_color(Coordinate::new(5, 0)),
            Err(WorkspaceError::OutsideImage { .. })
        ));

        ws.select_coordinate(Coordinate::new(12, 7));
        assert_eq!(ws.extra, "12, 7");
        assert_eq!(ws.color, BLUE);
    }

    #[test]
    fn save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.bmp");
        loaded().save(Slot::Primary, &path).unwrap();

        let mut ws = Workspace::new();
        ws.load(Slot::Secondary, &path).unwrap();
        assert_eq!(ws.image(Slot::Secondary).unwrap(), &primaries_2x2());
        assert!(matches!(
            ws.save(Slot::Primary, &path),
            Err(WorkspaceError::Empty(Slot::Primary))
        ));
    }
}
