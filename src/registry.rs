//! Plugin discovery: turns a user module's exports into typed descriptors.
//!
//! A user module implements [`ManipModule`] and registers its functions
//! through [`Exports`]. An [`Export`] can only be created by those
//! registration calls, so every entry the registry sees has been through the
//! export mechanism and carries a kind tag of exactly `tool` or `filter`.
//!
//! Discovery then checks each entry on its own. Entries with an empty name, a
//! reserved `_select_` prefix, a duplicate name or an image arity other than
//! 1 or 2 are skipped with a [`Diagnostic`]; the rest of the module is still
//! discovered. A module whose `export` call fails as a whole is a
//! [`RegistryError::PluginLoad`], which the harness turns into skips for
//! every case that depends on it.
//!
//! [`Registry`] is the cached lookup built once per module load and shared,
//! read-only, by the harness, the snapshot tool and the workspace.

use crate::invoke::{Invocation, PluginError};
use crate::bitmap::Bitmap;
use crate::types::ManipKind;
use std::collections::BTreeMap;
use thiserror::Error;

/// Every plugin takes its own copy of the primary image and returns the
/// resulting image. Mutating the argument and returning it is the in-place
/// style; building a new [`Bitmap`] is the replacement style.
pub type ManipFn = fn(Bitmap, &mut Invocation) -> Result<Bitmap, PluginError>;

/// Reserved for the workspace's built-in selection helpers.
pub const RESERVED_PREFIX: &str = "_select_";

/// Maximum number of image parameters a plugin may declare.
pub const MAX_IMAGE_PARAMS: usize = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("module {module} failed to load: {reason}")]
    PluginLoad { module: String, reason: String },
}

/// A user module that can be linked into the harness or the workspace.
pub trait ManipModule: Sync {
    fn name(&self) -> &str;

    /// Register every exported function. An `Err` means the module as a whole
    /// could not be loaded.
    fn export(&self, exports: &mut Exports) -> Result<(), String>;
}

/// One registered function, as handed over by the module.
#[derive(Debug, Clone)]
pub struct Export {
    name: String,
    kind: ManipKind,
    images: usize,
    func: ManipFn,
}

/// Registration sink passed to [`ManipModule::export`].
#[derive(Debug, Default)]
pub struct Exports {
    entries: Vec<Export>,
}

impl Exports {
    fn push(&mut self, name: &str, kind: ManipKind, images: usize, func: ManipFn) -> &mut Self {
        self.entries.push(Export {
            name: name.to_string(),
            kind,
            images,
            func,
        });
        self
    }

    /// Register a tool taking one image.
    pub fn tool(&mut self, name: &str, func: ManipFn) -> &mut Self {
        self.push(name, ManipKind::Tool, 1, func)
    }

    /// Register a filter taking one image.
    pub fn filter(&mut self, name: &str, func: ManipFn) -> &mut Self {
        self.push(name, ManipKind::Filter, 1, func)
    }

    /// Register a tool that also reads `other_image`.
    pub fn tool_with_images(&mut self, name: &str, images: usize, func: ManipFn) -> &mut Self {
        self.push(name, ManipKind::Tool, images, func)
    }

    /// Register a filter that also reads `other_image`.
    pub fn filter_with_images(&mut self, name: &str, images: usize, func: ManipFn) -> &mut Self {
        self.push(name, ManipKind::Filter, images, func)
    }
}

/// The typed form of a discovered function.
#[derive(Debug, Clone, Copy)]
pub enum Manipulation {
    Tool(ManipFn),
    Filter(ManipFn),
}

impl Manipulation {
    pub fn kind(&self) -> ManipKind {
        match self {
            Manipulation::Tool(_) => ManipKind::Tool,
            Manipulation::Filter(_) => ManipKind::Filter,
        }
    }

    pub fn function(&self) -> ManipFn {
        match *self {
            Manipulation::Tool(f) | Manipulation::Filter(f) => f,
        }
    }
}

/// A discovered function: its name, its kind and how many image parameters
/// it accepts (the primary image plus, optionally, `other_image`).
#[derive(Debug, Clone)]
pub struct ManipulationDescriptor {
    pub name: String,
    pub images: usize,
    pub manipulation: Manipulation,
}

impl ManipulationDescriptor {
    pub fn kind(&self) -> ManipKind {
        self.manipulation.kind()
    }
}

/// Why an export was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub name: String,
    pub message: String,
}

/// Result of discovering one module.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Eligible functions, sorted by name.
    pub descriptors: Vec<ManipulationDescriptor>,
    /// Skipped exports, in registration order.
    pub diagnostics: Vec<Diagnostic>,
}

fn check_export(export: &Export, seen: &BTreeMap<String, ManipKind>) -> Result<(), String> {
    if export.name.trim().is_empty() {
        return Err("export has an empty name".into());
    }
    if export.name.starts_with(RESERVED_PREFIX) {
        return Err(format!(
            "names starting with {RESERVED_PREFIX:?} are reserved for built-in selection tools"
        ));
    }
    if let Some(kind) = seen.get(&export.name) {
        return Err(format!("already exported as a {kind}"));
    }
    if export.images == 0 || export.images > MAX_IMAGE_PARAMS {
        return Err(format!(
            "declares {} image parameters, must be 1 or {MAX_IMAGE_PARAMS}",
            export.images
        ));
    }
    Ok(())
}

/// Enumerate the eligible functions of `module`.
pub fn discover(module: &dyn ManipModule) -> Result<Discovery, RegistryError> {
    let mut exports = Exports::default();
    module
        .export(&mut exports)
        .map_err(|reason| RegistryError::PluginLoad {
            module: module.name().to_string(),
            reason,
        })?;

    let mut accepted: BTreeMap<String, ManipulationDescriptor> = BTreeMap::new();
    let mut seen: BTreeMap<String, ManipKind> = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for export in exports.entries {
        if let Err(message) = check_export(&export, &seen) {
            log::warn!(
                "{}: skipping export {:?}: {}",
                module.name(),
                export.name,
                message
            );
            diagnostics.push(Diagnostic {
                name: export.name,
                message,
            });
            continue;
        }
        seen.insert(export.name.clone(), export.kind);
        let manipulation = match export.kind {
            ManipKind::Tool => Manipulation::Tool(export.func),
            ManipKind::Filter => Manipulation::Filter(export.func),
        };
        accepted.insert(
            export.name.clone(),
            ManipulationDescriptor {
                name: export.name,
                images: export.images,
                manipulation,
            },
        );
    }

    log::debug!(
        "{}: discovered {} functions, skipped {}",
        module.name(),
        accepted.len(),
        diagnostics.len()
    );

    Ok(Discovery {
        descriptors: accepted.into_values().collect(),
        diagnostics,
    })
}

/// Name-indexed descriptors of one loaded module.
#[derive(Debug, Clone)]
pub struct Registry {
    module: String,
    by_name: BTreeMap<String, ManipulationDescriptor>,
    diagnostics: Vec<Diagnostic>,
}

impl Registry {
    pub fn load(module: &dyn ManipModule) -> Result<Self, RegistryError> {
        let discovery = discover(module)?;
        Ok(Self {
            module: module.name().to_string(),
            by_name: discovery
                .descriptors
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
            diagnostics: discovery.diagnostics,
        })
    }

    pub fn module_name(&self) -> &str {
        &self.module
    }

    pub fn get(&self, name: &str) -> Option<&ManipulationDescriptor> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// All descriptors, sorted by name.
    pub fn descriptors(&self) -> impl Iterator<Item = &ManipulationDescriptor> {
        self.by_name.values()
    }

    pub fn tools(&self) -> impl Iterator<Item = &ManipulationDescriptor> {
        self.descriptors().filter(|d| d.kind() == ManipKind::Tool)
    }

    pub fn filters(&self) -> impl Iterator<Item = &ManipulationDescriptor> {
        self.descriptors().filter(|d| d.kind() == ManipKind::Filter)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{BrokenModule, ReferenceModule};

    fn identity(img: Bitmap, _: &mut Invocation) -> Result<Bitmap, PluginError> {
        Ok(img)
    }

    struct Messy;

    impl ManipModule for Messy {
        fn name(&self) -> &str {
            "messy"
        }

        fn export(&self, exports: &mut Exports) -> Result<(), String> {
            exports
                .filter("blur", identity)
                .tool("", identity)
                .tool("_select_color", identity)
                .tool("blur", identity)
                .filter_with_images("triple", 3, identity)
                .filter_with_images("none", 0, identity)
                .tool("stamp", identity);
            Ok(())
        }
    }

    fn shape(discovery: &Discovery) -> Vec<(String, ManipKind, usize)> {
        discovery
            .descriptors
            .iter()
            .map(|d| (d.name.clone(), d.kind(), d.images))
            .collect()
    }

    #[test]
    fn discovers_tools_and_filters_sorted_by_name() {
        let discovery = discover(&ReferenceModule).unwrap();
        let names: Vec<&str> = discovery
            .descriptors
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, ["average", "crop", "noise", "paint", "remove_red"]);
        assert!(discovery.diagnostics.is_empty());

        let paint = discovery.descriptors.iter().find(|d| d.name == "paint").unwrap();
        assert_eq!(paint.kind(), ManipKind::Tool);
        let average = discovery.descriptors.iter().find(|d| d.name == "average").unwrap();
        assert_eq!(average.images, 2);
    }

    #[test]
    fn malformed_exports_are_skipped_not_fatal() {
        let discovery = discover(&Messy).unwrap();
        assert_eq!(
            shape(&discovery),
            vec![
                ("blur".to_string(), ManipKind::Filter, 1),
                ("stamp".to_string(), ManipKind::Tool, 1),
            ]
        );

        let skipped: Vec<&str> = discovery
            .diagnostics
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(skipped, ["", "_select_color", "blur", "triple", "none"]);
        assert!(discovery.diagnostics[2].message.contains("already exported as a filter"));
        assert!(discovery.diagnostics[3].message.contains("3 image parameters"));
    }

    #[test]
    fn discovery_is_idempotent() {
        let first = discover(&Messy).unwrap();
        let second = discover(&Messy).unwrap();
        assert_eq!(shape(&first), shape(&second));
        assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn load_failure_names_the_module() {
        let err = discover(&BrokenModule).unwrap_err();
        assert_eq!(
            err,
            RegistryError::PluginLoad {
                module: "broken".into(),
                reason: "syntax error on line 12".into(),
            }
        );
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn registry_lookup_and_kind_views() {
        let registry = Registry::load(&ReferenceModule).unwrap();
        assert_eq!(registry.module_name(), "reference");
        assert_eq!(registry.len(), 5);
        assert!(registry.get("remove_red").is_some());
        assert!(registry.get("remove_blue").is_none());

        let tools: Vec<&str> = registry.tools().map(|d| d.name.as_str()).collect();
        assert_eq!(tools, ["paint"]);
        assert_eq!(registry.filters().count(), 4);
    }

    #[test]
    fn registry_keeps_diagnostics() {
        let registry = Registry::load(&Messy).unwrap();
        assert_eq!(registry.diagnostics().len(), 5);
    }
}
