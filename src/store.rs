//! Input images and golden snapshots on disk.
//!
//! # Input store
//!
//! A directory of originals, one file per image name: `<name>.bmp`, or a
//! PNG/JPEG that is converted to 24-bit on load. Bitmaps are preferred when
//! both exist.
//!
//! # Golden snapshot store
//!
//! Expected outputs, keyed by [`snapshot_key`]:
//!
//! ```text
//! golden/
//! ├── manifest.json          # {version, entries: {key: {file, sha256}}}
//! ├── 3f9a0c1d2e4b5a67.bmp   # one encoded bitmap per entry
//! └── ...
//! ```
//!
//! Keys may contain arbitrary free text, so files are named by a hash of the
//! key rather than the key itself. Each entry records the SHA-256 of its
//! bytes; a file that no longer matches is reported as corrupt instead of
//! being graded against. The store is written only by the offline snapshot
//! tool and is read-only while grading.

use crate::bitmap::{Bitmap, BitmapError, import};
use crate::types::{Coordinate, Rgb};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the manifest file within a golden store directory.
const MANIFEST_FILENAME: &str = "manifest.json";

/// Version of the manifest format. Stores written with another version are
/// refused rather than half-read.
const MANIFEST_VERSION: u32 = 1;

/// Extensions tried, in order, when resolving an input image name.
const INPUT_EXTENSIONS: &[&str] = &["bmp", "png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Bitmap(#[from] BitmapError),
    #[error("input image {name:?} not found in {dir}")]
    MissingInput { name: String, dir: PathBuf },
    #[error("no golden snapshot for {0:?}")]
    MissingGolden(String),
    #[error("golden snapshot {key:?} is corrupt: expected sha256 {expected}, found {actual}")]
    Corrupt {
        key: String,
        expected: String,
        actual: String,
    },
    #[error("golden store manifest {path} has version {found}, expected {MANIFEST_VERSION}")]
    Version { path: PathBuf, found: u32 },
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Parameter signature of an invocation, as used inside snapshot keys:
/// `_color_R-G-B_extra_<text>`, plus `_clicked_X-Y` for tools.
pub fn parameter_signature(color: Rgb, extra: &str, clicked: Option<Coordinate>) -> String {
    let mut sig = format!("_color_{}-{}-{}_extra_{}", color.r, color.g, color.b, extra);
    if let Some(at) = clicked {
        sig.push_str(&format!("_clicked_{}-{}", at.x, at.y));
    }
    sig
}

/// Key of one golden entry: `{manip}{parameter signature}-{image}[-{image}]`.
pub fn snapshot_key(manip: &str, signature: &str, images: &[String]) -> String {
    format!("{manip}{signature}-{}", images.join("-"))
}

/// Read-only directory of original images.
#[derive(Debug, Clone)]
pub struct InputStore {
    dir: PathBuf,
}

impl InputStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `name`, if any.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        INPUT_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{name}.{ext}")))
            .find(|p| p.is_file())
    }

    pub fn load(&self, name: &str) -> Result<Bitmap, StoreError> {
        let path = self.resolve(name).ok_or_else(|| StoreError::MissingInput {
            name: name.to_string(),
            dir: self.dir.clone(),
        })?;
        Ok(import::load(&path)?)
    }

    /// Image names available in the store, sorted.
    pub fn names(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| INPUT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            })
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// One stored golden output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub file: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotManifest {
    version: u32,
    entries: BTreeMap<String, SnapshotEntry>,
}

/// Golden snapshot store rooted at a directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    entries: BTreeMap<String, SnapshotEntry>,
}

impl SnapshotStore {
    /// Open an existing store for reading.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        let path = dir.join(MANIFEST_FILENAME);
        let content = std::fs::read_to_string(&path)?;
        let manifest: SnapshotManifest = serde_json::from_str(&content)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(StoreError::Version {
                path,
                found: manifest.version,
            });
        }
        log::debug!(
            "opened golden store {} with {} entries",
            dir.display(),
            manifest.entries.len()
        );
        Ok(Self {
            dir,
            entries: manifest.entries,
        })
    }

    /// An empty store that [`SnapshotStore::save`] will write into `dir`.
    pub fn create(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Open the store in `dir` if it has a manifest, otherwise start an
    /// empty one there. Used by the snapshot tool so that entries outside
    /// the suite being regenerated survive.
    pub fn open_or_create(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        if dir.join(MANIFEST_FILENAME).is_file() {
            Self::open(dir)
        } else {
            Ok(Self::create(dir))
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Encoded bytes of the entry under `key`, integrity-checked.
    pub fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| StoreError::MissingGolden(key.to_string()))?;
        let bytes = std::fs::read(self.dir.join(&entry.file))?;
        let actual = sha256_hex(&bytes);
        if actual != entry.sha256 {
            return Err(StoreError::Corrupt {
                key: key.to_string(),
                expected: entry.sha256.clone(),
                actual,
            });
        }
        Ok(bytes)
    }

    /// Write `bytes` under `key`, replacing any previous entry.
    pub fn insert(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let file = format!("{}.bmp", &sha256_hex(key.as_bytes())[..16]);
        std::fs::write(self.dir.join(&file), bytes)?;
        self.entries.insert(
            key.to_string(),
            SnapshotEntry {
                file,
                sha256: sha256_hex(bytes),
            },
        );
        Ok(())
    }

    /// Persist the manifest.
    pub fn save(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let manifest = SnapshotManifest {
            version: MANIFEST_VERSION,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&manifest)?;
        std::fs::write(self.dir.join(MANIFEST_FILENAME), json)?;
        Ok(())
    }
}
