//! Test-case definitions.
//!
//! A suite file lists the cases the harness grades, one `[[case]]` table
//! each. Anything a case leaves out comes from the `[defaults]` and
//! `[harness]` config sections:
//!
//! ```toml
//! [[case]]
//! name = "remove red"
//! manip = "remove_red"
//! weight = 2
//!
//! [[case]]
//! name = "stamp a pixel"
//! manip = "change_pixel"
//! weight = 1
//! color = [0, 0, 0]
//! clicked = [20, 30]
//! image_sets = [["square"], ["pad1"]]
//!
//! [[case]]
//! name = "blend two images"
//! manip = "blend"
//! image_sets = [["square", "gfish"]]
//! tolerance = 2
//! timeout_ms = 2000
//! ```
//!
//! Structural problems that make the whole file unusable (bad TOML, duplicate
//! case names, a missing function name) fail loading. Problems local to one
//! case, such as an empty `image_sets` list or a set naming three images, are
//! kept and reported by the harness as configuration errors for that case
//! alone.

use crate::config::LabConfig;
use crate::registry::MAX_IMAGE_PARAMS;
use crate::store::{parameter_signature, snapshot_key};
use crate::types::{Coordinate, Rgb};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SuiteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("case {0:?} is defined more than once")]
    Duplicate(String),
    #[error("case {case:?}: {reason}")]
    Invalid { case: String, reason: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuiteFile {
    #[serde(default, rename = "case")]
    cases: Vec<CaseSpec>,
}

/// One `[[case]]` table as written.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CaseSpec {
    name: String,
    manip: String,
    #[serde(default = "default_weight")]
    weight: u32,
    color: Option<Rgb>,
    extra: Option<String>,
    clicked: Option<Coordinate>,
    image_sets: Option<Vec<Vec<String>>>,
    tolerance: Option<u8>,
    timeout_ms: Option<u64>,
}

fn default_weight() -> u32 {
    1
}

/// The primary image and, optionally, the one passed as `other_image`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSet {
    pub primary: String,
    pub other: Option<String>,
}

impl ImageSet {
    /// Build a set from the names listed in a suite file.
    pub fn from_names(names: &[String]) -> Result<Self, String> {
        match names {
            [] => Err("image set is empty".into()),
            [primary] => Ok(Self {
                primary: primary.clone(),
                other: None,
            }),
            [primary, other] => Ok(Self {
                primary: primary.clone(),
                other: Some(other.clone()),
            }),
            _ => Err(format!(
                "image set {names:?} names {} images, at most {MAX_IMAGE_PARAMS} are supported",
                names.len()
            )),
        }
    }

    pub fn names(&self) -> Vec<String> {
        std::iter::once(self.primary.clone())
            .chain(self.other.clone())
            .collect()
    }
}

/// A fully resolved test case.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub manip: String,
    /// Points earned when every image set passes.
    pub weight: u32,
    pub color: Rgb,
    pub extra: String,
    /// Top-down; required for tools.
    pub clicked: Option<Coordinate>,
    /// As listed; validated per set by [`ImageSet::from_names`].
    pub image_sets: Vec<Vec<String>>,
    pub tolerance: u8,
    pub timeout: Duration,
}

impl TestCase {
    pub fn parameter_signature(&self) -> String {
        parameter_signature(self.color, &self.extra, self.clicked)
    }

    /// Golden store key for this case on `set`.
    pub fn snapshot_key(&self, set: &ImageSet) -> String {
        snapshot_key(&self.manip, &self.parameter_signature(), &set.names())
    }
}

/// Cases in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Suite {
    cases: Vec<TestCase>,
}

impl Suite {
    pub fn new(cases: Vec<TestCase>) -> Self {
        Self { cases }
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn get(&self, name: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

fn resolve_case(spec: CaseSpec, config: &LabConfig) -> Result<TestCase, SuiteError> {
    let invalid = |reason: &str| SuiteError::Invalid {
        case: spec.name.clone(),
        reason: reason.to_string(),
    };
    if spec.name.trim().is_empty() {
        return Err(invalid("case name is empty"));
    }
    if spec.manip.trim().is_empty() {
        return Err(invalid("manip is empty"));
    }
    if spec.timeout_ms == Some(0) {
        return Err(invalid("timeout_ms must be greater than 0"));
    }

    let timeout = spec
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.harness.timeout());
    Ok(TestCase {
        weight: spec.weight,
        color: spec.color.unwrap_or(config.defaults.color),
        extra: spec
            .extra
            .unwrap_or_else(|| config.defaults.extra.clone()),
        clicked: spec.clicked,
        image_sets: spec
            .image_sets
            .unwrap_or_else(|| config.defaults.image_sets.clone()),
        tolerance: spec.tolerance.unwrap_or(config.harness.tolerance),
        timeout,
        name: spec.name,
        manip: spec.manip,
    })
}

/// Parse suite TOML, filling unset fields from `config`.
pub fn parse_suite(text: &str, config: &LabConfig) -> Result<Suite, SuiteError> {
    let file: SuiteFile = toml::from_str(text)?;
    let mut seen = BTreeSet::new();
    let mut cases = Vec::with_capacity(file.cases.len());
    for spec in file.cases {
        if !seen.insert(spec.name.clone()) {
            return Err(SuiteError::Duplicate(spec.name));
        }
        cases.push(resolve_case(spec, config)?);
    }
    log::debug!("parsed suite with {} cases", cases.len());
    Ok(Suite { cases })
}

pub fn load_suite(path: &Path, config: &LabConfig) -> Result<Suite, SuiteError> {
    let text = std::fs::read_to_string(path)?;
    parse_suite(&text, config)
}
