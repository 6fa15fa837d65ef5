//! Differential test harness.
//!
//! For each case and each of its image sets the harness loads the inputs and
//! the golden snapshot, runs the plugin under the case's time budget with a
//! fixed seed, and compares the result against the snapshot: header fields
//! exactly, then pixel data row by row within the case's tolerance. The
//! first out-of-tolerance pixel ends the case.
//!
//! ## Verdicts
//!
//! | Outcome | Verdict | Scored |
//! |---|---|---|
//! | Every set matched | `Passed` | weight earned |
//! | Module failed to load, function missing, too few image parameters | `Skipped` | no |
//! | Wrong output, timeout, plugin error, panic, invalid result | `Failed` | weight lost |
//! | No image sets, oversized set, missing input, missing or empty golden entry, tool without a click, too many stuck workers | `ConfigurationError` | no |
//!
//! Skips and configuration errors are problems with the environment, not
//! with the code under test, so they never count against the score.
//!
//! Cases are independent. [`Harness::run_suite`] grades them in parallel on a
//! local rayon pool and reports them in suite order.

use crate::bitmap::{Bitmap, Header};
use crate::config::LabConfig;
use crate::invoke::{InvokeError, Params, Supervisor};
use crate::registry::{ManipulationDescriptor, Registry, RegistryError};
use crate::store::{InputStore, SnapshotStore, StoreError};
use crate::suite::{ImageSet, Suite, TestCase};
use crate::types::{ManipKind, Rgb};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

fn describe_original(original: &Option<Rgb>) -> String {
    match original {
        Some(c) => format!("Original was {c}\n"),
        None => String::new(),
    }
}

/// Where a result first diverged from its golden snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonFailure {
    #[error("The {field} is incorrect.\n  Should be: {expected}\n   Actually: {actual}")]
    Header {
        field: &'static str,
        expected: String,
        actual: String,
    },
    /// `x` and `y` are storage coordinates, as taken by [`Bitmap::get_pixel`].
    #[error(
        "Pixel at ({x}, {y}) is incorrect.\n{}It should be {expected}\nBut actually {actual}",
        describe_original(.original)
    )]
    Pixel {
        x: u32,
        y: u32,
        original: Option<Rgb>,
        expected: Rgb,
        actual: Rgb,
    },
}

fn header_of(bitmap: &Bitmap, field: &'static str) -> Result<Header, ComparisonFailure> {
    bitmap.validate().map_err(|e| ComparisonFailure::Header {
        field,
        expected: "a valid bitmap".into(),
        actual: e.to_string(),
    })
}

/// Compare the identifying header fields exactly.
pub fn compare_headers(expected: &Header, actual: &Header) -> Result<(), ComparisonFailure> {
    let fields: [(&'static str, String, String); 3] = [
        (
            "signature",
            String::from_utf8_lossy(&expected.signature).into_owned(),
            String::from_utf8_lossy(&actual.signature).into_owned(),
        ),
        ("width", expected.width.to_string(), actual.width.to_string()),
        ("height", expected.height.to_string(), actual.height.to_string()),
    ];
    for (field, expected, actual) in fields {
        if expected != actual {
            return Err(ComparisonFailure::Header {
                field,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

fn rgb_at(triple: &[u8]) -> Rgb {
    Rgb::new(triple[2], triple[1], triple[0])
}

/// Compare `actual` against the golden `expected`.
///
/// Headers first, then pixels in storage order, row by row. A pixel passes
/// when every channel is within `tolerance` of the golden value. Padding
/// bytes are never compared. `original` is the input image, used only to
/// enrich the report.
pub fn compare(
    expected: &Bitmap,
    actual: &Bitmap,
    original: Option<&Bitmap>,
    tolerance: u8,
) -> Result<(), ComparisonFailure> {
    let expected_header = header_of(expected, "golden image")?;
    let actual_header = header_of(actual, "image")?;
    compare_headers(&expected_header, &actual_header)?;

    let stride = expected.row_stride();
    let row_bytes = expected.width() as usize * 3;
    let rows = expected
        .data()
        .chunks_exact(stride)
        .zip(actual.data().chunks_exact(stride));
    for (y, (expected_row, actual_row)) in rows.enumerate() {
        let pixels = expected_row[..row_bytes]
            .chunks_exact(3)
            .zip(actual_row[..row_bytes].chunks_exact(3));
        for (x, (e, a)) in pixels.enumerate() {
            let (e, a) = (rgb_at(e), rgb_at(a));
            if e.max_channel_delta(a) > tolerance {
                let (x, y) = (x as u32, y as u32);
                return Err(ComparisonFailure::Pixel {
                    x,
                    y,
                    original: original.and_then(|o| o.get_pixel(x, y).ok()),
                    expected: e,
                    actual: a,
                });
            }
        }
    }
    Ok(())
}

/// Why a case or set failed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    #[error("{comparison}")]
    Comparison { comparison: ComparisonFailure },
    #[error("{function}() timed out after {budget_ms} ms")]
    Timeout { function: String, budget_ms: u64 },
    #[error("{message}")]
    Invocation { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Skipped { reason: String },
    Failed { failure: Failure },
    ConfigurationError { message: String },
}

impl Verdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }

    fn configuration(message: impl Into<String>) -> Self {
        Verdict::ConfigurationError {
            message: message.into(),
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Verdict::Skipped {
            reason: reason.into(),
        }
    }
}

/// Outcome on one image set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetResult {
    pub images: Vec<String>,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub manip: String,
    pub weight: u32,
    /// Passed only if every set passed; otherwise the first set's problem.
    pub verdict: Verdict,
    /// Sets in the order they ran. Stops at the first set that did not pass.
    pub sets: Vec<SetResult>,
}

impl CaseReport {
    fn whole_case(case: &TestCase, verdict: Verdict) -> Self {
        Self {
            name: case.name.clone(),
            manip: case.manip.clone(),
            weight: case.weight,
            verdict,
            sets: Vec::new(),
        }
    }
}

/// Points and counts across a suite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Score {
    pub earned: u32,
    pub possible: u32,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub misconfigured: usize,
}

impl Score {
    pub fn tally(cases: &[CaseReport]) -> Self {
        let mut score = Score::default();
        for case in cases {
            match case.verdict {
                Verdict::Passed => {
                    score.passed += 1;
                    score.earned += case.weight;
                    score.possible += case.weight;
                }
                Verdict::Failed { .. } => {
                    score.failed += 1;
                    score.possible += case.weight;
                }
                Verdict::Skipped { .. } => score.skipped += 1,
                Verdict::ConfigurationError { .. } => score.misconfigured += 1,
            }
        }
        score
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    pub module: String,
    /// Suite order.
    pub cases: Vec<CaseReport>,
    pub score: Score,
}

/// Grades user modules against a golden store.
#[derive(Debug, Clone)]
pub struct Harness {
    inputs: InputStore,
    golden: SnapshotStore,
    seed: u64,
    supervisor: Supervisor,
}

impl Harness {
    pub fn new(inputs: InputStore, golden: SnapshotStore, seed: u64) -> Self {
        Self {
            inputs,
            golden,
            seed,
            supervisor: Supervisor::default(),
        }
    }

    /// Run plugins under `supervisor` instead of a private one.
    pub fn with_supervisor(mut self, supervisor: Supervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Open the stores named in `config`, relative to `root`.
    pub fn from_config(config: &LabConfig, root: &Path) -> Result<Self, HarnessError> {
        let inputs = InputStore::new(root.join(&config.paths.inputs));
        if !inputs.dir().is_dir() {
            return Err(HarnessError::Configuration(format!(
                "input directory {} does not exist",
                inputs.dir().display()
            )));
        }
        let golden = SnapshotStore::open(root.join(&config.paths.golden))?;
        Ok(Self::new(inputs, golden, config.harness.seed)
            .with_supervisor(Supervisor::new(config.harness.max_stuck_workers)))
    }

    pub fn inputs(&self) -> &InputStore {
        &self.inputs
    }

    pub fn golden(&self) -> &SnapshotStore {
        &self.golden
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Grade `case` against a loaded module, or skip it if the module failed
    /// to load.
    pub fn run_case(
        &self,
        case: &TestCase,
        registry: Result<&Registry, &RegistryError>,
    ) -> CaseReport {
        if case.image_sets.is_empty() {
            return CaseReport::whole_case(
                case,
                Verdict::configuration(format!("case {:?} has no input image sets", case.name)),
            );
        }
        let registry = match registry {
            Ok(r) => r,
            Err(e) => return CaseReport::whole_case(case, Verdict::skipped(e.to_string())),
        };
        let Some(descriptor) = registry.get(&case.manip) else {
            return CaseReport::whole_case(
                case,
                Verdict::skipped(format!(
                    "function {}() not found in module {}",
                    case.manip,
                    registry.module_name()
                )),
            );
        };
        if descriptor.kind() == ManipKind::Tool && case.clicked.is_none() {
            return CaseReport::whole_case(
                case,
                Verdict::configuration(format!(
                    "{}() is a tool but case {:?} sets no clicked coordinate",
                    case.manip, case.name
                )),
            );
        }

        let mut sets = Vec::with_capacity(case.image_sets.len());
        let mut verdict = Verdict::Passed;
        for names in &case.image_sets {
            let set_verdict = self.run_set(case, descriptor, names);
            let passed = set_verdict.is_passed();
            sets.push(SetResult {
                images: names.clone(),
                verdict: set_verdict.clone(),
            });
            if !passed {
                verdict = set_verdict;
                break;
            }
        }
        log::info!("case {:?} ({}): {:?}", case.name, case.manip, verdict);
        CaseReport {
            name: case.name.clone(),
            manip: case.manip.clone(),
            weight: case.weight,
            verdict,
            sets,
        }
    }

    /// Grade `case` on one image set.
    ///
    /// The golden entry is loaded before the plugin runs, so a misconfigured
    /// case never executes user code.
    pub fn run_set(
        &self,
        case: &TestCase,
        descriptor: &ManipulationDescriptor,
        names: &[String],
    ) -> Verdict {
        let set = match ImageSet::from_names(names) {
            Ok(set) => set,
            Err(message) => return Verdict::configuration(message),
        };
        let required = set.names().len();
        if descriptor.images < required {
            return Verdict::skipped(
                InvokeError::ArityMismatch {
                    function: descriptor.name.clone(),
                    declared: descriptor.images,
                    required,
                }
                .to_string(),
            );
        }

        let key = case.snapshot_key(&set);
        let golden_bytes = match self.golden.get(&key) {
            Ok(bytes) if bytes.is_empty() => {
                return Verdict::configuration(format!("golden snapshot {key:?} is empty"));
            }
            Ok(bytes) => bytes,
            Err(e) => return Verdict::configuration(e.to_string()),
        };
        let expected = match Bitmap::decode(&golden_bytes) {
            Ok(bitmap) => bitmap,
            Err(e) => {
                return Verdict::configuration(format!("golden snapshot {key:?} is invalid: {e}"));
            }
        };

        let primary = match self.inputs.load(&set.primary) {
            Ok(bitmap) => bitmap,
            Err(e) => return Verdict::configuration(e.to_string()),
        };
        let mut params = Params::new(case.color, case.extra.clone());
        if let Some(name) = &set.other {
            match self.inputs.load(name) {
                Ok(other) => params = params.with_other_image(other),
                Err(e) => return Verdict::configuration(e.to_string()),
            }
        }
        if let Some(at) = case.clicked {
            params = params.with_click(at);
        }

        log::debug!("running {key}");
        let outcome = self.supervisor.invoke_with_budget(
            descriptor,
            &primary,
            params,
            self.seed,
            case.timeout,
        );
        match outcome {
            Ok(actual) => match compare(&expected, &actual, Some(&primary), case.tolerance) {
                Ok(()) => Verdict::Passed,
                Err(comparison) => Verdict::Failed {
                    failure: Failure::Comparison { comparison },
                },
            },
            Err(e @ InvokeError::ArityMismatch { .. }) => Verdict::skipped(e.to_string()),
            Err(
                e @ (InvokeError::MissingCoordinate { .. }
                | InvokeError::Input(_)
                | InvokeError::Overloaded { .. }),
            ) => Verdict::configuration(e.to_string()),
            Err(InvokeError::Timeout { function, budget }) => Verdict::Failed {
                failure: Failure::Timeout {
                    function,
                    budget_ms: budget.as_millis() as u64,
                },
            },
            Err(e) => Verdict::Failed {
                failure: Failure::Invocation {
                    message: e.to_string(),
                },
            },
        }
    }

    /// Grade every case of `suite` on up to `threads` workers.
    pub fn run_suite(
        &self,
        suite: &Suite,
        registry: Result<&Registry, &RegistryError>,
        threads: usize,
    ) -> Result<SuiteReport, HarnessError> {
        let module = match registry {
            Ok(r) => r.module_name().to_string(),
            Err(RegistryError::PluginLoad { module, .. }) => module.clone(),
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .map_err(|e| HarnessError::Configuration(format!("could not start workers: {e}")))?;
        let cases: Vec<CaseReport> = pool.install(|| {
            suite
                .cases()
                .par_iter()
                .map(|case| self.run_case(case, registry))
                .collect()
        });
        let score = Score::tally(&cases);
        Ok(SuiteReport {
            module,
            cases,
            score,
        })
    }
}
