//! Offline golden-store regeneration.
//!
//! Runs every case of a suite against a reference module with the same
//! seeding and budgets the harness uses, and records each result in the
//! golden store. Problems with individual cases (missing function, oversized
//! image set, missing input image, plugin failure) are collected and logged;
//! the remaining cases are still written and the manifest is always saved.
//! Only I/O errors on the store itself abort a run.
//!
//! Entries for keys the suite does not produce are left alone, so
//! regenerating from part of a suite into an existing store only replaces
//! what that part covers.

use crate::invoke::{Params, Supervisor};
use crate::registry::Registry;
use crate::store::{InputStore, SnapshotStore, StoreError};
use crate::suite::{ImageSet, Suite};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("{0}")]
    Store(#[from] StoreError),
}

/// A case, or one of its image sets, that produced no snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFailure {
    pub case: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    /// Keys written, in suite order.
    pub written: Vec<String>,
    pub failures: Vec<SnapshotFailure>,
}

/// Regenerate `golden` from `reference` and save its manifest.
pub fn regenerate(
    suite: &Suite,
    reference: &Registry,
    inputs: &InputStore,
    golden: &mut SnapshotStore,
    seed: u64,
) -> Result<SnapshotSummary, SnapshotError> {
    let mut summary = SnapshotSummary::default();
    let mut fail = |case: &str, message: String| {
        log::warn!("snapshot {case:?}: {message}");
        summary.failures.push(SnapshotFailure {
            case: case.to_string(),
            message,
        });
    };

    let supervisor = Supervisor::default();
    let mut written = Vec::new();
    for case in suite.cases() {
        let Some(descriptor) = reference.get(&case.manip) else {
            fail(
                &case.name,
                format!(
                    "function {}() not found in module {}",
                    case.manip,
                    reference.module_name()
                ),
            );
            continue;
        };
        if case.image_sets.is_empty() {
            fail(&case.name, "case has no input image sets".into());
            continue;
        }

        for names in &case.image_sets {
            let set = match ImageSet::from_names(names) {
                Ok(set) => set,
                Err(message) => {
                    fail(&case.name, message);
                    continue;
                }
            };
            let primary = match inputs.load(&set.primary) {
                Ok(bitmap) => bitmap,
                Err(e) => {
                    fail(&case.name, e.to_string());
                    continue;
                }
            };
            let mut params = Params::new(case.color, case.extra.clone());
            if let Some(name) = &set.other {
                match inputs.load(name) {
                    Ok(other) => params = params.with_other_image(other),
                    Err(e) => {
                        fail(&case.name, e.to_string());
                        continue;
                    }
                }
            }
            if let Some(at) = case.clicked {
                params = params.with_click(at);
            }

            let key = case.snapshot_key(&set);
            match supervisor.invoke_with_budget(descriptor, &primary, params, seed, case.timeout) {
                Ok(result) => {
                    let bytes = result.encode().map_err(StoreError::from)?;
                    golden.insert(&key, &bytes)?;
                    log::debug!("wrote {key}");
                    written.push(key);
                }
                Err(e) => fail(&case.name, e.to_string()),
            }
        }
    }

    golden.save()?;
    summary.written = written;
    log::info!(
        "wrote {} snapshots to {} ({} problems)",
        summary.written.len(),
        golden.dir().display(),
        summary.failures.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Bitmap;
    use crate::config::LabConfig;
    use crate::suite::parse_suite;
    use crate::test_helpers::{ReferenceModule, fixture_inputs};

    #[test]
    fn writes_one_entry_per_image_set() {
        let (tmp, inputs) = fixture_inputs();
        let suite = parse_suite(
            r#"
[[case]]
name = "r"
manip = "remove_red"
image_sets = [["quad"], ["wide"]]

[[case]]
name = "avg"
manip = "average"
image_sets = [["wide", "tall"]]
"#,
            &LabConfig::default(),
        )
        .unwrap();
        let registry = Registry::load(&ReferenceModule).unwrap();
        let mut golden = SnapshotStore::create(tmp.path().join("golden"));

        let summary = regenerate(&suite, &registry, &inputs, &mut golden, 0).unwrap();
        assert!(summary.failures.is_empty());
        assert_eq!(summary.written.len(), 3);
        assert!(summary.written[2].ends_with("-wide-tall"));

        let reopened = SnapshotStore::open(tmp.path().join("golden")).unwrap();
        let key = &summary.written[0];
        let bitmap = Bitmap::decode(&reopened.get(key).unwrap()).unwrap();
        assert_eq!(bitmap.get_pixel(0, 0).unwrap().r, 0);
    }

    #[test]
    fn oversized_sets_and_missing_functions_are_reported() {
        let (tmp, inputs) = fixture_inputs();
        let suite = parse_suite(
            r#"
[[case]]
name = "three"
manip = "average"
image_sets = [["quad", "wide", "tall"]]

[[case]]
name = "ghost"
manip = "does_not_exist"
image_sets = [["quad"]]

[[case]]
name = "ok"
manip = "remove_red"
image_sets = [["quad"]]
"#,
            &LabConfig::default(),
        )
        .unwrap();
        let registry = Registry::load(&ReferenceModule).unwrap();
        let mut golden = SnapshotStore::create(tmp.path().join("golden"));

        let summary = regenerate(&suite, &registry, &inputs, &mut golden, 0).unwrap();
        let failed: Vec<&str> = summary.failures.iter().map(|f| f.case.as_str()).collect();
        assert_eq!(failed, ["three", "ghost"]);
        assert!(summary.failures[0].message.contains("3 images"));
        assert_eq!(summary.written.len(), 1);
    }

    #[test]
    fn missing_input_is_reported_and_the_rest_is_saved() {
        let (tmp, inputs) = fixture_inputs();
        let suite = parse_suite(
            r#"
[[case]]
name = "r"
manip = "remove_red"
image_sets = [["quad"], ["ghost"], ["wide"]]

[[case]]
name = "avg"
manip = "average"
image_sets = [["quad", "phantom"]]
"#,
            &LabConfig::default(),
        )
        .unwrap();
        let registry = Registry::load(&ReferenceModule).unwrap();
        let mut golden = SnapshotStore::create(tmp.path().join("golden"));

        let summary = regenerate(&suite, &registry, &inputs, &mut golden, 0).unwrap();
        assert_eq!(summary.written.len(), 2);
        let problems: Vec<(&str, bool)> = summary
            .failures
            .iter()
            .map(|f| (f.case.as_str(), f.message.contains("not found")))
            .collect();
        assert_eq!(problems, [("r", true), ("avg", true)]);

        let reopened = SnapshotStore::open(tmp.path().join("golden")).unwrap();
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn partial_regeneration_keeps_other_entries() {
        let (tmp, inputs) = fixture_inputs();
        let registry = Registry::load(&ReferenceModule).unwrap();
        let full = parse_suite(
            r#"
[[case]]
name = "r"
manip = "remove_red"
image_sets = [["quad"]]

[[case]]
name = "n"
manip = "noise"
image_sets = [["wide"]]
"#,
            &LabConfig::default(),
        )
        .unwrap();
        let mut golden = SnapshotStore::create(tmp.path().join("golden"));
        regenerate(&full, &registry, &inputs, &mut golden, 0).unwrap();

        let partial = parse_suite(
            "[[case]]\nname = \"n\"\nmanip = \"noise\"\nimage_sets = [[\"wide\"]]\n",
            &LabConfig::default(),
        )
        .unwrap();
        let mut golden = SnapshotStore::open_or_create(tmp.path().join("golden")).unwrap();
        let summary = regenerate(&partial, &registry, &inputs, &mut golden, 1).unwrap();
        assert_eq!(summary.written.len(), 1);

        let reopened = SnapshotStore::open(tmp.path().join("golden")).unwrap();
        assert_eq!(reopened.len(), 2);
        for key in reopened.keys() {
            assert!(reopened.get(key).is_ok(), "{key}");
        }
    }
}
