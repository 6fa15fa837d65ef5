//! CLI output formatting for every command.
//!
//! # Output Format
//!
//! ## Run
//!
//! ```text
//! Module starter
//! 001 remove red (remove_red, 2 points)
//!     PASS
//!         square: pass
//!         pad1: pass
//! 002 stamp (change_pixel, 1 point)
//!     FAIL
//!         square: Pixel at (20, 449) is incorrect.
//!             Original was (12, 40, 200)
//!             It should be (0, 0, 0)
//!             But actually (12, 40, 200)
//! 003 blend (blend, 3 points)
//!     SKIP function blend() not found in module starter
//!
//! Score 2/3 (1 passed, 1 failed, 1 skipped, 0 misconfigured)
//! ```
//!
//! ## List
//!
//! ```text
//! Module starter
//! Tools
//! 001 change_9_pixels
//! 002 change_pixel
//! Filters
//! 001 remove_blue
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::bitmap::Header;
use crate::harness::{CaseReport, SuiteReport, Verdict};
use crate::registry::{ManipulationDescriptor, Registry};
use crate::snapshot::SnapshotSummary;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn points(weight: u32) -> String {
    if weight == 1 {
        "1 point".to_string()
    } else {
        format!("{weight} points")
    }
}

/// Push a possibly multi-line message, continuation lines one level deeper.
fn push_message(lines: &mut Vec<String>, depth: usize, prefix: &str, message: &str) {
    let mut parts = message.lines();
    let first = parts.next().unwrap_or_default();
    lines.push(format!("{}{prefix}{first}", indent(depth)));
    for rest in parts {
        lines.push(format!("{}{}", indent(depth + 1), rest.trim_start()));
    }
}

fn verdict_label(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Passed => "PASS",
        Verdict::Skipped { .. } => "SKIP",
        Verdict::Failed { .. } => "FAIL",
        Verdict::ConfigurationError { .. } => "CONFIG",
    }
}

fn verdict_detail(verdict: &Verdict) -> Option<String> {
    match verdict {
        Verdict::Passed => None,
        Verdict::Skipped { reason } => Some(reason.clone()),
        Verdict::Failed { failure } => Some(failure.to_string()),
        Verdict::ConfigurationError { message } => Some(message.clone()),
    }
}

fn format_case(index: usize, case: &CaseReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {} ({}, {})",
        format_index(index),
        case.name,
        case.manip,
        points(case.weight)
    )];

    if case.sets.is_empty() {
        let label = verdict_label(&case.verdict);
        match verdict_detail(&case.verdict) {
            Some(detail) => push_message(&mut lines, 1, &format!("{label} "), &detail),
            None => lines.push(format!("{}{label}", indent(1))),
        }
        return lines;
    }

    lines.push(format!("{}{}", indent(1), verdict_label(&case.verdict)));
    for set in &case.sets {
        let images = set.images.join(" + ");
        let detail = verdict_detail(&set.verdict).unwrap_or_else(|| "pass".to_string());
        push_message(&mut lines, 2, &format!("{images}: "), &detail);
    }
    lines
}

pub fn format_suite_report(report: &SuiteReport) -> Vec<String> {
    let mut lines = vec![format!("Module {}", report.module)];
    for (i, case) in report.cases.iter().enumerate() {
        lines.extend(format_case(i + 1, case));
    }
    let s = &report.score;
    lines.push(String::new());
    lines.push(format!(
        "Score {}/{} ({} passed, {} failed, {} skipped, {} misconfigured)",
        s.earned, s.possible, s.passed, s.failed, s.skipped, s.misconfigured
    ));
    lines
}

pub fn print_suite_report(report: &SuiteReport) {
    for line in format_suite_report(report) {
        println!("{}", line);
    }
}

fn descriptor_line(index: usize, d: &ManipulationDescriptor) -> String {
    if d.images > 1 {
        format!("{} {} ({} images)", format_index(index), d.name, d.images)
    } else {
        format!("{} {}", format_index(index), d.name)
    }
}

pub fn format_registry(registry: &Registry) -> Vec<String> {
    let mut lines = vec![format!("Module {}", registry.module_name())];

    lines.push("Tools".to_string());
    for (i, d) in registry.tools().enumerate() {
        lines.push(descriptor_line(i + 1, d));
    }
    lines.push("Filters".to_string());
    for (i, d) in registry.filters().enumerate() {
        lines.push(descriptor_line(i + 1, d));
    }

    if !registry.diagnostics().is_empty() {
        lines.push("Skipped".to_string());
        for d in registry.diagnostics() {
            lines.push(format!("{}{:?}: {}", indent(1), d.name, d.message));
        }
    }
    lines
}

pub fn print_registry(registry: &Registry) {
    for line in format_registry(registry) {
        println!("{}", line);
    }
}

pub fn format_header(path: &Path, header: &Header) -> Vec<String> {
    vec![
        path.display().to_string(),
        format!(
            "{}Signature: {}",
            indent(1),
            String::from_utf8_lossy(&header.signature)
        ),
        format!("{}Size: {}x{}", indent(1), header.width, header.height),
        format!("{}Bits per pixel: {}", indent(1), header.bits_per_pixel),
        format!("{}File size: {} bytes", indent(1), header.file_size),
        format!("{}Pixel offset: {}", indent(1), header.pixel_offset),
        format!("{}Header size: {}", indent(1), header.header_size),
        format!("{}Pixel data size: {}", indent(1), header.pixel_data_size),
        format!(
            "{}Row stride: {} bytes ({} padding)",
            indent(1),
            header.row_stride(),
            header.row_padding()
        ),
    ]
}

pub fn print_header(path: &Path, header: &Header) {
    for line in format_header(path, header) {
        println!("{}", line);
    }
}

pub fn format_snapshot_summary(summary: &SnapshotSummary, dir: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, key) in summary.written.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), key));
    }
    if !summary.failures.is_empty() {
        lines.push("Problems".to_string());
        for f in &summary.failures {
            push_message(&mut lines, 1, &format!("{}: ", f.case), &f.message);
        }
    }
    lines.push(String::new());
    lines.push(format!(
        "Wrote {} snapshots to {}",
        summary.written.len(),
        dir.display()
    ));
    lines
}

pub fn print_snapshot_summary(summary: &SnapshotSummary, dir: &Path) {
    for line in format_snapshot_summary(summary, dir) {
        println!("{}", line);
    }
}
