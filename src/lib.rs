//! # imagelab
//!
//! An image-editing lab for teaching pixel manipulation. Students write
//! "tools" (run at a clicked pixel) and "filters" (run over the whole image)
//! against one fixed contract; a differential harness grades them against
//! golden outputs produced by a reference implementation.
//!
//! # Architecture
//!
//! ```text
//! golden store ─┐
//! input store ──┼─> harness ─> codec (decode) ─> adapter ─> plugin
//!               │                                              │
//!               └─ report <─ compare <─ codec (re-validate) <──┘
//! ```
//!
//! The registry is built once per module load and shared read-only by the
//! harness, the snapshot tool and the workspace.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`bitmap`] | Bit-exact 24-bit BMP decode, validate and encode; row stride arithmetic; PNG/JPEG import |
//! | [`types`] | Shared value types (`Rgb`, `Coordinate`, `ManipKind`) |
//! | [`registry`] | Discovers a module's exported tools and filters into typed descriptors |
//! | [`invoke`] | Uniform calling convention, result re-validation, supervised timeout |
//! | [`store`] | Input image directory and SHA-256 checked golden snapshot store |
//! | [`suite`] | Test cases loaded from a suite TOML file |
//! | [`harness`] | Runs cases, compares against golden images, scores the run |
//! | [`snapshot`] | Regenerates the golden store from a reference module |
//! | [`workspace`] | Two-slot editing session for interactive front ends |
//! | [`starter`] | Sample module linked into the CLI |
//! | [`config`] | Layered `imagelab.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Typed Registration Instead of Markers
//!
//! A user module implements [`registry::ManipModule`] and registers each
//! function as a tool or a filter through [`registry::Exports`]. The registry
//! therefore only ever sees functions that went through registration, each
//! with exactly one kind. Malformed entries are skipped one by one with a
//! diagnostic; only a module whose registration fails outright is a load
//! error, and the harness skips its cases instead of failing them.
//!
//! ## Copy-on-Write Plugins
//!
//! Every plugin takes its own copy of the image and returns the result. The
//! caller's image cannot be left half-modified, and a plugin abandoned at its
//! deadline takes its buffer with it. Results go back through the codec
//! before anyone else looks at them.
//!
//! ## Skips Are Not Failures
//!
//! A missing function or an unsupported image arity is a problem with the
//! environment, not with the code being graded. Skipped cases and
//! misconfigured cases are excluded from the score entirely.
//!
//! ## Deterministic Randomness
//!
//! Plugins receive a seeded RNG. The harness and the snapshot tool use the
//! same configured seed, so randomised reference output is reproducible.

pub mod bitmap;
pub mod config;
pub mod harness;
pub mod invoke;
pub mod output;
pub mod registry;
pub mod snapshot;
pub mod starter;
pub mod store;
pub mod suite;
pub mod types;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_helpers;
