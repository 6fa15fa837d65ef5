//! Invocation adapter: one calling convention for every plugin.
//!
//! The plugin receives its own copy of the primary image by value and an
//! [`Invocation`] holding everything else: the chosen color, the free-text
//! `extra`, the optional second image, the clicked coordinate for tools and a
//! seeded RNG. It returns the resulting image, either the copy it was given
//! (mutated) or a new one. The caller's image is never touched, so a plugin
//! that fails or times out leaves nothing half-written behind.
//!
//! Whatever comes back is re-validated through the codec (encode, then
//! decode) before it is accepted; a buffer whose length disagrees with its
//! dimensions is a contract violation naming the function.
//!
//! [`invoke`] runs on the caller's thread. [`Supervisor::invoke_with_budget`]
//! runs the plugin on a dedicated worker thread and stops waiting at the
//! deadline. At that point the call's [`CancelFlag`] is raised: every pixel
//! access on the plugin's images fails from then on, and
//! [`Invocation::checkpoint`] reports the cancellation, so a plugin that
//! propagates errors with `?` unwinds shortly after its deadline. A plugin
//! that never touches either keeps its thread. The supervisor counts such
//! workers and refuses new calls once [`Supervisor::limit`] of them are still
//! running, so stuck plugins cannot starve later calls of CPU.

use crate::bitmap::{Bitmap, BitmapError};
use crate::registry::{ManipFn, ManipulationDescriptor};
use crate::types::{CancelFlag, Coordinate, ManipKind, Rgb};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;
use thiserror::Error;

/// Error a plugin reports on its own.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error(transparent)]
    Bitmap(#[from] BitmapError),
    #[error("{0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("function {function}() does not take {required} image parameters (it takes {declared})")]
    ArityMismatch {
        function: String,
        declared: usize,
        required: usize,
    },
    #[error("tool {function}() needs a clicked coordinate")]
    MissingCoordinate { function: String },
    #[error("{function}() should have returned a valid image: {reason}")]
    ContractViolation { function: String, reason: String },
    #[error("{function}() failed: {source}")]
    PluginFailed {
        function: String,
        source: PluginError,
    },
    #[error("{function}() panicked: {message}")]
    Panicked { function: String, message: String },
    #[error("{function}() did not finish within {budget:?}")]
    Timeout { function: String, budget: Duration },
    #[error("input image is invalid: {0}")]
    Input(#[from] BitmapError),
    #[error("could not start a worker for {function}(): {source}")]
    Worker {
        function: String,
        source: std::io::Error,
    },
    #[error("{function}() was not started: {stuck} earlier calls are still running past their deadline")]
    Overloaded { function: String, stuck: usize },
}

/// Parameters supplied alongside the primary image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    pub color: Rgb,
    pub extra: String,
    pub other_image: Option<Bitmap>,
    /// Top-down, as the GUI reports clicks.
    pub clicked_coordinate: Option<Coordinate>,
}

impl Params {
    pub fn new(color: Rgb, extra: impl Into<String>) -> Self {
        Self {
            color,
            extra: extra.into(),
            other_image: None,
            clicked_coordinate: None,
        }
    }

    pub fn with_other_image(mut self, other: Bitmap) -> Self {
        self.other_image = Some(other);
        self
    }

    pub fn with_click(mut self, at: Coordinate) -> Self {
        self.clicked_coordinate = Some(at);
        self
    }

    /// Number of image parameters this call passes, the primary included.
    pub fn image_count(&self) -> usize {
        1 + usize::from(self.other_image.is_some())
    }
}

/// What a plugin sees besides its primary image.
#[derive(Debug)]
pub struct Invocation {
    pub color: Rgb,
    pub extra: String,
    pub other_image: Option<Bitmap>,
    /// Top-down; use [`Coordinate::to_storage`] before touching pixels.
    pub clicked_coordinate: Option<Coordinate>,
    /// Seeded per call so randomised plugins are reproducible.
    pub rng: StdRng,
    cancel: CancelFlag,
}

impl Invocation {
    pub fn new(params: Params, seed: u64) -> Self {
        Self::watched(params, seed, CancelFlag::new())
    }

    /// An invocation whose second image, like the primary, stops answering
    /// pixel reads once `cancel` is raised.
    fn watched(params: Params, seed: u64, cancel: CancelFlag) -> Self {
        Self {
            color: params.color,
            extra: params.extra,
            other_image: params.other_image.map(|b| b.watch(cancel.clone())),
            clicked_coordinate: params.clicked_coordinate,
            rng: StdRng::seed_from_u64(seed),
            cancel,
        }
    }

    /// True once the caller has stopped waiting for this call.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_raised()
    }

    /// Fails once the caller has stopped waiting. Long loops that do not
    /// touch pixels should call this with `?`.
    pub fn checkpoint(&self) -> Result<(), PluginError> {
        if self.is_cancelled() {
            return Err(BitmapError::Cancelled.into());
        }
        Ok(())
    }
}

/// Reject a call the plugin cannot take before running anything.
///
/// The arity check is what the harness reports as a skip: the function
/// exists but was written against a different signature.
pub fn check_call(descriptor: &ManipulationDescriptor, params: &Params) -> Result<(), InvokeError> {
    let required = params.image_count();
    if descriptor.images < required {
        return Err(InvokeError::ArityMismatch {
            function: descriptor.name.clone(),
            declared: descriptor.images,
            required,
        });
    }
    if descriptor.kind() == ManipKind::Tool && params.clicked_coordinate.is_none() {
        return Err(InvokeError::MissingCoordinate {
            function: descriptor.name.clone(),
        });
    }
    Ok(())
}

/// Re-validate a plugin result through the codec.
fn accept_result(function: &str, result: Bitmap) -> Result<Bitmap, InvokeError> {
    let violation = |e: BitmapError| InvokeError::ContractViolation {
        function: function.to_string(),
        reason: e.to_string(),
    };
    let bytes = result.encode().map_err(violation)?;
    Bitmap::decode(&bytes).map_err(violation)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Call the plugin, turning its error or panic into an [`InvokeError`].
fn call(
    function: &str,
    func: ManipFn,
    image: Bitmap,
    mut invocation: Invocation,
) -> Result<Bitmap, InvokeError> {
    match panic::catch_unwind(AssertUnwindSafe(|| func(image, &mut invocation))) {
        Ok(Ok(result)) => accept_result(function, result),
        Ok(Err(source)) => Err(InvokeError::PluginFailed {
            function: function.to_string(),
            source,
        }),
        Err(payload) => Err(InvokeError::Panicked {
            function: function.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// Run `descriptor` on a copy of `primary` on the current thread.
pub fn invoke(
    descriptor: &ManipulationDescriptor,
    primary: &Bitmap,
    params: Params,
    seed: u64,
) -> Result<Bitmap, InvokeError> {
    primary.validate()?;
    check_call(descriptor, &params)?;
    log::debug!("invoking {} {}()", descriptor.kind(), descriptor.name);
    call(
        &descriptor.name,
        descriptor.manipulation.function(),
        primary.clone(),
        Invocation::new(params, seed),
    )
}

/// Abandoned workers tolerated by [`Supervisor::default`].
pub const DEFAULT_MAX_STUCK_WORKERS: usize = 4;

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

/// Runs plugins under a time budget and keeps count of the workers it had to
/// abandon. Clones share the count.
#[derive(Debug, Clone)]
pub struct Supervisor {
    stuck: Arc<AtomicUsize>,
    limit: usize,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STUCK_WORKERS)
    }
}

impl Supervisor {
    pub fn new(limit: usize) -> Self {
        Self {
            stuck: Arc::new(AtomicUsize::new(0)),
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Abandoned workers whose plugin has not returned yet.
    pub fn stuck(&self) -> usize {
        self.stuck.load(Ordering::Acquire)
    }

    /// Like [`invoke`], but gives up after `budget`.
    ///
    /// The plugin runs on its own thread. If it has not answered by the
    /// deadline the call fails with [`InvokeError::Timeout`], the call's
    /// cancel flag is raised and the worker is detached; whatever it
    /// eventually produces is dropped with the channel. While
    /// [`Supervisor::limit`] detached workers are still running, new calls
    /// fail with [`InvokeError::Overloaded`] without starting.
    pub fn invoke_with_budget(
        &self,
        descriptor: &ManipulationDescriptor,
        primary: &Bitmap,
        params: Params,
        seed: u64,
        budget: Duration,
    ) -> Result<Bitmap, InvokeError> {
        primary.validate()?;
        check_call(descriptor, &params)?;

        let function = descriptor.name.clone();
        let stuck = self.stuck();
        if stuck >= self.limit {
            log::warn!("refusing {function}(): {stuck} abandoned workers are still running");
            return Err(InvokeError::Overloaded { function, stuck });
        }

        let cancel = CancelFlag::new();
        let func = descriptor.manipulation.function();
        let image = primary.clone().watch(cancel.clone());
        let invocation = Invocation::watched(params, seed, cancel.clone());
        let state = Arc::new(AtomicU8::new(RUNNING));
        let (tx, rx) = mpsc::channel();

        let worker_name = function.clone();
        let worker_state = Arc::clone(&state);
        let worker_stuck = Arc::clone(&self.stuck);
        std::thread::Builder::new()
            .name(format!("manip-{function}"))
            .spawn(move || {
                let outcome = call(&worker_name, func, image, invocation);
                if worker_state.swap(FINISHED, Ordering::AcqRel) == ABANDONED {
                    worker_stuck.fetch_sub(1, Ordering::AcqRel);
                    log::info!("abandoned {worker_name}() worker has exited");
                }
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(outcome);
            })
            .map_err(|source| InvokeError::Worker {
                function: function.clone(),
                source,
            })?;

        match rx.recv_timeout(budget) {
            Ok(outcome) => outcome,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Count first so the worker's decrement can never run ahead.
                self.stuck.fetch_add(1, Ordering::AcqRel);
                let abandoned = state
                    .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                if !abandoned {
                    // Finished right at the deadline; its result is on the way.
                    self.stuck.fetch_sub(1, Ordering::AcqRel);
                    return rx.recv().unwrap_or_else(|_| {
                        Err(InvokeError::Panicked {
                            function,
                            message: "worker exited without a result".into(),
                        })
                    });
                }
                cancel.raise();
                log::warn!(
                    "{function}() exceeded {budget:?}; abandoning its worker ({} still running)",
                    self.stuck()
                );
                Err(InvokeError::Timeout { function, budget })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(InvokeError::Panicked {
                function,
                message: "worker exited without a result".into(),
            }),
        }
    }
}
