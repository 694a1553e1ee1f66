//! Adaptive progress estimation.
//!
//! Fabricates a plausible countdown for work that only reports "pending" or
//! "done": a learned duration estimate drives the countdown, the observed
//! duration feeds back into the estimate, and a short completion transition
//! reconciles the prediction with the real outcome.

#![warn(missing_docs)]

pub mod estimate_store;
pub mod countdown;
pub mod transition;
pub mod controller;

pub use estimate_store::EstimateStore;
pub use countdown::{CountdownScheduler, CountdownSession, CountdownStop};
pub use transition::{CompletionTransition, ProgressSink};
pub use controller::ProgressController;
