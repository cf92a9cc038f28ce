//! # Controller
//!
//! Manifest-specific wiring of the declarative engine: where content comes
//! from, which cluster it goes to, and the per-object runtime bookkeeping.

pub mod backoff;
pub mod layer;
pub mod reconciler;
pub mod server;
pub mod target;
