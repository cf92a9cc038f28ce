//! # Declarative Engine
//!
//! Generic reconciliation of a rendered manifest against a target cluster.
//!
//! The engine is parameterized by an [`Object`](object::Object) type and a
//! set of [`Options`](options::Options). Everything the engine needs from the
//! outside world (object store, spec resolution, manifest parsing, target
//! cluster clients) is a trait object so the state machine can run against
//! in-memory fakes in tests.

pub mod apply;
pub mod cache;
pub mod cleanup;
pub mod client;
pub mod convert;
pub mod errors;
pub mod factory;
pub mod hooks;
pub mod object;
pub mod options;
pub mod parser;
pub mod readiness;
pub mod reconciler;
pub mod resource;
pub mod spec;
pub mod status;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{ClientError, Error};
pub use object::{Object, ObjectStore};
pub use options::Options;
pub use reconciler::{Engine, Outcome, RequeueReason};
