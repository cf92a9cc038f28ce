//! # Manifest Controller Library
//!
//! Declarative reconciliation of rendered manifests onto target clusters.
//!
//! - [`declarative`]: the generic engine (diff, apply, cleanup, readiness,
//!   hooks, status) parameterized over an object type
//! - [`crd`]: the `Manifest` custom resource the controller reconciles
//! - [`controller`]: Manifest-specific spec and target resolution plus the
//!   reconcile entry point used by the runtime
//! - [`runtime`]: process start-up and the watch loop

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod declarative;
pub mod prelude;
pub mod runtime;
