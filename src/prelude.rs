//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use manifest_controller::prelude::*;
//! ```

pub use crate::crd::*;

pub use crate::declarative::{
    ClientError, Engine, Error, Object, ObjectStore, Options, Outcome, RequeueReason,
};

pub use crate::controller::reconciler::{reconcile, BackoffState, Reconciler, ReconcilerError};

pub use crate::config::ControllerConfig;
