//! # Runtime
//!
//! Process lifecycle of the controller: initialization, the watch loop and
//! the error policy applied to failed reconciliations.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
