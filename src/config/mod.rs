//! # Configuration
//!
//! Controller-level configuration loaded once at startup from environment
//! variables. Values come from a ConfigMap mounted via `envFrom`.

mod controller;

pub use controller::ControllerConfig;
