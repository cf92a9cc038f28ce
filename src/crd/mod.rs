//! # Custom Resource Definitions
//!
//! CRD types for the Manifest Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - The `Manifest` resource and its spec
//! - `source.rs` - Content layer references

mod source;
mod spec;

pub use source::{ImageSpec, ImageType, InstallInfo};
pub use spec::{CustomResourcePolicy, Manifest, ManifestSpec};

// Status types are shared with every object the engine reconciles
pub use crate::declarative::status::{Condition, LastOperation, Resource, State, Status};
