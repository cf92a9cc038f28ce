//! # Spec
//!
//! Locator of the desired content of an object, resolved fresh on every
//! reconciliation.

use crate::declarative::errors::Error;
use crate::declarative::object::Object;
use async_trait::async_trait;
use std::path::PathBuf;

/// Where the desired resources of an object live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spec {
    pub manifest_name: String,
    /// Rendered manifest on local disk
    pub path: PathBuf,
    /// Immutable reference of the content version, e.g. an OCI digest
    pub content_ref: String,
}

/// Resolves the [`Spec`] of an object
#[async_trait]
pub trait SpecResolver<K: Object>: Send + Sync {
    async fn resolve(&self, obj: &K) -> Result<Spec, Error>;
}
