//! # Content Sources
//!
//! References to the content layers a Manifest installs from.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Layer format of an image reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ImageType {
    /// A single layer addressed by digest
    #[default]
    #[serde(rename = "oci-ref")]
    OciRef,
    /// A directory layer
    #[serde(rename = "oci-dir")]
    OciDir,
}

/// Reference to a layer in an OCI repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Repository holding the layer (e.g. `europe-docker.pkg.dev/kyma/modules`)
    #[serde(default)]
    pub repo: String,
    /// Component name inside the repository
    #[serde(default)]
    pub name: String,
    /// Immutable reference of the layer, usually a `sha256:` digest
    pub r#ref: String,
    #[serde(default)]
    pub r#type: ImageType,
}

/// What to install
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstallInfo {
    /// Name of the installation, also the directory of its unpacked layers
    pub name: String,
    /// Layer holding the rendered raw manifest
    pub source: ImageSpec,
}
