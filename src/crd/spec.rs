//! # Manifest Spec
//!
//! The `Manifest` custom resource and its reconciliation contract.

use crate::declarative::object::Object;
use crate::declarative::status::Status;
use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// Manifest Custom Resource Definition
///
/// A Manifest describes one module installation: the content layer holding
/// its rendered resources, the cluster it is installed into and optionally
/// the custom resource the module operator is driven through.
///
/// # Example
///
/// ```yaml
/// apiVersion: operator.declarative.io/v1
/// kind: Manifest
/// metadata:
///   name: template-operator
///   namespace: kcp-system
///   labels:
///     operator.declarative.io/cluster-name: runtime-a
/// spec:
///   remote: true
///   install:
///     name: template-operator
///     source:
///       repo: europe-docker.pkg.dev/kyma/modules
///       name: template-operator
///       ref: sha256:6b1c0a
///       type: oci-ref
///   resource:
///     apiVersion: operator.kyma-project.io/v1alpha1
///     kind: Sample
///     metadata:
///       name: sample
///       namespace: kyma-system
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Manifest",
    group = "operator.declarative.io",
    version = "v1",
    namespaced,
    status = "crate::declarative::status::Status",
    shortname = "mf",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSpec {
    /// Install into the cluster named by the cluster-name label instead of
    /// the control plane
    #[serde(default)]
    pub remote: bool,
    /// Content to install
    pub install: crate::crd::InstallInfo,
    /// Module custom resource created on the target after installation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub resource: Option<serde_json::Value>,
    #[serde(default)]
    pub custom_resource_policy: CustomResourcePolicy,
}

/// Whether the controller owns the lifecycle of the module custom resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum CustomResourcePolicy {
    #[default]
    CreateAndDelete,
    Ignore,
}

fn preserve_unknown_fields(_gen: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "nullable": true,
        "x-kubernetes-preserve-unknown-fields": true
    })
}

impl Object for Manifest {
    fn status(&self) -> Status {
        self.status.clone().unwrap_or_default()
    }

    fn set_status(&mut self, status: Status) {
        self.status = Some(status);
    }

    fn custom_resource(&self) -> Option<&serde_json::Value> {
        match self.spec.custom_resource_policy {
            CustomResourcePolicy::CreateAndDelete => self.spec.resource.as_ref(),
            CustomResourcePolicy::Ignore => None,
        }
    }
}
