//! # Content Layer Spec
//!
//! Resolves a Manifest to the raw manifest of its content layer, unpacked
//! under `<root>/<install name>/<ref>/raw-manifest.yaml`. References such as
//! `sha256:abc` are made path safe first.

use crate::constants::RAW_MANIFEST_FILE;
use crate::crd::Manifest;
use crate::declarative::errors::Error;
use crate::declarative::spec::{Spec, SpecResolver};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LocalLayerSpecResolver {
    root: PathBuf,
}

impl LocalLayerSpecResolver {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Where the raw manifest of `name` at `content_ref` is expected
    #[must_use]
    pub fn layer_path(&self, name: &str, content_ref: &str) -> PathBuf {
        self.root
            .join(sanitize(name))
            .join(sanitize(content_ref))
            .join(RAW_MANIFEST_FILE)
    }
}

#[async_trait]
impl SpecResolver<Manifest> for LocalLayerSpecResolver {
    async fn resolve(&self, obj: &Manifest) -> Result<Spec, Error> {
        let install = &obj.spec.install;
        if install.name.is_empty() {
            return Err(Error::Spec("install has no name".to_string()));
        }
        let content_ref = install.source.r#ref.as_str();
        if content_ref.is_empty() {
            return Err(Error::Spec(format!("install {} has no source ref", install.name)));
        }

        let path = self.layer_path(&install.name, content_ref);
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::Spec(format!("{}: {e}", path.display())))?;
        if !exists {
            return Err(Error::Spec(format!(
                "content layer {} not found",
                path.display()
            )));
        }

        debug!(path = %path.display(), content_ref, "resolved content layer");
        Ok(Spec {
            manifest_name: install.name.clone(),
            path,
            content_ref: content_ref.to_string(),
        })
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '-' })
        .collect()
}
