//! # Resources
//!
//! Live resource handles and the identity-based set operations used for
//! diffing the desired set against the previously synced set.

use crate::declarative::status::{split_api_version, Resource};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use std::collections::HashSet;

/// REST mapping of a kind on a specific cluster
#[derive(Debug, Clone)]
pub struct Mapping {
    pub resource: ApiResource,
    pub namespaced: bool,
}

/// A resource plus everything needed to act on it against a cluster.
///
/// The mapping is absent when the kind was not served at conversion time,
/// e.g. a custom resource whose definition is applied in the same batch.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub object: DynamicObject,
    pub mapping: Option<Mapping>,
}

impl ResourceInfo {
    #[must_use]
    pub fn new(object: DynamicObject, mapping: Option<Mapping>) -> Self {
        Self { object, mapping }
    }

    #[must_use]
    pub fn api_version(&self) -> &str {
        match (&self.object.types, &self.mapping) {
            (Some(types), _) => &types.api_version,
            (None, Some(mapping)) => &mapping.resource.api_version,
            (None, None) => "",
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        match (&self.mapping, &self.object.types) {
            (Some(mapping), _) => &mapping.resource.kind,
            (None, Some(types)) => &types.kind,
            (None, None) => "",
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.object.metadata.name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.object
            .metadata
            .namespace
            .as_deref()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn gvk(&self) -> GroupVersionKind {
        let (group, version) = split_api_version(self.api_version());
        GroupVersionKind::gvk(group, version, self.kind())
    }

    #[must_use]
    pub fn identity(&self) -> Resource {
        Resource::new(self.api_version(), self.kind(), self.namespace(), self.name())
    }
}

/// Ordered collection of resource handles compared by identity
#[derive(Debug, Clone, Default)]
pub struct ResourceList(Vec<ResourceInfo>);

impl ResourceList {
    #[must_use]
    pub fn new(items: Vec<ResourceInfo>) -> Self {
        Self(items)
    }

    #[must_use]
    pub fn contains(&self, info: &ResourceInfo) -> bool {
        let id = info.identity();
        self.0.iter().any(|candidate| candidate.identity() == id)
    }

    /// Elements of `self` whose identity does not appear in `other`
    #[must_use]
    pub fn difference(&self, other: &ResourceList) -> ResourceList {
        let other_ids = other.identities();
        self.filter(|info| !other_ids.contains(&info.identity()))
    }

    /// Elements of `self` whose identity also appears in `other`
    #[must_use]
    pub fn intersect(&self, other: &ResourceList) -> ResourceList {
        let other_ids = other.identities();
        self.filter(|info| other_ids.contains(&info.identity()))
    }

    #[must_use]
    pub fn filter(&self, keep: impl Fn(&ResourceInfo) -> bool) -> ResourceList {
        ResourceList(self.0.iter().filter(|info| keep(info)).cloned().collect())
    }

    /// Remove the first resource of the given kind and name, if present
    pub fn remove_named(&mut self, kind: &str, name: &str) -> Option<ResourceInfo> {
        let index = self
            .0
            .iter()
            .position(|info| info.kind() == kind && info.name() == name)?;
        Some(self.0.remove(index))
    }

    #[must_use]
    pub fn to_resources(&self) -> Vec<Resource> {
        self.0.iter().map(ResourceInfo::identity).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResourceInfo> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<ResourceInfo> {
        self.0
    }

    fn identities(&self) -> HashSet<Resource> {
        self.0.iter().map(ResourceInfo::identity).collect()
    }
}

impl From<Vec<ResourceInfo>> for ResourceList {
    fn from(items: Vec<ResourceInfo>) -> Self {
        Self(items)
    }
}

impl IntoIterator for ResourceList {
    type Item = ResourceInfo;
    type IntoIter = std::vec::IntoIter<ResourceInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResourceList {
    type Item = &'a ResourceInfo;
    type IntoIter = std::slice::Iter<'a, ResourceInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Whether two synced sets differ, ignoring order
#[must_use]
pub fn has_diff(old: &[Resource], new: &[Resource]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    let old: HashSet<&Resource> = old.iter().collect();
    let new: HashSet<&Resource> = new.iter().collect();
    old != new
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::core::TypeMeta;

    fn info(api_version: &str, kind: &str, namespace: &str, name: &str) -> ResourceInfo {
        ResourceInfo::new(
            DynamicObject {
                types: Some(TypeMeta {
                    api_version: api_version.to_string(),
                    kind: kind.to_string(),
                }),
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
                    ..ObjectMeta::default()
                },
                data: serde_json::Value::Null,
            },
            None,
        )
    }

    fn names(list: &ResourceList) -> Vec<&str> {
        list.iter().map(ResourceInfo::name).collect()
    }

    #[test]
    fn test_difference_keeps_elements_missing_from_other() {
        let a = ResourceList::new(vec![
            info("v1", "ConfigMap", "default", "one"),
            info("apps/v1", "Deployment", "default", "two"),
            info("v1", "Service", "default", "three"),
        ]);
        let b = ResourceList::new(vec![
            info("v1", "ConfigMap", "default", "one"),
            info("apps/v1", "StatefulSet", "default", "two"),
        ]);

        assert_eq!(names(&a.difference(&b)), vec!["two", "three"]);
        assert!(a.difference(&a).is_empty());
    }

    #[test]
    fn test_difference_ignores_version_drift() {
        let a = ResourceList::new(vec![info("apps/v1beta2", "Deployment", "default", "web")]);
        let b = ResourceList::new(vec![info("apps/v1", "Deployment", "default", "web")]);
        assert!(a.difference(&b).is_empty());
    }

    #[test]
    fn test_difference_distinguishes_namespaces() {
        let a = ResourceList::new(vec![info("v1", "ConfigMap", "a", "cm")]);
        let b = ResourceList::new(vec![info("v1", "ConfigMap", "b", "cm")]);
        assert_eq!(a.difference(&b).len(), 1);
    }

    #[test]
    fn test_intersect_and_contains() {
        let a = ResourceList::new(vec![
            info("v1", "ConfigMap", "default", "one"),
            info("v1", "Secret", "default", "two"),
        ]);
        let b = ResourceList::new(vec![info("v1", "Secret", "default", "two")]);

        assert_eq!(names(&a.intersect(&b)), vec!["two"]);
        assert!(a.contains(&info("v1", "ConfigMap", "default", "one")));
        assert!(!b.contains(&info("v1", "ConfigMap", "default", "one")));
    }

    #[test]
    fn test_remove_named() {
        let mut list = ResourceList::new(vec![
            info("v1", "Namespace", "", "kyma-system"),
            info("v1", "Namespace", "", "other"),
        ]);
        assert!(list.remove_named("Namespace", "kyma-system").is_some());
        assert_eq!(names(&list), vec!["other"]);
        assert!(list.remove_named("Namespace", "missing").is_none());
    }

    #[test]
    fn test_has_diff_is_order_insensitive() {
        let a = Resource::new("v1", "ConfigMap", "default", "a");
        let b = Resource::new("v1", "ConfigMap", "default", "b");
        let c = Resource::new("v1", "ConfigMap", "default", "c");

        assert!(!has_diff(&[a.clone(), b.clone()], &[b.clone(), a.clone()]));
        assert!(has_diff(&[a.clone(), b.clone()], &[a.clone(), c]));
        assert!(has_diff(&[a.clone()], &[a, b]));
    }
}
