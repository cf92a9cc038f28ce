//! # Transforms
//!
//! Post-render rewrites applied to every rendered document in a fixed order
//! before conversion.

use crate::constants::{
    COMPONENT_LABEL, DISCLAIMER_ANNOTATION, DISCLAIMER_VALUE, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
    PART_OF_LABEL, WATCHED_BY_LABEL, WATCHED_BY_VALUE,
};
use crate::declarative::errors::Error;
use crate::declarative::object::Object;
use kube::core::DynamicObject;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// A rewrite of rendered documents
pub trait ObjectTransform<K: Object>: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, obj: &K, resources: &mut [DynamicObject]) -> Result<(), Error>;
}

/// Labels every resource as managed and watched, and ties it to the object
#[derive(Debug, Clone)]
pub struct ManagedByTransform {
    part_of: String,
}

impl ManagedByTransform {
    #[must_use]
    pub fn new(part_of: &str) -> Self {
        Self {
            part_of: part_of.to_string(),
        }
    }
}

impl<K: Object> ObjectTransform<K> for ManagedByTransform {
    fn name(&self) -> &str {
        "managed-by"
    }

    fn transform(&self, obj: &K, resources: &mut [DynamicObject]) -> Result<(), Error> {
        let component = obj.name_any();
        for resource in resources {
            let labels = resource.labels_mut();
            labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
            labels.insert(WATCHED_BY_LABEL.to_string(), WATCHED_BY_VALUE.to_string());
            labels.insert(COMPONENT_LABEL.to_string(), component.clone());
            labels.insert(PART_OF_LABEL.to_string(), self.part_of.clone());
        }
        Ok(())
    }
}

/// Annotates every resource with a "do not edit" notice
#[derive(Debug, Clone, Copy, Default)]
pub struct DisclaimerTransform;

impl<K: Object> ObjectTransform<K> for DisclaimerTransform {
    fn name(&self) -> &str {
        "disclaimer"
    }

    fn transform(&self, _obj: &K, resources: &mut [DynamicObject]) -> Result<(), Error> {
        for resource in resources {
            resource
                .annotations_mut()
                .insert(DISCLAIMER_ANNOTATION.to_string(), DISCLAIMER_VALUE.to_string());
        }
        Ok(())
    }
}

/// Adds a fixed set of labels; refuses to override the engine's own labels
#[derive(Debug, Clone, Default)]
pub struct CustomLabelsTransform {
    labels: BTreeMap<String, String>,
}

impl CustomLabelsTransform {
    #[must_use]
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }
}

impl<K: Object> ObjectTransform<K> for CustomLabelsTransform {
    fn name(&self) -> &str {
        "custom-labels"
    }

    fn transform(&self, _obj: &K, resources: &mut [DynamicObject]) -> Result<(), Error> {
        if let Some(reserved) = self
            .labels
            .keys()
            .find(|key| [MANAGED_BY_LABEL, WATCHED_BY_LABEL].contains(&key.as_str()))
        {
            return Err(Error::Transform {
                transform: "custom-labels".to_string(),
                message: format!("label {reserved} is reserved"),
            });
        }
        for resource in resources {
            resource.labels_mut().extend(self.labels.clone());
        }
        Ok(())
    }
}
