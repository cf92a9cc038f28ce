//! In-memory fakes of the cluster and the object store for unit tests.

use crate::crd::{InstallInfo, ImageSpec, Manifest, ManifestSpec};
use crate::declarative::client::{ClusterClient, DeleteOutcome};
use crate::declarative::errors::{ClientError, Error};
use crate::declarative::factory::{ClusterClientFactory, ClusterInfo, TargetClusterResolver};
use crate::declarative::object::{Object, ObjectEvent, ObjectStore};
use crate::declarative::parser::ManifestParser;
use crate::declarative::resource::{Mapping, ResourceInfo};
use crate::declarative::spec::{Spec, SpecResolver};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind, TypeMeta};
use kube::ResourceExt;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_NAMESPACE: &str = "kcp-system";

const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
];

pub fn document(
    api_version: &str,
    kind: &str,
    namespace: Option<&str>,
    name: &str,
) -> DynamicObject {
    DynamicObject {
        types: Some(TypeMeta {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        }),
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            ..ObjectMeta::default()
        },
        data: json!({}),
    }
}

pub fn info(api_version: &str, kind: &str, namespace: &str, name: &str) -> ResourceInfo {
    let namespace = (!namespace.is_empty()).then_some(namespace);
    ResourceInfo::new(document(api_version, kind, namespace, name), None)
}

pub fn live(value: serde_json::Value) -> DynamicObject {
    serde_json::from_value(value).unwrap()
}

pub fn test_manifest(name: &str) -> Manifest {
    let mut manifest = Manifest::new(
        name,
        ManifestSpec {
            remote: false,
            install: InstallInfo {
                name: name.to_string(),
                source: ImageSpec {
                    repo: "registry.example/modules".to_string(),
                    name: name.to_string(),
                    r#ref: "sha256:v1".to_string(),
                    ..ImageSpec::default()
                },
            },
            resource: None,
            custom_resource_policy: Default::default(),
        },
    );
    manifest.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    manifest.metadata.generation = Some(1);
    manifest
}

pub fn with_module_resource(mut manifest: Manifest, name: &str) -> Manifest {
    manifest.spec.resource = Some(json!({
        "apiVersion": "operator.kyma-project.io/v1alpha1",
        "kind": "Sample",
        "metadata": {"name": name, "namespace": "kyma-system"},
        "spec": {"resourceFilePath": "./module-data/yaml"}
    }));
    manifest
}

pub fn with_finalizers(mut manifest: Manifest, finalizers: &[&str]) -> Manifest {
    manifest.metadata.finalizers = Some(finalizers.iter().map(|f| (*f).to_string()).collect());
    manifest
}

pub fn deleting(mut manifest: Manifest) -> Manifest {
    let time: Time = serde_json::from_value(json!("2024-01-01T00:00:00Z")).unwrap();
    manifest.metadata.deletion_timestamp = Some(time);
    manifest
}

fn key_of(object: &DynamicObject) -> String {
    ResourceInfo::new(object.clone(), None).identity().id()
}

/// A target cluster kept in memory
#[derive(Default)]
pub struct FakeCluster {
    unknown_kinds: HashSet<String>,
    latency: Option<Duration>,
    mapping_failure: Mutex<Option<ClientError>>,
    apply_failures: Mutex<HashMap<String, ClientError>>,
    delete_failures: Mutex<HashMap<String, ClientError>>,
    pending: Mutex<HashSet<String>>,
    objects: Mutex<BTreeMap<String, DynamicObject>>,
    applied: Mutex<Vec<(String, String)>>,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn with_unknown_kind(mut self, kind: &str) -> Self {
        self.unknown_kinds.insert(kind.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fail_apply(self, name: &str, err: ClientError) -> Self {
        self.set_apply_failure(name, err);
        self
    }

    pub fn fail_delete(self, name: &str, err: ClientError) -> Self {
        self.delete_failures.lock().unwrap().insert(name.to_string(), err);
        self
    }

    /// Deletes of `name` are accepted but the object stays
    pub fn pending_delete(self, name: &str) -> Self {
        self.set_pending(name, true);
        self
    }

    /// Every mapping lookup fails with `err` until cleared with `None`
    pub fn set_mapping_failure(&self, err: Option<ClientError>) {
        *self.mapping_failure.lock().unwrap() = err;
    }

    pub fn set_delete_failure(&self, name: &str, err: Option<ClientError>) {
        let mut failures = self.delete_failures.lock().unwrap();
        match err {
            Some(err) => failures.insert(name.to_string(), err),
            None => failures.remove(name),
        };
    }

    pub fn set_apply_failure(&self, name: &str, err: ClientError) {
        self.apply_failures.lock().unwrap().insert(name.to_string(), err);
    }

    pub fn clear_apply_failures(&self) {
        self.apply_failures.lock().unwrap().clear();
    }

    pub fn set_pending(&self, name: &str, pending: bool) {
        let mut set = self.pending.lock().unwrap();
        if pending {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    pub fn insert(&self, object: DynamicObject) {
        self.objects.lock().unwrap().insert(key_of(&object), object);
    }

    /// Names of the objects currently present
    pub fn object_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .values()
            .map(ResourceExt::name_any)
            .collect();
        names.sort();
        names
    }

    pub fn applied_names(&self) -> Vec<String> {
        self.applied.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn applied_owners(&self) -> Vec<String> {
        self.applied.lock().unwrap().iter().map(|(_, o)| o.clone()).collect()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn mapping(&self, gvk: &GroupVersionKind) -> Result<Mapping, ClientError> {
        if let Some(err) = self.mapping_failure.lock().unwrap().clone() {
            return Err(err);
        }
        if self.unknown_kinds.contains(&gvk.kind) {
            return Err(ClientError::NoMatch {
                api_version: gvk.api_version(),
                kind: gvk.kind.clone(),
            });
        }
        Ok(Mapping {
            resource: ApiResource::from_gvk(gvk),
            namespaced: !CLUSTER_SCOPED_KINDS.contains(&gvk.kind.as_str()),
        })
    }

    async fn apply(&self, info: &ResourceInfo, field_owner: &str) -> Result<(), ClientError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.apply_failures.lock().unwrap().get(info.name()) {
            return Err(err.clone());
        }
        self.applied
            .lock()
            .unwrap()
            .push((info.name().to_string(), field_owner.to_string()));
        self.insert(info.object.clone());
        Ok(())
    }

    async fn create(&self, info: &ResourceInfo, _field_owner: &str) -> Result<(), ClientError> {
        let key = key_of(&info.object);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists(info.name().to_string()));
        }
        objects.insert(key, info.object.clone());
        self.created.lock().unwrap().push(info.name().to_string());
        Ok(())
    }

    async fn delete(&self, info: &ResourceInfo) -> Result<DeleteOutcome, ClientError> {
        self.deleted.lock().unwrap().push(info.name().to_string());
        if let Some(err) = self.delete_failures.lock().unwrap().get(info.name()) {
            return Err(err.clone());
        }
        if self.pending.lock().unwrap().contains(info.name()) {
            return Ok(DeleteOutcome::Pending);
        }
        self.objects.lock().unwrap().remove(&info.identity().id());
        Ok(DeleteOutcome::Gone)
    }

    async fn get(&self, info: &ResourceInfo) -> Result<Option<DynamicObject>, ClientError> {
        Ok(self.objects.lock().unwrap().get(&info.identity().id()).cloned())
    }
}

/// Control plane store kept in memory, mimicking how the API server treats
/// status on full updates, stale resource versions and objects whose last
/// finalizer is removed
pub struct FakeStore<K> {
    objects: Mutex<HashMap<String, K>>,
    revision: AtomicUsize,
    events: Mutex<Vec<ObjectEvent>>,
    status_patches: AtomicUsize,
    status_failure: Mutex<Option<ClientError>>,
}

impl<K: Object> FakeStore<K> {
    pub fn with(obj: K) -> Self {
        let store = Self {
            objects: Mutex::new(HashMap::new()),
            revision: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
            status_patches: AtomicUsize::new(0),
            status_failure: Mutex::new(None),
        };
        store.insert(obj);
        store
    }

    pub fn insert(&self, mut obj: K) {
        self.bump(&mut obj);
        self.objects.lock().unwrap().insert(obj.name_any(), obj);
    }

    fn bump(&self, obj: &mut K) {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        obj.meta_mut().resource_version = Some(revision.to_string());
    }

    pub fn current(&self, name: &str) -> Option<K> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn events(&self) -> Vec<ObjectEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn status_patches(&self) -> usize {
        self.status_patches.load(Ordering::SeqCst)
    }

    pub fn fail_status_patches(&self, err: Option<ClientError>) {
        *self.status_failure.lock().unwrap() = err;
    }
}

#[async_trait]
impl<K: Object> ObjectStore<K> for FakeStore<K> {
    async fn get(&self, _namespace: &str, name: &str) -> Result<Option<K>, ClientError> {
        Ok(self.current(name))
    }

    async fn update(&self, obj: &K) -> Result<K, ClientError> {
        let mut objects = self.objects.lock().unwrap();
        let existing = objects
            .get(&obj.name_any())
            .ok_or_else(|| ClientError::NotFound(obj.name_any()))?;
        if obj.resource_version().is_some() && obj.resource_version() != existing.resource_version()
        {
            return Err(ClientError::Api {
                code: 409,
                message: format!("the object {} has been modified", obj.name_any()),
            });
        }
        let mut updated = obj.clone();
        updated.set_status(existing.status());
        self.bump(&mut updated);
        if updated.is_deleting() && updated.finalizers().is_empty() {
            objects.remove(&obj.name_any());
        } else {
            objects.insert(obj.name_any(), updated.clone());
        }
        Ok(updated)
    }

    async fn patch_status(&self, obj: &K) -> Result<(), ClientError> {
        if let Some(err) = self.status_failure.lock().unwrap().clone() {
            return Err(err);
        }
        let mut objects = self.objects.lock().unwrap();
        let existing = objects
            .get_mut(&obj.name_any())
            .ok_or_else(|| ClientError::NotFound(obj.name_any()))?;
        existing.set_status(obj.status());
        self.bump(existing);
        self.status_patches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn patch_finalizers(&self, obj: &K, finalizers: &[String]) -> Result<(), ClientError> {
        let mut objects = self.objects.lock().unwrap();
        let existing = objects
            .get_mut(&obj.name_any())
            .ok_or_else(|| ClientError::NotFound(obj.name_any()))?;
        existing.meta_mut().finalizers = Some(finalizers.to_vec());
        self.bump(existing);
        Ok(())
    }

    async fn publish_event(&self, _obj: &K, event: ObjectEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Spec resolver returning a fixed, swappable spec
pub struct FixedSpec {
    spec: Mutex<Result<Spec, String>>,
}

impl FixedSpec {
    pub fn new(content_ref: &str) -> Self {
        Self {
            spec: Mutex::new(Ok(Spec {
                manifest_name: "module".to_string(),
                path: PathBuf::from("/manifests/module/raw-manifest.yaml"),
                content_ref: content_ref.to_string(),
            })),
        }
    }

    pub fn set_content_ref(&self, content_ref: &str) {
        if let Ok(spec) = self.spec.lock().unwrap().as_mut() {
            spec.content_ref = content_ref.to_string();
        }
    }

    pub fn fail(&self, message: &str) {
        *self.spec.lock().unwrap() = Err(message.to_string());
    }
}

#[async_trait]
impl<K: Object> SpecResolver<K> for FixedSpec {
    async fn resolve(&self, _obj: &K) -> Result<Spec, Error> {
        self.spec.lock().unwrap().clone().map_err(Error::Spec)
    }
}

/// Parser serving a swappable document list
#[derive(Default)]
pub struct FakeParser {
    documents: Mutex<Vec<DynamicObject>>,
    evictions: AtomicUsize,
}

impl FakeParser {
    pub fn serving(documents: Vec<DynamicObject>) -> Self {
        Self {
            documents: Mutex::new(documents),
            evictions: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, documents: Vec<DynamicObject>) {
        *self.documents.lock().unwrap() = documents;
    }

    pub fn evictions(&self) -> usize {
        self.evictions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManifestParser for FakeParser {
    async fn parse(&self, _spec: &Spec) -> Result<Vec<DynamicObject>, Error> {
        Ok(self.documents.lock().unwrap().clone())
    }

    fn evict_cache(&self, _spec: &Spec) {
        self.evictions.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory handing out one shared [`FakeCluster`] and counting builds
pub struct FakeFactory {
    cluster: Arc<FakeCluster>,
    builds: AtomicUsize,
}

impl FakeFactory {
    pub fn new(cluster: Arc<FakeCluster>) -> Self {
        Self {
            cluster,
            builds: AtomicUsize::new(0),
        }
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterClientFactory for FakeFactory {
    async fn build(
        &self,
        _cluster: ClusterInfo,
        _namespace: &str,
    ) -> Result<Arc<dyn ClusterClient>, Error> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.cluster) as Arc<dyn ClusterClient>)
    }
}

/// Resolver that never needs a real client
#[derive(Default)]
pub struct FakeTarget {
    failure: Mutex<Option<fn() -> Error>>,
}

impl FakeTarget {
    pub fn fail_with(&self, make: fn() -> Error) {
        *self.failure.lock().unwrap() = Some(make);
    }
}

#[async_trait]
impl<K: Object> TargetClusterResolver<K> for FakeTarget {
    async fn resolve(&self, _obj: &K) -> Result<ClusterInfo, Error> {
        match *self.failure.lock().unwrap() {
            Some(make) => Err(make()),
            None => Ok(ClusterInfo::default()),
        }
    }
}
