use super::*;
use crate::constants::{
    CLUSTER_NAME_LABEL, DEFAULT_FINALIZER, MANAGED_BY_LABEL, SKIP_RECONCILIATION_LABEL,
};
use crate::crd::Manifest;
use crate::declarative::errors::ClientError;
use crate::declarative::hooks::{
    CreateModuleResource, DeleteModuleResource, ModuleResourceDeletionCheck,
};
use crate::declarative::readiness::WorkloadReadyCheck;
use crate::declarative::testing::{
    deleting, document, live, test_manifest, with_finalizers, with_module_resource, FakeCluster,
    FakeFactory, FakeParser, FakeStore, FakeTarget, FixedSpec, TEST_NAMESPACE,
};
use crate::declarative::transform::ManagedByTransform;
use kube::core::DynamicObject;
use serde_json::json;
use std::time::Duration;

const NAME: &str = "module";

struct Harness {
    store: Arc<FakeStore<Manifest>>,
    cluster: Arc<FakeCluster>,
    parser: Arc<FakeParser>,
    spec: Arc<FixedSpec>,
    factory: Arc<FakeFactory>,
    target: Arc<FakeTarget>,
    engine: Engine<Manifest>,
}

impl Harness {
    fn new(manifest: Manifest, documents: Vec<DynamicObject>) -> Self {
        Self::build(manifest, documents, FakeCluster::default(), |options| options)
    }

    fn build(
        manifest: Manifest,
        documents: Vec<DynamicObject>,
        cluster: FakeCluster,
        configure: impl FnOnce(Options<Manifest>) -> Options<Manifest>,
    ) -> Self {
        let store = Arc::new(FakeStore::with(manifest));
        let cluster = Arc::new(cluster);
        let parser = Arc::new(FakeParser::serving(documents));
        let spec = Arc::new(FixedSpec::new("sha256:v1"));
        let factory = Arc::new(FakeFactory::new(Arc::clone(&cluster)));
        let target = Arc::new(FakeTarget::default());
        let options = Options::new(
            Arc::clone(&store) as Arc<dyn crate::declarative::object::ObjectStore<Manifest>>,
            Arc::clone(&spec) as Arc<dyn crate::declarative::spec::SpecResolver<Manifest>>,
            Arc::clone(&parser) as Arc<dyn crate::declarative::parser::ManifestParser>,
            Arc::clone(&target)
                as Arc<dyn crate::declarative::factory::TargetClusterResolver<Manifest>>,
            Arc::clone(&factory) as Arc<dyn crate::declarative::factory::ClusterClientFactory>,
        );
        Self {
            store,
            cluster,
            parser,
            spec,
            factory,
            target,
            engine: Engine::new(configure(options)),
        }
    }

    async fn reconcile(&self) -> Result<Outcome, Error> {
        self.reconcile_with(&CancellationToken::new()).await
    }

    async fn reconcile_with(&self, cancel: &CancellationToken) -> Result<Outcome, Error> {
        self.engine.reconcile(TEST_NAMESPACE, NAME, cancel).await
    }

    /// Reconcile until the outcome is no longer an intended requeue
    async fn settle(&self) -> Outcome {
        self.settle_named(NAME).await
    }

    async fn settle_named(&self, name: &str) -> Outcome {
        let mut last = Outcome::Finished;
        for _ in 0..12 {
            last = self
                .engine
                .reconcile(TEST_NAMESPACE, name, &CancellationToken::new())
                .await
                .unwrap();
            match last.reason() {
                Some(reason) if reason.is_intended() => continue,
                _ => break,
            }
        }
        last
    }

    fn current(&self) -> Manifest {
        self.store.current(NAME).unwrap()
    }

    fn status(&self) -> Status {
        self.current().status()
    }

    fn mark_deleting(&self) {
        self.store.insert(deleting(self.current()));
    }
}

fn two_documents() -> Vec<DynamicObject> {
    vec![
        document("v1", "ConfigMap", None, "cm"),
        document("apps/v1", "Deployment", Some("apps"), "web"),
    ]
}

/// Already initialized, finalized and bootstrapped
fn prepared(manifest: Manifest) -> Manifest {
    let mut manifest = with_finalizers(manifest, &[DEFAULT_FINALIZER]);
    manifest
        .annotations_mut()
        .insert(SYNCED_CONTENT_REF_ANNOTATION.to_string(), "sha256:v1".to_string());
    manifest.set_status(Status::default().with_state(State::Processing));
    manifest
}

#[tokio::test]
async fn test_missing_object_finishes() {
    let harness = Harness::new(test_manifest("other"), two_documents());
    assert_eq!(harness.reconcile().await.unwrap(), Outcome::Finished);
}

#[tokio::test]
async fn test_skip_label_vetoes_reconciliation() {
    let mut manifest = test_manifest(NAME);
    manifest
        .labels_mut()
        .insert(SKIP_RECONCILIATION_LABEL.to_string(), "true".to_string());
    let harness = Harness::new(manifest, two_documents());

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::Skipped));
    assert_eq!(harness.store.status_patches(), 0);
    assert_eq!(harness.status().state, State::Empty);
}

#[tokio::test]
async fn test_empty_state_is_initialized() {
    let harness = Harness::new(test_manifest(NAME), two_documents());

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::StateInitialized));

    let status = harness.status();
    assert_eq!(status.state, State::Processing);
    assert_eq!(status.operation(), "object has an empty state");
    assert!(status.condition(CONDITION_TYPE_RESOURCES).is_some());
    assert!(status.condition(CONDITION_TYPE_INSTALLATION).is_some());
}

#[tokio::test]
async fn test_finalizer_then_content_ref_bootstrap() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.reconcile().await.unwrap();

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::FinalizerAdded));
    assert_eq!(harness.current().finalizers(), [DEFAULT_FINALIZER.to_string()]);

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::ContentRefBootstrapped));
    assert_eq!(
        harness.current().annotations().get(SYNCED_CONTENT_REF_ANNOTATION),
        Some(&"sha256:v1".to_string())
    );
    assert!(harness.cluster.applied_names().is_empty());
}

#[tokio::test]
async fn test_fresh_object_converges_to_ready() {
    let harness = Harness::new(test_manifest(NAME), two_documents());

    let outcome = harness.settle().await;
    assert_eq!(outcome.reason(), Some(RequeueReason::SteadyState));
    assert_eq!(
        outcome,
        Outcome::requeue(Duration::from_secs(30), RequeueReason::SteadyState)
    );

    let status = harness.status();
    assert_eq!(status.state, State::Ready);
    assert!(status.is_condition_true(CONDITION_TYPE_RESOURCES));
    assert!(status.is_condition_true(CONDITION_TYPE_INSTALLATION));
    assert_eq!(
        status.synced,
        vec![
            Resource::new("v1", "ConfigMap", "default", "cm"),
            Resource::new("apps/v1", "Deployment", "apps", "web"),
        ]
    );
    assert_eq!(harness.cluster.object_names(), vec!["cm", "web"]);
    assert!(harness
        .store
        .events()
        .iter()
        .any(|e| !e.warning && e.reason == "Ready"));
}

#[tokio::test]
async fn test_steady_state_writes_nothing() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.settle().await;
    let patches = harness.store.status_patches();

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::SteadyState));
    assert_eq!(harness.store.status_patches(), patches);
    assert!(harness.cluster.deleted_names().is_empty());
}

#[tokio::test]
async fn test_synced_change_moves_to_processing() {
    let harness = Harness::new(prepared(test_manifest(NAME)), two_documents());

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::SyncedChanged));
    let status = harness.status();
    assert_eq!(status.state, State::Processing);
    assert_eq!(status.operation(), SYNC_STATE_DIFF);
    assert_eq!(status.synced.len(), 2);
}

#[tokio::test]
async fn test_new_content_ref_prunes_and_advances_annotation() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.settle().await;

    harness.spec.set_content_ref("sha256:v2");
    harness.parser.set(vec![document("v1", "ConfigMap", None, "cm")]);

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::SyncedChanged));
    assert_eq!(harness.cluster.deleted_names(), vec!["web"]);
    // not advanced before the new revision is ready
    assert_eq!(
        harness.current().annotations().get(SYNCED_CONTENT_REF_ANNOTATION),
        Some(&"sha256:v1".to_string())
    );

    let outcome = harness.settle().await;
    assert_eq!(outcome.reason(), Some(RequeueReason::SteadyState));
    assert_eq!(
        harness.current().annotations().get(SYNCED_CONTENT_REF_ANNOTATION),
        Some(&"sha256:v2".to_string())
    );
    assert_eq!(harness.cluster.object_names(), vec!["cm"]);
    assert_eq!(harness.status().state, State::Ready);
}

#[tokio::test]
async fn test_diff_with_unchanged_content_ref_deletes_nothing() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.settle().await;

    harness.parser.set(vec![document("v1", "ConfigMap", None, "cm")]);
    let err = harness.reconcile().await.unwrap_err();

    assert!(matches!(err, Error::SyncDiffInSameContentRef));
    assert_eq!(harness.parser.evictions(), 1);
    assert!(harness.cluster.deleted_names().is_empty());
    assert_eq!(harness.cluster.object_names(), vec!["cm", "web"]);
    let status = harness.status();
    assert_eq!(status.state, State::Warning);
    assert_eq!(status.synced.len(), 2);
}

#[tokio::test]
async fn test_protected_namespace_is_never_pruned() {
    let documents = vec![
        document("v1", "Namespace", None, PROTECTED_NAMESPACE),
        document("v1", "ConfigMap", None, "cm"),
    ];
    let harness = Harness::new(test_manifest(NAME), documents);
    harness.settle().await;

    harness.spec.set_content_ref("sha256:v2");
    harness.parser.set(vec![document("v1", "ConfigMap", None, "cm")]);
    harness.settle().await;

    assert!(harness.cluster.deleted_names().is_empty());
    assert_eq!(
        harness.status().synced,
        vec![Resource::new("v1", "ConfigMap", "default", "cm")]
    );
}

#[tokio::test]
async fn test_unfinished_cleanup_requeues() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.settle().await;

    harness.cluster.set_pending("web", true);
    harness.spec.set_content_ref("sha256:v2");
    harness.parser.set(vec![document("v1", "ConfigMap", None, "cm")]);

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::DeletionNotFinished));
    assert_eq!(harness.status().synced.len(), 2);

    harness.cluster.set_pending("web", false);
    harness.settle().await;
    assert_eq!(harness.cluster.object_names(), vec!["cm"]);
}

#[tokio::test]
async fn test_blocked_deletion_is_shown_as_warning() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.settle().await;
    harness.cluster.set_pending("web", true);
    harness.mark_deleting();

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::DeletionNotFinished));
    let status = harness.status();
    assert_eq!(status.state, State::Warning);
    assert_eq!(status.operation(), Error::DeletionNotFinished.to_string());
    assert!(harness
        .store
        .events()
        .iter()
        .any(|e| e.warning && e.reason == "Warning"));

    harness.cluster.set_pending("web", false);
    assert_eq!(harness.settle().await, Outcome::Finished);
    assert!(harness.store.current(NAME).is_none());
    assert!(harness.cluster.object_names().is_empty());
}

#[tokio::test]
async fn test_deletion_removes_resources_then_finalizer() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.settle().await;
    harness.mark_deleting();

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::SyncedChanged));
    assert_eq!(harness.status().state, State::Deleting);
    assert!(harness.cluster.object_names().is_empty());

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::FinalizerRemoved));
    assert!(harness.store.current(NAME).is_none());

    assert_eq!(harness.reconcile().await.unwrap(), Outcome::Finished);
}

#[tokio::test]
async fn test_deletion_waits_for_foreign_finalizers() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.settle().await;
    let mut manifest = harness.current();
    manifest.finalizers_mut().push("other".to_string());
    harness.store.insert(deleting(manifest));

    harness.settle().await;
    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::WaitingForFinalizers));

    let current = harness.current();
    assert_eq!(current.finalizers(), ["other".to_string()]);
    assert_eq!(current.status().state, State::Deleting);
    assert!(current
        .status()
        .operation()
        .starts_with("waiting as other finalizers are present"));
}

#[tokio::test]
async fn test_spec_failure_while_deleting_releases_finalizer() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.settle().await;
    harness.mark_deleting();
    harness.spec.fail("content layer missing");

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::FinalizerRemoved));
    assert!(harness.store.current(NAME).is_none());
}

#[tokio::test]
async fn test_spec_failure_sets_error_state() {
    let harness = Harness::new(prepared(test_manifest(NAME)), two_documents());
    harness.spec.fail("content layer missing");

    let err = harness.reconcile().await.unwrap_err();
    assert!(matches!(err, Error::Spec(_)));
    let status = harness.status();
    assert_eq!(status.state, State::Error);
    assert!(status.operation().contains("content layer missing"));
    assert!(harness
        .store
        .events()
        .iter()
        .any(|e| e.warning && e.reason == "Error"));
}

#[tokio::test]
async fn test_missing_access_secret_while_deleting_drops_all_finalizers() {
    let manifest = deleting(with_finalizers(
        prepared(test_manifest(NAME)),
        &[DEFAULT_FINALIZER, "other"],
    ));
    let harness = Harness::new(manifest, two_documents());
    harness
        .target
        .fail_with(|| Error::AccessSecretNotFound("runtime-a".to_string()));

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::FinalizerRemoved));
    assert!(harness.store.current(NAME).is_none());
}

#[tokio::test]
async fn test_missing_access_secret_fails_outside_deletion() {
    let harness = Harness::new(prepared(test_manifest(NAME)), two_documents());
    harness
        .target
        .fail_with(|| Error::AccessSecretNotFound("runtime-a".to_string()));

    let err = harness.reconcile().await.unwrap_err();
    assert!(matches!(err, Error::AccessSecretNotFound(_)));
    assert_eq!(harness.status().state, State::Error);
}

#[tokio::test]
async fn test_client_is_cached_and_dropped_on_auth_failure() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.settle().await;
    assert_eq!(harness.factory.builds(), 1);
    assert_eq!(harness.engine.options().client_cache.len(), 1);

    harness
        .cluster
        .set_apply_failure("cm", ClientError::Unauthorized("token expired".to_string()));
    harness
        .cluster
        .set_apply_failure("web", ClientError::Unauthorized("token expired".to_string()));
    assert!(harness.reconcile().await.is_err());
    assert_eq!(harness.status().state, State::Error);
    assert!(harness.engine.options().client_cache.is_empty());

    harness.cluster.clear_apply_failures();
    harness.settle().await;
    assert_eq!(harness.factory.builds(), 2);
    assert_eq!(harness.status().state, State::Ready);
}

#[tokio::test]
async fn test_render_auth_failure_drops_cached_client() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.settle().await;
    assert_eq!(harness.engine.options().client_cache.len(), 1);

    harness
        .cluster
        .set_mapping_failure(Some(ClientError::Unauthorized("token expired".to_string())));
    let err = harness.reconcile().await.unwrap_err();
    assert!(matches!(err, Error::Convert(_)));
    assert_eq!(harness.status().state, State::Error);
    assert!(harness.engine.options().client_cache.is_empty());
    assert!(harness.cluster.deleted_names().is_empty());

    harness.cluster.set_mapping_failure(None);
    harness.settle().await;
    assert_eq!(harness.factory.builds(), 2);
    assert_eq!(harness.status().state, State::Ready);
}

#[tokio::test]
async fn test_cleanup_connection_failure_drops_cached_client() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.settle().await;

    harness
        .cluster
        .set_delete_failure("web", Some(ClientError::Connection("reset".to_string())));
    harness.spec.set_content_ref("sha256:v2");
    harness.parser.set(vec![document("v1", "ConfigMap", None, "cm")]);

    let err = harness.reconcile().await.unwrap_err();
    assert!(matches!(err, Error::Cleanup(_)));
    assert!(harness.engine.options().client_cache.is_empty());
    assert_eq!(harness.status().synced.len(), 2);

    harness.cluster.set_delete_failure("web", None);
    harness.settle().await;
    assert_eq!(harness.factory.builds(), 2);
    assert_eq!(harness.cluster.object_names(), vec!["cm"]);
}

#[tokio::test]
async fn test_objects_on_one_cluster_share_a_client() {
    let on_cluster = |name: &str, cluster: &str| {
        let mut manifest = test_manifest(name);
        manifest
            .labels_mut()
            .insert(CLUSTER_NAME_LABEL.to_string(), cluster.to_string());
        manifest
    };
    let harness = Harness::new(on_cluster(NAME, "runtime-a"), two_documents());
    harness.store.insert(on_cluster("second", "runtime-a"));
    harness.store.insert(on_cluster("third", "runtime-b"));

    harness.settle().await;
    harness.settle_named("second").await;
    assert_eq!(harness.factory.builds(), 1);
    assert_eq!(harness.engine.options().client_cache.len(), 1);
    assert_eq!(harness.store.current("second").unwrap().status().state, State::Ready);

    harness.settle_named("third").await;
    assert_eq!(harness.factory.builds(), 2);
    assert_eq!(harness.engine.options().client_cache.len(), 2);
}

#[tokio::test]
async fn test_content_ref_advance_keeps_reordered_status() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness.settle().await;

    harness.spec.set_content_ref("sha256:v2");
    harness.parser.set(two_documents().into_iter().rev().collect());

    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::ContentRefAdvanced));
    let current = harness.current();
    assert_eq!(
        current.annotations().get(SYNCED_CONTENT_REF_ANNOTATION),
        Some(&"sha256:v2".to_string())
    );
    assert_eq!(
        current.status().synced,
        vec![
            Resource::new("apps/v1", "Deployment", "apps", "web"),
            Resource::new("v1", "ConfigMap", "default", "cm"),
        ]
    );
    assert!(!harness
        .store
        .events()
        .iter()
        .any(|e| e.reason == "UpdateObject"));
    assert_eq!(
        harness.settle().await.reason(),
        Some(RequeueReason::SteadyState)
    );
}

#[tokio::test]
async fn test_cancelled_apply_fails() {
    let harness = Harness::build(
        prepared(test_manifest(NAME)),
        two_documents(),
        FakeCluster::default().with_latency(Duration::from_secs(5)),
        |options| options,
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = harness.reconcile_with(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(harness.status().state, State::Error);
    assert!(harness.status().synced.is_empty());
}

#[tokio::test]
async fn test_transforms_reach_applied_resources() {
    let harness = Harness::build(
        test_manifest(NAME),
        two_documents(),
        FakeCluster::default(),
        |options| options.with_transform(Arc::new(ManagedByTransform::new("kyma"))),
    );
    harness.settle().await;

    let cluster: &dyn ClusterClient = harness.cluster.as_ref();
    let info = crate::declarative::testing::info("v1", "ConfigMap", "default", "cm");
    let live = cluster.get(&info).await.unwrap().unwrap();
    assert!(live.labels().contains_key(MANAGED_BY_LABEL));
}

#[tokio::test]
async fn test_status_patch_failure_is_reported() {
    let harness = Harness::new(test_manifest(NAME), two_documents());
    harness
        .store
        .fail_status_patches(Some(ClientError::Connection("reset".to_string())));

    assert!(harness.reconcile().await.is_err());
    assert!(harness
        .store
        .events()
        .iter()
        .any(|e| e.warning && e.reason == "PatchStatus"));
}

#[tokio::test]
async fn test_module_resource_lifecycle() {
    let manifest = with_module_resource(test_manifest(NAME), "sample");
    let harness = Harness::build(
        manifest,
        vec![document("v1", "ConfigMap", None, "cm")],
        FakeCluster::default(),
        |options| {
            options
                .with_ready_check(Arc::new(WorkloadReadyCheck))
                .with_post_run_hook(Arc::new(CreateModuleResource))
                .with_pre_delete_hook(Arc::new(DeleteModuleResource))
                .with_deletion_check(Arc::new(ModuleResourceDeletionCheck))
        },
    );

    harness.settle().await;
    assert_eq!(harness.cluster.created_names(), vec!["sample"]);
    assert!(harness
        .current()
        .finalizers()
        .contains(&CUSTOM_RESOURCE_MANAGER_FINALIZER.to_string()));
    let status = harness.status();
    assert_eq!(status.state, State::Processing);
    assert!(status.operation().starts_with(WAITING_FOR_READINESS));

    harness.cluster.insert(live(json!({
        "apiVersion": "operator.kyma-project.io/v1alpha1",
        "kind": "Sample",
        "metadata": {"name": "sample", "namespace": "kyma-system"},
        "status": {"state": "Ready"}
    })));
    let outcome = harness.settle().await;
    assert_eq!(outcome.reason(), Some(RequeueReason::SteadyState));
    assert_eq!(harness.status().state, State::Ready);

    harness.mark_deleting();
    let outcome = harness.reconcile().await.unwrap();
    assert_eq!(outcome.reason(), Some(RequeueReason::HookRequested));
    assert_eq!(harness.cluster.object_names(), vec!["cm"]);
    assert!(!harness
        .current()
        .finalizers()
        .contains(&CUSTOM_RESOURCE_MANAGER_FINALIZER.to_string()));

    assert_eq!(harness.settle().await, Outcome::Finished);
    assert!(harness.cluster.object_names().is_empty());
    assert!(harness.store.current(NAME).is_none());
}
