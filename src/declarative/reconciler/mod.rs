//! # Reconciliation Engine
//!
//! Generic state machine driving one object through its phases:
//!
//! 1. Fetch, skip check, status initialization
//! 2. Finalizer attach, spec resolution, content-ref bootstrap
//! 3. Target client acquisition and rendering
//! 4. Diff, consistency guard, cleanup, pre-delete hooks
//! 5. Apply, synced-set update, post-run hooks, readiness
//! 6. Content-ref advance, finalizer release, steady state
//!
//! Any phase either fails (status persisted, error returned for backoff) or
//! asks for an intended requeue which only advances the state machine.
//!
//! The content-ref annotation records the last content version whose
//! resources were completely applied. It is set when first missing and only
//! advanced after a full apply and readiness pass, so a diff observed while it
//! still equals the resolved content ref can only stem from a stale render and
//! never leads to deletion.

mod outcome;

#[cfg(test)]
mod tests;

pub use outcome::{Outcome, RequeueReason};

use crate::constants::{
    CUSTOM_RESOURCE_MANAGER_FINALIZER, PROTECTED_NAMESPACE, SYNCED_CONTENT_REF_ANNOTATION,
};
use crate::declarative::apply::ConcurrentApplier;
use crate::declarative::cleanup::ConcurrentCleanup;
use crate::declarative::client::ClusterClient;
use crate::declarative::convert::{infos_to_resources, ResourceConverter};
use crate::declarative::errors::Error;
use crate::declarative::hooks::Hook;
use crate::declarative::object::{Object, ObjectEvent};
use crate::declarative::options::Options;
use crate::declarative::resource::{has_diff, ResourceList};
use crate::declarative::spec::Spec;
use crate::declarative::status::{
    Condition, Resource, State, Status, CONDITION_TYPE_INSTALLATION, CONDITION_TYPE_RESOURCES,
};
use kube::ResourceExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SYNC_STATE_DIFF: &str = "resource syncTarget state diff detected";
const WAITING_FOR_READINESS: &str = "waiting for resources to become ready";

/// Declarative reconciler for objects of type `K`
pub struct Engine<K: Object> {
    options: Options<K>,
}

impl<K: Object> std::fmt::Debug for Engine<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .finish()
    }
}

impl<K: Object> Engine<K> {
    #[must_use]
    pub fn new(options: Options<K>) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &Options<K> {
        &self.options
    }

    /// Reconcile the object `namespace/name` once
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome, Error> {
        let Some(mut obj) = self.options.store.get(namespace, name).await? else {
            info!("object no longer exists, nothing to reconcile");
            return Ok(Outcome::Finished);
        };

        if (self.options.skip)(&obj) {
            debug!("reconciliation skipped by predicate");
            return Ok(self.after_success(RequeueReason::Skipped));
        }

        let previous = obj.status();
        let mut status = initialize(&obj, previous.clone());
        if status.state == State::Empty {
            let status = status
                .with_state(State::Processing)
                .with_operation(Error::EmptyState.to_string());
            self.persist(&mut obj, &previous, status).await?;
            return Ok(self.intended(RequeueReason::StateInitialized));
        }

        if !obj.is_deleting() && !obj.finalizers().contains(&self.options.finalizer) {
            let mut finalizers = obj.finalizers().to_vec();
            finalizers.push(self.options.finalizer.clone());
            if let Err(e) = self.options.store.patch_finalizers(&obj, &finalizers).await {
                self.event(&obj, ObjectEvent::warning("PatchObject", e.to_string()))
                    .await;
                return Err(e.into());
            }
            info!(finalizer = %self.options.finalizer, "added finalizer");
            return Ok(self.intended(RequeueReason::FinalizerAdded));
        }

        let spec = match self.options.spec_resolver.resolve(&obj).await {
            Ok(spec) => spec,
            Err(err) if obj.is_deleting() => {
                return self
                    .release_finalizers(&mut obj, &previous, status, Some(err))
                    .await
            }
            Err(err) => return self.fail(&mut obj, &previous, status, err).await,
        };

        if !obj.is_deleting() && synced_content_ref(&obj).is_none() {
            obj.annotations_mut().insert(
                SYNCED_CONTENT_REF_ANNOTATION.to_string(),
                spec.content_ref.clone(),
            );
            self.update(&obj).await?;
            info!(content_ref = %spec.content_ref, "recorded initial content ref");
            return Ok(self.intended(RequeueReason::ContentRefBootstrapped));
        }

        let client = match self.target_client(&obj).await {
            Ok(client) => client,
            Err(err @ Error::AccessSecretNotFound(_)) if obj.is_deleting() => {
                return self
                    .release_finalizers(&mut obj, &previous, status, Some(err))
                    .await
            }
            Err(err) => return self.fail(&mut obj, &previous, status, err).await,
        };

        let (target, current) = match self
            .render(client.as_ref(), &obj, &spec, &previous.synced)
            .await
        {
            Ok(rendered) => rendered,
            Err(err) => {
                if err.is_connection_related() {
                    self.invalidate_client(&obj);
                }
                return self.fail(&mut obj, &previous, status, err).await;
            }
        };
        if !status.is_condition_true(CONDITION_TYPE_RESOURCES) {
            let condition = Condition::resources(obj.meta().generation).into_true();
            let operation = condition.message.clone().unwrap_or_default();
            status.set_condition(condition);
            status = status.with_operation(operation);
        }

        let mut diff = current.difference(&target);
        if diff.remove_named("Namespace", PROTECTED_NAMESPACE).is_some() {
            debug!(namespace = PROTECTED_NAMESPACE, "kept protected namespace out of cleanup");
        }
        if !diff.is_empty() {
            if !obj.is_deleting() && synced_content_ref(&obj) == Some(spec.content_ref.as_str()) {
                warn!(
                    count = diff.len(),
                    content_ref = %spec.content_ref,
                    "synced resources missing from an unchanged content ref, evicting manifest cache"
                );
                self.options.parser.evict_cache(&spec);
                let err = Error::SyncDiffInSameContentRef;
                let status = status
                    .with_state(State::Warning)
                    .with_operation(err.to_string());
                self.persist(&mut obj, &previous, status).await?;
                return Err(err);
            }

            info!(count = diff.len(), "deleting resources no longer rendered");
            match ConcurrentCleanup::new(Arc::clone(&client))
                .delete_diff_resources(&diff, cancel)
                .await
            {
                Ok(()) => {}
                Err(err @ Error::DeletionNotFinished) => {
                    let status = if obj.is_deleting() {
                        status
                            .with_state(State::Warning)
                            .with_operation(err.to_string())
                    } else {
                        status
                    };
                    self.persist(&mut obj, &previous, status).await?;
                    return Ok(self.intended(RequeueReason::DeletionNotFinished));
                }
                Err(err) => {
                    if err.is_connection_related() {
                        self.invalidate_client(&obj);
                    }
                    return self.fail(&mut obj, &previous, status, err).await;
                }
            }
        }

        if obj.is_deleting() {
            match self
                .run_hooks(&self.options.pre_delete_hooks, client.as_ref(), &obj)
                .await
            {
                Ok(()) => {}
                Err(Error::RequeueRequired) => {
                    self.persist(&mut obj, &previous, status).await?;
                    return Ok(self.intended(RequeueReason::HookRequested));
                }
                Err(err) => return self.fail(&mut obj, &previous, status, err).await,
            }
        }

        if let Err(err) = ConcurrentApplier::new(Arc::clone(&client), &self.options.field_owner)
            .run(&target, cancel)
            .await
        {
            if err.is_connection_related() {
                self.invalidate_client(&obj);
            }
            return self.fail(&mut obj, &previous, status, err).await;
        }

        let old_synced = std::mem::replace(&mut status.synced, infos_to_resources(&target));
        if has_diff(&old_synced, &status.synced) {
            info!(
                before = old_synced.len(),
                after = status.synced.len(),
                "synced resources changed"
            );
            if !obj.is_deleting() {
                status = status
                    .with_state(State::Processing)
                    .with_operation(SYNC_STATE_DIFF);
            } else if status.state != State::Warning {
                status = status
                    .with_state(State::Deleting)
                    .with_operation(SYNC_STATE_DIFF);
            }
            self.persist(&mut obj, &previous, status).await?;
            return Ok(self.intended(RequeueReason::SyncedChanged));
        }

        match self
            .run_hooks(&self.options.post_run_hooks, client.as_ref(), &obj)
            .await
        {
            Ok(()) => {}
            Err(Error::RequeueRequired) => {
                self.persist(&mut obj, &previous, status).await?;
                return Ok(self.intended(RequeueReason::HookRequested));
            }
            Err(err) => return self.fail(&mut obj, &previous, status, err).await,
        }

        if !obj.is_deleting() {
            let result = match self
                .options
                .ready_check
                .run(client.as_ref(), &obj, &target)
                .await
            {
                Ok(result) => result,
                Err(err) => return self.fail(&mut obj, &previous, status, err).await,
            };

            if result.state == State::Processing {
                let status = status
                    .with_state(State::Processing)
                    .with_operation(format!("{WAITING_FOR_READINESS}: {}", result.info));
                self.persist(&mut obj, &previous, status).await?;
                return Ok(self.intended(RequeueReason::ResourcesNotReady));
            }

            if !status.is_condition_true(CONDITION_TYPE_INSTALLATION)
                || status.state != result.state
            {
                let condition = Condition::installation(obj.meta().generation).into_true();
                let operation = if result.info.is_empty() {
                    condition.message.clone().unwrap_or_default()
                } else {
                    result.info.clone()
                };
                status.set_condition(condition);
                let status = status.with_state(result.state).with_operation(operation);
                self.persist(&mut obj, &previous, status).await?;
                return Ok(self.intended(RequeueReason::StateChanged));
            }
        }

        if synced_content_ref(&obj).is_some_and(|synced| synced != spec.content_ref) {
            obj.annotations_mut().insert(
                SYNCED_CONTENT_REF_ANNOTATION.to_string(),
                spec.content_ref.clone(),
            );
            // the stored object carries the new resourceVersion
            let mut obj = self.update(&obj).await?;
            self.persist(&mut obj, &previous, status).await?;
            info!(content_ref = %spec.content_ref, "advanced synced content ref");
            return Ok(self.intended(RequeueReason::ContentRefAdvanced));
        }

        if obj.is_deleting() {
            return self
                .release_finalizers(&mut obj, &previous, status, None)
                .await;
        }

        self.persist(&mut obj, &previous, status).await?;
        debug!("reconciliation reached steady state");
        Ok(self.after_success(RequeueReason::SteadyState))
    }

    fn intended(&self, reason: RequeueReason) -> Outcome {
        Outcome::requeue(self.options.intended_interval, reason)
    }

    fn after_success(&self, reason: RequeueReason) -> Outcome {
        Outcome::requeue(self.options.success_interval, reason)
    }

    /// Cached client for the object's target, built on a miss
    async fn target_client(&self, obj: &K) -> Result<Arc<dyn ClusterClient>, Error> {
        let key = (self.options.cache_key)(obj);
        if let Some(client) = key.as_ref().and_then(|k| self.options.client_cache.get(k)) {
            return Ok(client);
        }

        let cluster = self.options.target_cluster.resolve(obj).await?;
        let client = self
            .options
            .client_factory
            .build(cluster, &self.options.target_namespace)
            .await?;
        if let Some(key) = key {
            debug!(key = %key, "caching cluster client");
            self.options.client_cache.add(key, Arc::clone(&client));
        }
        Ok(client)
    }

    fn invalidate_client(&self, obj: &K) {
        if let Some(key) = (self.options.cache_key)(obj) {
            if self.options.client_cache.delete(&key) {
                info!(key = %key, "invalidated cached cluster client");
            }
        }
    }

    /// Desired (target) and previously synced (current) resources
    async fn render(
        &self,
        client: &dyn ClusterClient,
        obj: &K,
        spec: &Spec,
        synced: &[Resource],
    ) -> Result<(ResourceList, ResourceList), Error> {
        let converter = ResourceConverter::new(client, &self.options.target_namespace);
        let target = if self.deletion_complete(client, obj).await? {
            ResourceList::default()
        } else {
            let mut documents = self.options.parser.parse(spec).await?;
            for transform in &self.options.transforms {
                transform.transform(obj, &mut documents)?;
            }
            converter.unstructured_to_infos(documents).await?
        };
        let current = converter.resources_to_infos(synced).await?;
        Ok((target, current))
    }

    async fn deletion_complete(&self, client: &dyn ClusterClient, obj: &K) -> Result<bool, Error> {
        if !obj.is_deleting() {
            return Ok(false);
        }
        match &self.options.deletion_check {
            Some(check) => check.run(client, obj).await,
            None => Ok(true),
        }
    }

    async fn run_hooks(
        &self,
        hooks: &[Arc<dyn Hook<K>>],
        client: &dyn ClusterClient,
        obj: &K,
    ) -> Result<(), Error> {
        for hook in hooks {
            debug!(hook = hook.name(), "running hook");
            hook.run(client, self.options.store.as_ref(), obj).await?;
        }
        Ok(())
    }

    /// Drop the engine's finalizers, or all of them when the target cluster
    /// became unreachable for good.
    async fn release_finalizers(
        &self,
        obj: &mut K,
        previous: &Status,
        status: Status,
        cause: Option<Error>,
    ) -> Result<Outcome, Error> {
        let before = obj.finalizers().len();
        if matches!(cause, Some(Error::AccessSecretNotFound(_))) {
            obj.finalizers_mut().clear();
        } else {
            let own = &self.options.finalizer;
            obj.finalizers_mut()
                .retain(|f| f != own && f != CUSTOM_RESOURCE_MANAGER_FINALIZER);
        }

        if obj.finalizers().len() != before {
            if let Some(cause) = &cause {
                warn!("releasing finalizers after unrecoverable error: {}", cause);
            }
            self.update(obj).await?;
            info!("removed finalizers");
            return Ok(self.intended(RequeueReason::FinalizerRemoved));
        }

        let status = if status.state == State::Warning {
            status
        } else {
            status.with_state(State::Deleting).with_operation(format!(
                "waiting as other finalizers are present: {:?}",
                obj.finalizers()
            ))
        };
        self.persist(obj, previous, status).await?;
        match cause {
            Some(err) => Err(err),
            None => Ok(self.after_success(RequeueReason::WaitingForFinalizers)),
        }
    }

    async fn fail(
        &self,
        obj: &mut K,
        previous: &Status,
        status: Status,
        err: Error,
    ) -> Result<Outcome, Error> {
        warn!(reason = err.reason(), "reconciliation failed: {}", err);
        self.persist(obj, previous, status.with_err(&err)).await?;
        Err(err)
    }

    /// Patch the status subresource when something visible changed and
    /// announce state transitions.
    async fn persist(&self, obj: &mut K, previous: &Status, status: Status) -> Result<(), Error> {
        let changed = status.differs_from(previous);
        let transition = status.state != previous.state;
        obj.set_status(status);
        if !changed {
            return Ok(());
        }

        if let Err(e) = self.options.store.patch_status(obj).await {
            self.event(obj, ObjectEvent::warning("PatchStatus", e.to_string()))
                .await;
            return Err(e.into());
        }

        if transition {
            let status = obj.status();
            let reason = status.state.as_str();
            let message = status.operation().to_string();
            let event = if matches!(status.state, State::Error | State::Warning) {
                ObjectEvent::warning(reason, message)
            } else {
                ObjectEvent::normal(reason, message)
            };
            self.event(obj, event).await;
        }
        Ok(())
    }

    /// Full update; returns the object as stored
    async fn update(&self, obj: &K) -> Result<K, Error> {
        match self.options.store.update(obj).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                self.event(obj, ObjectEvent::warning("UpdateObject", e.to_string()))
                    .await;
                Err(e.into())
            }
        }
    }

    async fn event(&self, obj: &K, event: ObjectEvent) {
        self.options.store.publish_event(obj, event).await;
    }
}

/// Ensure both structural conditions exist
fn initialize<K: Object>(obj: &K, mut status: Status) -> Status {
    let generation = obj.meta().generation;
    for condition in [
        Condition::resources(generation),
        Condition::installation(generation),
    ] {
        if status.condition(&condition.r#type).is_none() {
            status.set_condition(condition);
        }
    }
    status
}

fn synced_content_ref<K: Object>(obj: &K) -> Option<&str> {
    obj.annotations()
        .get(SYNCED_CONTENT_REF_ANNOTATION)
        .map(String::as_str)
}
