//! # Types
//!
//! Context shared by every reconciliation and the error surfaced to the
//! controller runtime.

use crate::config::ControllerConfig;
use crate::constants::{MANIFEST_FIELD_OWNER, PART_OF_VALUE};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::layer::LocalLayerSpecResolver;
use crate::controller::target::ManifestTargetResolver;
use crate::crd::Manifest;
use crate::declarative::factory::{ClusterClientFactory, KubeClientFactory, TargetClusterResolver};
use crate::declarative::hooks::{
    CreateModuleResource, DeleteModuleResource, ModuleResourceDeletionCheck,
};
use crate::declarative::object::{KubeObjectStore, ObjectStore};
use crate::declarative::parser::{CachedManifestParser, ManifestParser};
use crate::declarative::readiness::WorkloadReadyCheck;
use crate::declarative::spec::SpecResolver;
use crate::declarative::transform::{CustomLabelsTransform, DisclaimerTransform, ManagedByTransform};
use crate::declarative::{Engine, Error, Options};
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Engine(#[from] Error),
}

/// Backoff state for a specific Manifest
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

pub struct Reconciler {
    pub engine: Engine<Manifest>,
    pub config: ControllerConfig,
    /// Backoff state per Manifest (keyed by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Wire the engine with the Kubernetes-backed collaborators
    #[must_use]
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let store: Arc<dyn ObjectStore<Manifest>> =
            Arc::new(KubeObjectStore::new(client.clone(), MANIFEST_FIELD_OWNER));
        let spec: Arc<dyn SpecResolver<Manifest>> =
            Arc::new(LocalLayerSpecResolver::new(config.manifest_root.clone()));
        let parser: Arc<dyn ManifestParser> =
            Arc::new(CachedManifestParser::new(config.parser_cache_ttl()));
        let target: Arc<dyn TargetClusterResolver<Manifest>> =
            Arc::new(ManifestTargetResolver::new(client));
        let factory: Arc<dyn ClusterClientFactory> =
            Arc::new(KubeClientFactory::new(config.create_namespace));

        let mut options = Options::new(store, spec, parser, target, factory)
            .with_transform(Arc::new(ManagedByTransform::new(PART_OF_VALUE)))
            .with_transform(Arc::new(DisclaimerTransform))
            .with_ready_check(Arc::new(WorkloadReadyCheck))
            .with_post_run_hook(Arc::new(CreateModuleResource))
            .with_pre_delete_hook(Arc::new(DeleteModuleResource))
            .with_deletion_check(Arc::new(ModuleResourceDeletionCheck))
            .with_finalizer(&config.finalizer)
            .with_field_owner(&config.field_owner)
            .with_target_namespace(&config.target_namespace)
            .with_intervals(
                config.success_requeue_duration(),
                config.intended_requeue_duration(),
            );
        if !config.extra_labels.is_empty() {
            options = options.with_transform(Arc::new(CustomLabelsTransform::new(
                config.extra_labels.clone(),
            )));
        }
        Self::with_engine(Engine::new(options), config)
    }

    #[must_use]
    pub fn with_engine(engine: Engine<Manifest>, config: ControllerConfig) -> Self {
        Self {
            engine,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Next error delay for `key` in seconds, with the error count so far
    pub fn next_backoff(&self, key: &str) -> (u64, u32) {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(key.to_string()).or_insert_with(|| {
            BackoffState::new(
                self.config.error_backoff_min_secs,
                self.config.error_backoff_max_secs,
            )
        });
        state.increment_error();
        (state.backoff.next_backoff_seconds(), state.error_count)
    }

    /// Forget the error history of `key` after a success
    pub fn reset_backoff(&self, key: &str) {
        if let Some(state) = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(key)
        {
            state.reset();
        }
    }

    /// Drop all state kept for `key` once the Manifest is gone
    pub fn forget(&self, key: &str) {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
