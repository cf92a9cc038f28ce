//! # Outcome
//!
//! What a reconciliation asks of the dispatch layer when it did not fail.

use std::time::Duration;

/// Why a reconciliation asked to run again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueReason {
    Skipped,
    StateInitialized,
    FinalizerAdded,
    ContentRefBootstrapped,
    DeletionNotFinished,
    HookRequested,
    SyncedChanged,
    ResourcesNotReady,
    StateChanged,
    ContentRefAdvanced,
    FinalizerRemoved,
    WaitingForFinalizers,
    SteadyState,
}

impl RequeueReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RequeueReason::Skipped => "skipped",
            RequeueReason::StateInitialized => "state-initialized",
            RequeueReason::FinalizerAdded => "finalizer-added",
            RequeueReason::ContentRefBootstrapped => "content-ref-bootstrapped",
            RequeueReason::DeletionNotFinished => "deletion-not-finished",
            RequeueReason::HookRequested => "hook-requested",
            RequeueReason::SyncedChanged => "synced-changed",
            RequeueReason::ResourcesNotReady => "resources-not-ready",
            RequeueReason::StateChanged => "state-changed",
            RequeueReason::ContentRefAdvanced => "content-ref-advanced",
            RequeueReason::FinalizerRemoved => "finalizer-removed",
            RequeueReason::WaitingForFinalizers => "waiting-for-finalizers",
            RequeueReason::SteadyState => "steady-state",
        }
    }

    /// Whether the requeue only advances the state machine
    #[must_use]
    pub fn is_intended(&self) -> bool {
        !matches!(
            self,
            RequeueReason::Skipped
                | RequeueReason::SteadyState
                | RequeueReason::WaitingForFinalizers
        )
    }
}

/// Non-failing result of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing left to do, the object is gone
    Finished,
    Requeue {
        after: Duration,
        reason: RequeueReason,
    },
}

impl Outcome {
    #[must_use]
    pub fn requeue(after: Duration, reason: RequeueReason) -> Self {
        Outcome::Requeue { after, reason }
    }

    /// Reason of a requeue, `None` when finished
    #[must_use]
    pub fn reason(&self) -> Option<RequeueReason> {
        match self {
            Outcome::Finished => None,
            Outcome::Requeue { reason, .. } => Some(*reason),
        }
    }
}
