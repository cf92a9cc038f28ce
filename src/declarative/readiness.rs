//! # Readiness
//!
//! Classifies applied resources into a [`State`] once the synced set is
//! stable.
//!
//! Workloads the engine knows how to judge are modelled as a closed
//! [`Workload`] enum; every other kind only has to exist. When the object
//! carries a module custom resource, the state the module operator reports on
//! it is folded in as well.

use crate::declarative::client::ClusterClient;
use crate::declarative::errors::{ClientError, Error};
use crate::declarative::hooks::module_resource_info;
use crate::declarative::object::Object;
use crate::declarative::resource::{ResourceInfo, ResourceList};
use crate::declarative::status::State;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::core::DynamicObject;
use tracing::debug;

/// Outcome of a readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInfo {
    pub state: State,
    /// Human-readable explanation, empty when ready
    pub info: String,
}

impl StateInfo {
    #[must_use]
    pub fn new(state: State, info: impl Into<String>) -> Self {
        Self {
            state,
            info: info.into(),
        }
    }

    #[must_use]
    pub fn ready() -> Self {
        Self::new(State::Ready, "")
    }
}

/// Judges whether applied resources became usable
#[async_trait]
pub trait ReadyCheck<K: Object>: Send + Sync {
    async fn run(
        &self,
        client: &dyn ClusterClient,
        obj: &K,
        resources: &ResourceList,
    ) -> Result<StateInfo, Error>;
}

/// Ready as soon as every applied resource exists
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistsReadyCheck;

#[async_trait]
impl<K: Object> ReadyCheck<K> for ExistsReadyCheck {
    async fn run(
        &self,
        client: &dyn ClusterClient,
        _obj: &K,
        resources: &ResourceList,
    ) -> Result<StateInfo, Error> {
        for info in resources {
            if fetch(client, info).await?.is_none() {
                return Ok(missing(info));
            }
        }
        Ok(StateInfo::ready())
    }
}

/// Existence plus workload rollout status plus module custom resource state
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkloadReadyCheck;

#[async_trait]
impl<K: Object> ReadyCheck<K> for WorkloadReadyCheck {
    async fn run(
        &self,
        client: &dyn ClusterClient,
        obj: &K,
        resources: &ResourceList,
    ) -> Result<StateInfo, Error> {
        let mut results = Vec::new();
        for info in resources {
            match fetch(client, info).await? {
                Some(live) => results.push(Workload::from_live(&live).state()),
                None => return Ok(missing(info)),
            }
        }
        results.push(module_resource_state(client, obj).await?);
        Ok(combine(results))
    }
}

/// Workload kinds with a rollout notion
#[derive(Debug, Clone)]
pub enum Workload {
    Deployment(Box<Deployment>),
    StatefulSet(Box<StatefulSet>),
    Other,
}

impl Workload {
    #[must_use]
    pub fn from_live(live: &DynamicObject) -> Self {
        let kind = live.types.as_ref().map_or("", |t| t.kind.as_str());
        let parsed = serde_json::to_value(live);
        match (kind, parsed) {
            ("Deployment", Ok(value)) => serde_json::from_value(value)
                .map_or(Workload::Other, |d| Workload::Deployment(Box::new(d))),
            ("StatefulSet", Ok(value)) => serde_json::from_value(value)
                .map_or(Workload::Other, |s| Workload::StatefulSet(Box::new(s))),
            _ => Workload::Other,
        }
    }

    #[must_use]
    pub fn state(&self) -> StateInfo {
        match self {
            Workload::Deployment(deployment) => deployment_state(deployment),
            Workload::StatefulSet(statefulset) => statefulset_state(statefulset),
            Workload::Other => StateInfo::ready(),
        }
    }
}

fn deployment_state(deployment: &Deployment) -> StateInfo {
    let name = deployment.metadata.name.as_deref().unwrap_or_default();
    let conditions = deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(Vec::as_slice)
        .unwrap_or_default();
    let find = |r#type: &str| conditions.iter().find(|c| c.type_ == r#type);

    if let Some(progressing) = find("Progressing") {
        let reason = progressing.reason.as_deref().unwrap_or_default();
        if progressing.status == "False"
            && matches!(reason, "ProgressDeadlineExceeded" | "ReplicaSetCreateError")
        {
            return StateInfo::new(
                State::Error,
                format!("deployment {name} failed to roll out: {reason}"),
            );
        }
    }

    let available = find("Available").is_some_and(|c| c.status == "True");
    let rolled_out = find("Progressing").is_some_and(|c| {
        c.status == "True" && c.reason.as_deref() == Some("NewReplicaSetAvailable")
    });
    if available && rolled_out {
        StateInfo::ready()
    } else {
        StateInfo::new(
            State::Processing,
            format!("deployment {name} is not yet available"),
        )
    }
}

fn statefulset_state(statefulset: &StatefulSet) -> StateInfo {
    let name = statefulset.metadata.name.as_deref().unwrap_or_default();
    let desired = statefulset
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = statefulset
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or_default();
    if ready >= desired {
        StateInfo::ready()
    } else {
        StateInfo::new(
            State::Processing,
            format!("statefulset {name} has {ready}/{desired} ready replicas"),
        )
    }
}

async fn module_resource_state<K: Object>(
    client: &dyn ClusterClient,
    obj: &K,
) -> Result<StateInfo, Error> {
    let Some(info) = module_resource_info(obj)? else {
        return Ok(StateInfo::ready());
    };
    let Some(live) = fetch(client, &info).await? else {
        return Ok(missing(&info));
    };
    let reported = live
        .data
        .get("status")
        .and_then(|s| s.get("state"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    debug!(resource = %info.identity(), state = reported, "module resource state");
    Ok(match State::from_reported(reported) {
        State::Ready => StateInfo::ready(),
        state => StateInfo::new(
            state,
            format!("{} reports state {:?}", info.identity(), reported),
        ),
    })
}

async fn fetch(
    client: &dyn ClusterClient,
    info: &ResourceInfo,
) -> Result<Option<DynamicObject>, Error> {
    match client.get(info).await {
        Ok(live) => Ok(live),
        Err(ClientError::NotFound(_) | ClientError::NoMatch { .. }) => Ok(None),
        Err(e) => Err(Error::Readiness(e.for_resource(&info.identity()).to_string())),
    }
}

fn missing(info: &ResourceInfo) -> StateInfo {
    StateInfo::new(
        State::Processing,
        format!("{} does not exist yet", info.identity()),
    )
}

fn rank(state: State) -> u8 {
    match state {
        State::Error => 3,
        State::Processing | State::Deleting | State::Empty => 2,
        State::Warning => 1,
        State::Ready => 0,
    }
}

/// Worst state wins; infos of that state are joined
fn combine(results: Vec<StateInfo>) -> StateInfo {
    let Some(worst) = results.iter().map(|r| r.state).max_by_key(|s| rank(*s)) else {
        return StateInfo::ready();
    };
    let state = match worst {
        State::Deleting | State::Empty => State::Processing,
        other => other,
    };
    let info = results
        .iter()
        .filter(|r| rank(r.state) == rank(worst) && !r.info.is_empty())
        .map(|r| r.info.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    StateInfo::new(state, info)
}
