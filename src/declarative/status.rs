//! # Status
//!
//! The status shape shared by every object the engine reconciles.
//!
//! It is persisted through the status subresource and read by dashboards and
//! other operators, so field names and state strings are part of the contract.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Condition type tracking whether the desired resources could be rendered
pub const CONDITION_TYPE_RESOURCES: &str = "Resources";
/// Condition type tracking whether the installation became ready
pub const CONDITION_TYPE_INSTALLATION: &str = "Installation";

const CONDITION_REASON_RESOURCES: &str = "ResourcesAvailable";
const CONDITION_REASON_INSTALLATION: &str = "Ready";
const CONDITION_MESSAGE_RESOURCES: &str = "resources are parsed and ready for use";
const CONDITION_MESSAGE_INSTALLATION: &str = "installation is ready and resources can be used";

/// Lifecycle state of a reconciled object.
///
/// The empty state only exists on freshly created objects and is repaired on
/// the first reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum State {
    #[default]
    #[serde(rename = "")]
    Empty,
    Processing,
    Ready,
    Warning,
    Error,
    Deleting,
}

impl State {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Empty => "",
            State::Processing => "Processing",
            State::Ready => "Ready",
            State::Warning => "Warning",
            State::Error => "Error",
            State::Deleting => "Deleting",
        }
    }

    /// Parse a state reported by a module custom resource.
    ///
    /// Unknown values are treated as still processing.
    #[must_use]
    pub fn from_reported(value: &str) -> Self {
        match value {
            "Ready" => State::Ready,
            "Warning" => State::Warning,
            "Error" => State::Error,
            "Deleting" => State::Deleting,
            _ => State::Processing,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition represents a named boolean fact about the object
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (`Resources` or `Installation`)
    pub r#type: String,
    /// Status of the condition (`True`, `False`, `Unknown`)
    pub status: String,
    /// Last transition time (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Generation of the object the condition was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    fn new(r#type: &str, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self {
            r#type: r#type.to_string(),
            status: "False".to_string(),
            last_transition_time: Some(now_rfc3339()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            observed_generation: generation,
        }
    }

    /// The `Resources` condition in its initial (false) state
    #[must_use]
    pub fn resources(generation: Option<i64>) -> Self {
        Self::new(
            CONDITION_TYPE_RESOURCES,
            CONDITION_REASON_RESOURCES,
            CONDITION_MESSAGE_RESOURCES,
            generation,
        )
    }

    /// The `Installation` condition in its initial (false) state
    #[must_use]
    pub fn installation(generation: Option<i64>) -> Self {
        Self::new(
            CONDITION_TYPE_INSTALLATION,
            CONDITION_REASON_INSTALLATION,
            CONDITION_MESSAGE_INSTALLATION,
            generation,
        )
    }

    #[must_use]
    pub fn into_true(mut self) -> Self {
        self.status = "True".to_string();
        self
    }

    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }

    /// Equality ignoring the transition timestamp
    fn same_fact(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Identity of a resource the engine applied.
///
/// Two resources are equal when name, namespace and kind match; group and
/// version are ignored so that API version bumps do not look like drift.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    pub kind: String,
}

impl Resource {
    #[must_use]
    pub fn new(api_version: &str, kind: &str, namespace: &str, name: &str) -> Self {
        let (group, version) = split_api_version(api_version);
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// `group/version` or just `version` for the core group
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Identity key used for order-insensitive set comparisons
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.name, self.kind)
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.namespace == other.namespace && self.kind == other.kind
    }
}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.namespace.hash(state);
        self.kind.hash(state);
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// Split an `apiVersion` into group and version
#[must_use]
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Last operation performed by the engine
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastOperation {
    /// Free-text diagnostic of what happened last
    pub operation: String,
    /// When the operation was recorded (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
}

/// Status of a reconciled object
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Resources last applied successfully, in apply order
    #[serde(default)]
    pub synced: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,
}

impl Status {
    #[must_use]
    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    /// Record an operation message with the current time
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.last_operation = Some(LastOperation {
            operation: operation.into(),
            last_update_time: Some(now_rfc3339()),
        });
        self
    }

    /// Record an error as the last operation and move to `Error`
    #[must_use]
    pub fn with_err(self, err: &dyn fmt::Display) -> Self {
        self.with_state(State::Error).with_operation(err.to_string())
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        self.last_operation
            .as_ref()
            .map_or("", |op| op.operation.as_str())
    }

    #[must_use]
    pub fn condition(&self, r#type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == r#type)
    }

    #[must_use]
    pub fn is_condition_true(&self, r#type: &str) -> bool {
        self.condition(r#type).is_some_and(Condition::is_true)
    }

    /// Insert or replace a condition, keeping the transition time when the
    /// status value did not flip. Returns whether anything changed.
    pub fn set_condition(&mut self, condition: Condition) -> bool {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            Some(existing) if existing.same_fact(&condition) => false,
            Some(existing) => {
                let keep_time = existing.status == condition.status;
                let previous_time = existing.last_transition_time.take();
                *existing = condition;
                if keep_time {
                    existing.last_transition_time = previous_time;
                }
                true
            }
            None => {
                self.conditions.push(condition);
                true
            }
        }
    }

    /// Whether persisting `self` over `previous` would change anything visible
    #[must_use]
    pub fn differs_from(&self, previous: &Status) -> bool {
        self.state != previous.state
            || self.operation() != previous.operation()
            || self.synced != previous.synced
            || self.conditions.len() != previous.conditions.len()
            || self
                .conditions
                .iter()
                .zip(&previous.conditions)
                .any(|(a, b)| !a.same_fact(b))
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
