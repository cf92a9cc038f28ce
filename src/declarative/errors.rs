//! # Errors
//!
//! Error taxonomy of the reconciliation engine.
//!
//! [`ClientError`] classifies a single call against a cluster, [`Error`] is what
//! a reconciliation phase surfaces. Resource-level failures from concurrent
//! apply and cleanup are joined so every phase yields exactly one error.

use std::fmt;
use thiserror::Error;

/// Outcome classification of one API call against a cluster
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("no matches for kind \"{kind}\" in version \"{api_version}\"")]
    NoMatch { api_version: String, kind: String },
    #[error("connection failure: {0}")]
    Connection(String),
    #[error("api error ({code}): {message}")]
    Api { code: u16, message: String },
    #[error("{0}")]
    Other(String),
}

impl ClientError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized(_))
    }

    /// Prefix the message with the resource it concerns, keeping the class
    #[must_use]
    pub fn for_resource(self, resource: &impl fmt::Display) -> Self {
        match self {
            ClientError::NotFound(m) => ClientError::NotFound(format!("{resource}: {m}")),
            ClientError::AlreadyExists(m) => ClientError::AlreadyExists(format!("{resource}: {m}")),
            ClientError::Unauthorized(m) => ClientError::Unauthorized(format!("{resource}: {m}")),
            ClientError::Connection(m) => ClientError::Connection(format!("{resource}: {m}")),
            ClientError::Api { code, message } => ClientError::Api {
                code,
                message: format!("{resource}: {message}"),
            },
            ClientError::Other(m) => ClientError::Other(format!("{resource}: {m}")),
            no_match @ ClientError::NoMatch { .. } => no_match,
        }
    }

    /// Failures that suggest the cached client should be rebuilt
    #[must_use]
    pub fn is_connection_related(&self) -> bool {
        matches!(
            self,
            ClientError::Unauthorized(_) | ClientError::Connection(_)
        )
    }
}

impl From<kube::Error> for ClientError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref response) => match response.code {
                404 => ClientError::NotFound(response.message.clone()),
                409 if response.reason == "AlreadyExists" => {
                    ClientError::AlreadyExists(response.message.clone())
                }
                401 | 403 => ClientError::Unauthorized(response.message.clone()),
                code => ClientError::Api {
                    code,
                    message: response.message.clone(),
                },
            },
            kube::Error::Auth(ref e) => ClientError::Unauthorized(e.to_string()),
            kube::Error::HyperError(ref e) => ClientError::Connection(e.to_string()),
            kube::Error::Service(ref e) => ClientError::Connection(e.to_string()),
            other => ClientError::Other(other.to_string()),
        }
    }
}

/// Errors surfaced by reconciliation phases
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("object has an empty state")]
    EmptyState,

    #[error("access secret not found: {0}")]
    AccessSecretNotFound(String),

    #[error("failed to resolve manifest spec: {0}")]
    Spec(String),

    #[error("failed to parse manifest {path}: {message}")]
    Parse { path: String, message: String },

    #[error("transform {transform} failed: {message}")]
    Transform { transform: String, message: String },

    #[error("failed to build cluster client: {0}")]
    ClusterConfig(String),

    #[error("resource syncTarget diff detected but in same oci layer, prevent sync resource to be deleted")]
    SyncDiffInSameContentRef,

    #[error("deletion of resources not yet finished")]
    DeletionNotFinished,

    #[error("requeue required")]
    RequeueRequired,

    #[error("failed to resolve rendered resources: {0}")]
    Convert(Joined),

    #[error("server side apply failed: {0}")]
    Apply(Joined),

    #[error("cleanup failed: {0}")]
    Cleanup(Joined),

    #[error("readiness check failed: {0}")]
    Readiness(String),

    #[error("hook failed: {0}")]
    Hook(String),

    #[error("reconciliation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the target client cache entry should be dropped
    #[must_use]
    pub fn is_connection_related(&self) -> bool {
        match self {
            Error::Client(e) => e.is_connection_related(),
            Error::Convert(joined) | Error::Apply(joined) | Error::Cleanup(joined) => {
                joined.0.iter().any(ClientError::is_connection_related)
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Client(ClientError::Unauthorized(_)))
    }

    /// Short machine-friendly reason used for events
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Client(_) => "ClientError",
            Error::EmptyState => "Initialize",
            Error::AccessSecretNotFound(_) | Error::ClusterConfig(_) => "ClientInit",
            Error::Spec(_) => "ParseSpec",
            Error::Parse { .. } | Error::Transform { .. } | Error::Convert(_) => {
                "RenderResources"
            }
            Error::SyncDiffInSameContentRef => "SyncDiffInSameContentRef",
            Error::DeletionNotFinished | Error::Cleanup(_) => "PruneDiff",
            Error::RequeueRequired => "RequeueRequired",
            Error::Apply(_) => "SyncResources",
            Error::Readiness(_) => "ReadyCheck",
            Error::Hook(_) => "Hook",
            Error::Cancelled => "Cancelled",
        }
    }
}

/// Several resource-level client errors reported as one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined(pub Vec<ClientError>);

impl Joined {
    /// Every joined error is an authorization failure
    #[must_use]
    pub fn all_unauthorized(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(ClientError::is_unauthorized)
    }
}

impl fmt::Display for Joined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}
