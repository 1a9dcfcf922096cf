use crate::model::{Id, ResourceType};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by services, collections and contexts.
///
/// Errors are `Clone` because a single coalesced fetch delivers its outcome
/// to every waiter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Nothing exists for the given id.
    #[error("{resource} '{id}' not found")]
    NotFound { resource: &'static str, id: Id },

    /// A draft or patch failed local validation; never sent to the backend.
    #[error("invalid {entity}: {message}")]
    Validation { entity: &'static str, message: String },

    /// The backend answered with a non-2xx status.
    #[error("backend rejected request with status {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    /// A wire record could not be decoded (or a patch encoded).
    #[error("failed to decode {entity}: {message}")]
    Codec { entity: &'static str, message: String },

    #[error("context is already connected")]
    AlreadyConnected,

    #[error("context is not connected")]
    NotConnected,

    #[error("context has been destroyed")]
    Destroyed,

    /// The shared fetch for an id ended without producing a result.
    #[error("fetch for '{0}' was abandoned")]
    FetchAbandoned(Id),

    #[error("no {kind} form at index {index} (committed count {committed})")]
    IndexOutOfRange {
        kind: ResourceType,
        index: usize,
        committed: usize,
    },

    #[error("container has not been created yet")]
    ContainerNotCreated,
}

impl Error {
    pub fn validation(entity: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            entity,
            message: message.into(),
        }
    }

    pub fn codec(entity: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Codec {
            entity,
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
