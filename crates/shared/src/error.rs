use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Nothing could be submitted, e.g. no identity is connected.
    Validation,
    /// The signer declined or failed to execute the request.
    Signer,
    /// Settlement reported an unusable result and the anomaly policy surfaces it.
    Settlement,
    /// Reading the tracked object failed.
    Fetch,
}

/// Error value kept in session state and shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn no_identity() -> Self {
        Self::new(ErrorKind::Validation, "no identity connected")
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct SessionException {
    pub kind: ErrorKind,
    pub message: String,
}

impl SessionException {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<SessionException> for SessionError {
    fn from(value: SessionException) -> Self {
        Self {
            kind: value.kind,
            message: value.message,
        }
    }
}

impl From<SessionError> for SessionException {
    fn from(value: SessionError) -> Self {
        Self {
            kind: value.kind,
            message: value.message,
        }
    }
}
