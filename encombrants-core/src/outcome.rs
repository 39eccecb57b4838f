//! Transport-neutral results of facade calls.

use serde::Serialize;

use crate::error::{EngineError, ErrorKind, PartialFailure};

/// Coarse result class a transport maps onto its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// Read or transition done.
    Ok,
    /// Record created.
    Created,
    /// Caller input rejected.
    BadRequest,
    /// No authenticated subject.
    Unauthorized,
    /// Unknown record.
    NotFound,
    /// State does not allow the transition.
    Conflict,
    /// Ledger or routing service failed.
    BadGateway,
    /// Misconfiguration or interrupted write sequence.
    InternalError,
}

impl StatusClass {
    /// Whether the class denotes success.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, StatusClass::Ok | StatusClass::Created)
    }
}

/// Successful facade call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Success<T> {
    /// `Ok` or `Created`.
    pub status: StatusClass,
    /// Payload.
    pub data: T,
}

impl<T> Success<T> {
    /// A read or a transition.
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusClass::Ok,
            data,
        }
    }

    /// A new record.
    #[must_use]
    pub fn created(data: T) -> Self {
        Self {
            status: StatusClass::Created,
            data,
        }
    }
}

/// Failed facade call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Error classification.
    pub kind: ErrorKind,
    /// Result class.
    pub status: StatusClass,
    /// Human readable message.
    pub message: String,
    /// Offending payload fields, for validation errors.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// Writes to reconcile, for partial failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<PartialFailure>,
}

impl From<EngineError> for Failure {
    fn from(err: EngineError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::Validation => StatusClass::BadRequest,
            ErrorKind::Unauthenticated => StatusClass::Unauthorized,
            ErrorKind::NotFound => StatusClass::NotFound,
            ErrorKind::Conflict | ErrorKind::NoSuitableSite => StatusClass::Conflict,
            ErrorKind::Upstream => StatusClass::BadGateway,
            ErrorKind::Configuration | ErrorKind::PartialFailure => StatusClass::InternalError,
        };
        let message = err.to_string();
        let fields = err.fields().to_vec();
        let partial = match err {
            EngineError::PartialFailure(partial) => Some(partial),
            _ => None,
        };
        Self {
            kind,
            status,
            message,
            fields,
            partial,
        }
    }
}

/// Result of a facade call.
pub type Outcome<T> = Result<Success<T>, Failure>;
