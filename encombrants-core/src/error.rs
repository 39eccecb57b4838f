//! Error taxonomy of the fulfillment engine.

use std::fmt;

use serde::Serialize;

use crate::ports::{Collection, PortError};

/// A ledger write that already landed when a multi-write sequence failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteRef {
    /// Collection the row was written to.
    pub collection: Collection,
    /// Identifier of the written row.
    pub id: String,
}

impl WriteRef {
    /// Reference a written row.
    #[must_use]
    pub fn new(collection: Collection, id: impl fmt::Display) -> Self {
        Self {
            collection,
            id: id.to_string(),
        }
    }
}

/// Outcome of a multi-write sequence that stopped half-way.
///
/// No compensation is attempted; `committed` lists what a caller has to
/// reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialFailure {
    /// Logical operation that was interrupted.
    pub operation: &'static str,
    /// Writes that succeeded before the failure, in order.
    pub committed: Vec<WriteRef>,
    /// Step that failed.
    pub failed_step: &'static str,
    /// Rendered cause of the failing step.
    pub cause: String,
}

impl fmt::Display for PartialFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} stopped at {} after {} committed write(s): {}",
            self.operation,
            self.failed_step,
            self.committed.len(),
            self.cause
        )
    }
}

#[derive(thiserror::Error, Debug)]
/// Errors surfaced by engine operations.
pub enum EngineError {
    /// Missing or malformed input.
    #[error("{message}")]
    Validation {
        /// Offending payload fields.
        fields: Vec<String>,
        /// Human readable explanation.
        message: String,
    },
    /// A referenced record does not exist or is not visible to the subject.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },
    /// The record is not in a state that allows the transition.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// No disposal site is available for the route.
    #[error("No suitable disposal site")]
    NoSuitableSite,
    /// The ledger or the routing service failed.
    #[error("Upstream error: {0}")]
    Upstream(String),
    /// The engine is missing configuration it needs for this call.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A multi-write sequence stopped after some writes landed.
    #[error("Partial failure: {0}")]
    PartialFailure(PartialFailure),
    /// The call requires an authenticated subject.
    #[error("Authentication required")]
    Unauthenticated,
}

/// Transport-neutral classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`EngineError::Validation`].
    Validation,
    /// See [`EngineError::NotFound`].
    NotFound,
    /// See [`EngineError::Conflict`].
    Conflict,
    /// See [`EngineError::NoSuitableSite`].
    NoSuitableSite,
    /// See [`EngineError::Upstream`].
    Upstream,
    /// See [`EngineError::Configuration`].
    Configuration,
    /// See [`EngineError::PartialFailure`].
    PartialFailure,
    /// See [`EngineError::Unauthenticated`].
    Unauthenticated,
}

impl EngineError {
    /// Validation error about a single field.
    #[must_use]
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            fields: vec![field.to_owned()],
            message: message.into(),
        }
    }

    /// Validation error listing every missing field.
    #[must_use]
    pub fn missing(fields: Vec<String>) -> Self {
        let message = format!("Missing required fields: {}", fields.join(", "));
        EngineError::Validation { fields, message }
    }

    /// Record lookup failure.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Wrap `self` as the cause of an interrupted multi-write sequence.
    #[must_use]
    pub fn after_writes(
        self,
        operation: &'static str,
        committed: Vec<WriteRef>,
        failed_step: &'static str,
    ) -> Self {
        EngineError::PartialFailure(PartialFailure {
            operation,
            committed,
            failed_step,
            cause: self.to_string(),
        })
    }

    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation { .. } => ErrorKind::Validation,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::NoSuitableSite => ErrorKind::NoSuitableSite,
            EngineError::Upstream(_) => ErrorKind::Upstream,
            EngineError::Configuration(_) => ErrorKind::Configuration,
            EngineError::PartialFailure(_) => ErrorKind::PartialFailure,
            EngineError::Unauthenticated => ErrorKind::Unauthenticated,
        }
    }

    /// Payload fields blamed by a validation error.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        match self {
            EngineError::Validation { fields, .. } => fields,
            _ => &[],
        }
    }
}

impl From<PortError> for EngineError {
    fn from(err: PortError) -> Self {
        EngineError::Upstream(err.to_string())
    }
}
