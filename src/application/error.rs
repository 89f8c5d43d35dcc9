use thiserror::Error;

use crate::domain::Role;

/// Error taxonomy for ledger operations. Every variant is returned to the
/// immediate caller; the only deliberately swallowed failure is an
/// audit-entry append, which the service logs and counts instead.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Malformed or missing input, caught before anything is persisted.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A state precondition no longer holds: duplicate active customer
    /// name, a non-pending transaction being edited, transitioned or
    /// deleted, or a lost race against a concurrent approver. A caller
    /// seeing this on approval knows someone already acted on the
    /// transaction.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The actor's role does not permit the requested operation.
    #[error("Role '{role}' is not allowed to {operation}")]
    Authorization { role: Role, operation: &'static str },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The underlying store failed; surfaced, never silently retried.
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        LedgerError::Conflict(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
