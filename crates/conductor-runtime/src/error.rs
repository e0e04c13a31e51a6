//! Runtime error types.

use thiserror::Error;

use conductor_core::registry::RegistryError;
use conductor_core::validate::ValidationError;

/// Admission-time errors surfaced synchronously to facade callers.
///
/// Duplicates are not errors: they return a `SequenceStartResult` with
/// `success: false`. Runtime handler failures are absorbed by each beat's
/// error policy and never reach the caller.
#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("sequence not found: {0}")]
    SequenceNotFound(String),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("resource '{resource_id}' rejected the request: {reason}")]
    ResourceRejected { resource_id: String, reason: String },
}
