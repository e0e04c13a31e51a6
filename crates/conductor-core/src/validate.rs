//! Structural validation of sequences and the deduplication front-end.

use serde_json::Value;
use thiserror::Error;

use crate::dedup::DuplicationDetector;
use crate::hash;
use crate::types::{Priority, Sequence};

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("sequence name must not be empty")]
    EmptyName,

    #[error("sequence '{0}' must declare a positive tempo")]
    InvalidTempo(String),

    #[error("sequence '{0}' has no movements")]
    NoMovements(String),

    #[error("sequence '{0}' contains a movement with an empty name")]
    EmptyMovementName(String),

    #[error("movement '{0}' has no beats")]
    EmptyMovement(String),

    #[error("movement '{movement}' beat at position {position} is numbered {found}; beats must be contiguous from 1")]
    BeatOutOfOrder {
        movement: String,
        position: usize,
        found: u32,
    },

    #[error("movement '{movement}' beat {beat} has no event")]
    MissingEvent { movement: String, beat: u32 },
}

/// Validate a sequence's structure before registration.
///
/// Checks: non-empty names, positive tempo, non-empty movements, and per
/// movement non-empty beats contiguously numbered from 1, each with an
/// event. Timing and error-policy values are closed enums and need no
/// runtime check.
pub fn validate_sequence(sequence: &Sequence) -> Result<(), ValidationError> {
    if sequence.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if sequence.tempo == 0 {
        return Err(ValidationError::InvalidTempo(sequence.name.clone()));
    }
    if sequence.movements.is_empty() {
        return Err(ValidationError::NoMovements(sequence.name.clone()));
    }

    for movement in &sequence.movements {
        if movement.name.trim().is_empty() {
            return Err(ValidationError::EmptyMovementName(sequence.name.clone()));
        }
        if movement.beats.is_empty() {
            return Err(ValidationError::EmptyMovement(movement.name.clone()));
        }
        for (position, beat) in movement.beats.iter().enumerate() {
            let expected = position as u32 + 1;
            if beat.beat != expected {
                return Err(ValidationError::BeatOutOfOrder {
                    movement: movement.name.clone(),
                    position: position + 1,
                    found: beat.beat,
                });
            }
            if beat.event.trim().is_empty() {
                return Err(ValidationError::MissingEvent {
                    movement: movement.name.clone(),
                    beat: beat.beat,
                });
            }
        }
    }

    Ok(())
}

/// Outcome of the request-deduplication check.
#[derive(Debug, Clone)]
pub struct DedupDecision {
    pub is_duplicate: bool,
    pub reason: Option<String>,
    /// Canonical hash of the request identity, returned regardless of the
    /// outcome so callers can record it.
    pub hash: u64,
}

/// Hash a request identity and test it against the recent-hash window.
pub fn deduplicate_request(
    detector: &DuplicationDetector,
    name: &str,
    data: &Value,
    priority: Priority,
) -> DedupDecision {
    let hash = hash::canonical_hash(name, data, priority);
    if detector.is_duplicate(hash) {
        DedupDecision {
            is_duplicate: true,
            reason: Some(format!(
                "request for '{}' repeated within the dedup window",
                name
            )),
            hash,
        }
    } else {
        DedupDecision {
            is_duplicate: false,
            reason: None,
            hash,
        }
    }
}
