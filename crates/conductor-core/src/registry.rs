//! SequenceRegistry - named sequences and their handler tables.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::bus::topics;
use crate::handler::HandlerTable;
use crate::types::Sequence;
use crate::validate::{self, ValidationError};

/// Registration errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("beat event '{event}' in '{sequence}' collides with a reserved lifecycle prefix")]
    ReservedEvent { sequence: String, event: String },
}

struct RegistryEntry {
    sequence: Arc<Sequence>,
    handlers: Arc<HandlerTable>,
}

/// Name-keyed store of registered sequences.
///
/// Registration validates first and mutates nothing on failure; a successful
/// registration replaces any prior binding for the same name atomically.
#[derive(Default)]
pub struct SequenceRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl SequenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sequence with its handler table.
    ///
    /// Beat events must not collide with the reserved lifecycle prefixes
    /// (`sequence:`, `movement:`, `beat:`, `bus:`), which beat completions
    /// share the bus with.
    pub fn register(
        &self,
        sequence: Sequence,
        handlers: HandlerTable,
    ) -> Result<(), RegistryError> {
        validate::validate_sequence(&sequence)?;
        for movement in &sequence.movements {
            for beat in &movement.beats {
                if topics::RESERVED_PREFIXES
                    .iter()
                    .any(|prefix| beat.event.starts_with(prefix))
                {
                    return Err(RegistryError::ReservedEvent {
                        sequence: sequence.name.clone(),
                        event: beat.event.clone(),
                    });
                }
            }
        }

        tracing::debug!(sequence = %sequence.name, beats = sequence.beat_count(), "sequence registered");
        self.write().insert(
            sequence.name.clone(),
            RegistryEntry {
                sequence: Arc::new(sequence),
                handlers: Arc::new(handlers),
            },
        );
        Ok(())
    }

    /// Remove a sequence. Returns false when the name is unknown.
    pub fn unregister(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Sequence>> {
        self.read().get(name).map(|e| Arc::clone(&e.sequence))
    }

    pub fn handlers(&self, name: &str) -> Option<Arc<HandlerTable>> {
        self.read().get(name).map(|e| Arc::clone(&e.handlers))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered sequence names, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, RegistryEntry>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RegistryEntry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
