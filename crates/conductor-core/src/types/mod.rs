//! Core type definitions for the conductor runtime
//!
//! This module contains the fundamental types used throughout the system:
//! - Sequence / Movement / Beat: the declarative workflow model
//! - SequenceRequest: one admitted run of a sequence
//! - Priority / BeatTiming / ErrorPolicy: scheduling and failure semantics

mod request;
mod sequence;

pub use request::{
    ConflictResolution, ExecutionType, Priority, SequenceRequest, SequenceStartResult,
};
pub use sequence::{Beat, BeatTiming, Dynamics, ErrorPolicy, Movement, Sequence, SequenceCategory};
