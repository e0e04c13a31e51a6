//! # Conductor Runtime
//!
//! Admission and arbitration for the conductor orchestration engine.
//!
//! This crate contains:
//! - ResourceDelegator: resource ownership and conflict resolution
//! - SequenceOrchestrator: the admission pipeline and queue drainer
//! - Conductor: the public facade (play / subscribe / register_plugin)
//! - ConductorConfig: runtime tuning knobs
//!
//! The engine pieces (bus, registry, executor, queue, statistics) live in
//! `conductor-core`.

pub mod conductor;
pub mod config;
pub mod delegator;
pub mod error;
pub mod orchestrator;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::conductor::{Conductor, ConductorBuilder, PluginDefinition, PluginRegistration};
    pub use crate::config::ConductorConfig;
    pub use crate::delegator::{ConflictCheck, ResourceDelegator, ResourceOwnership};
    pub use crate::error::ConductorError;
    pub use crate::orchestrator::SequenceOrchestrator;
    pub use conductor_core::prelude::*;
}

// Re-export key types at crate root
pub use conductor::{Conductor, ConductorBuilder, PluginDefinition, PluginRegistration};
pub use config::ConductorConfig;
pub use delegator::{ConflictCheck, ResourceDelegator, ResourceOwnership};
pub use error::ConductorError;
pub use orchestrator::SequenceOrchestrator;
