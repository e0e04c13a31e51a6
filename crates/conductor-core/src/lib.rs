//! # Conductor Core
//!
//! Engine pieces for the conductor orchestration runtime.
//!
//! This crate contains:
//! - Sequence / Movement / Beat definitions and request types
//! - The synchronous event bus with wildcard topic matching
//! - Sequence registration, validation, and canonical request hashing
//! - The duplicate-request window, priority queue, and statistics
//! - The sequence executor (timing, error policy, cancellation)
//!
//! This crate does NOT decide:
//! - Admission policy (dedup + conflict pipeline ordering)
//! - Resource arbitration between requests
//! - How clients construct and drive the runtime
//!
//! Those live in `conductor-runtime`.

pub mod bus;
pub mod dedup;
pub mod executor;
pub mod handler;
pub mod hash;
pub mod ident;
pub mod queue;
pub mod registry;
pub mod stats;
pub mod types;
pub mod validate;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bus::{topics, BusEvent, EventBus, SubscriptionId};
    pub use crate::dedup::DuplicationDetector;
    pub use crate::executor::{ExecutionOutcome, SequenceExecutor};
    pub use crate::handler::{
        handler_fn, BeatHandler, FnHandler, HandlerContext, HandlerError, HandlerTable,
    };
    pub use crate::queue::{ExecutionQueue, QueuedRequestView};
    pub use crate::registry::{RegistryError, SequenceRegistry};
    pub use crate::stats::{StatisticsManager, StatsCounters, StatsSnapshot};
    pub use crate::types::{
        Beat, BeatTiming, ConflictResolution, Dynamics, ErrorPolicy, ExecutionType, Movement,
        Priority, Sequence, SequenceCategory, SequenceRequest, SequenceStartResult,
    };
    pub use crate::validate::{DedupDecision, ValidationError};
}

// Re-export key types at crate root
pub use bus::{BusEvent, EventBus, SubscriptionId};
pub use executor::{ExecutionOutcome, SequenceExecutor};
pub use handler::{handler_fn, BeatHandler, HandlerContext, HandlerError, HandlerTable};
pub use registry::{RegistryError, SequenceRegistry};
pub use stats::{StatisticsManager, StatsSnapshot};
pub use types::{
    Beat, BeatTiming, ErrorPolicy, Movement, Priority, Sequence, SequenceRequest,
    SequenceStartResult,
};
pub use validate::ValidationError;
