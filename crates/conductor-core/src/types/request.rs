//! Request type definitions
//!
//! A SequenceRequest is one admitted run of a sequence: created by the
//! orchestrator, consumed exactly once by the executor, discarded after the
//! terminal event.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{hash, ident};

/// Scheduling priority for a sequence request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    /// Jumps ahead of NORMAL and CHAINED work.
    High,
    Normal,
    /// Runs immediately after the currently executing chain completes.
    Chained,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Normal => "NORMAL",
            Self::Chained => "CHAINED",
        }
    }
}

/// Whether a request ran straight from admission or behind queued work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionType {
    Immediate,
    Consecutive,
}

impl ExecutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "IMMEDIATE",
            Self::Consecutive => "CONSECUTIVE",
        }
    }
}

/// Outcome of resource-conflict arbitration for an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// No contention; ownership taken at admission.
    Allow,
    /// Incumbent owner is flagged for cancellation; ownership taken at
    /// admission.
    Override,
    /// Ownership transfers when the request reaches the queue head.
    Queue,
    /// Admission fails.
    Reject,
}

/// One admitted run of a sequence against a resource.
#[derive(Debug, Clone)]
pub struct SequenceRequest {
    pub sequence_name: String,
    /// Caller-supplied payload; seeds the accumulating execution payload.
    pub data: Value,
    pub priority: Priority,
    pub request_id: String,
    /// Monotonic admission timestamp, for queue wait measurement.
    pub queued_at: Instant,
    /// `<name>:<resource>:<counter>`, unique per admitted run.
    pub instance_id: String,
    /// Domain prefix of the sequence name.
    pub symphony_name: String,
    /// Object this run contends on.
    pub resource_id: String,
    pub conflict: ConflictResolution,
    pub sequence_hash: u64,
    pub execution_type: ExecutionType,
}

impl SequenceRequest {
    /// Build a request with freshly derived identity fields. The orchestrator
    /// overrides `conflict` and `execution_type` during admission.
    pub fn new(sequence_name: impl Into<String>, data: Value, priority: Priority) -> Self {
        let sequence_name = sequence_name.into();
        let symphony_name = ident::symphony_name(&sequence_name);
        let resource_id = ident::resource_id(&sequence_name, &data);
        let instance_id = ident::instance_id(&sequence_name, &resource_id);
        let sequence_hash = hash::canonical_hash(&sequence_name, &data, priority);
        Self {
            sequence_name,
            data,
            priority,
            request_id: uuid::Uuid::new_v4().to_string(),
            queued_at: Instant::now(),
            instance_id,
            symphony_name,
            resource_id,
            conflict: ConflictResolution::Allow,
            sequence_hash,
            execution_type: ExecutionType::Immediate,
        }
    }

    /// Time spent queued so far.
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// Outcome of a `play` admission, surfaced to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStartResult {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub is_duplicate: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl SequenceStartResult {
    /// A successfully admitted request.
    pub fn started(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            success: true,
            is_duplicate: false,
            reason: None,
        }
    }

    /// A request absorbed by the duplicate window.
    pub fn duplicate(request_id: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            request_id: request_id.into(),
            success: false,
            is_duplicate: true,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_derives_identity_fields() {
        let request = SequenceRequest::new(
            "Canvas.drop-symphony",
            json!({"elementId": "elem-7"}),
            Priority::Normal,
        );

        assert_eq!(request.symphony_name, "Canvas");
        assert_eq!(request.resource_id, "elem-7");
        assert!(request
            .instance_id
            .starts_with("Canvas.drop-symphony:elem-7:"));
        assert_ne!(request.sequence_hash, 0);
    }

    #[test]
    fn test_instance_ids_are_unique_per_request() {
        let a = SequenceRequest::new("Demo.ping-symphony", json!({}), Priority::Normal);
        let b = SequenceRequest::new("Demo.ping-symphony", json!({}), Priority::Normal);
        assert_ne!(a.instance_id, b.instance_id);
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_priority_serializes_uppercase() {
        assert_eq!(serde_json::to_value(Priority::High).unwrap(), json!("HIGH"));
        assert_eq!(
            serde_json::to_value(Priority::Chained).unwrap(),
            json!("CHAINED")
        );
    }
}
