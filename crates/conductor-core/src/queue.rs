//! Priority execution queue.
//!
//! Three scheduling bands: HIGH ahead of NORMAL, and CHAINED placed at the
//! head of the NORMAL band so the drainer runs it immediately after the
//! currently executing chain completes.

use std::collections::VecDeque;

use serde::Serialize;

use crate::types::{Priority, SequenceRequest};

/// Introspection view of one queued request.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedRequestView {
    pub request_id: String,
    pub sequence_name: String,
    pub priority: Priority,
    pub resource_id: String,
    pub waited_ms: u64,
}

impl QueuedRequestView {
    fn from_request(request: &SequenceRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            sequence_name: request.sequence_name.clone(),
            priority: request.priority,
            resource_id: request.resource_id.clone(),
            waited_ms: request.wait_time().as_millis() as u64,
        }
    }
}

/// Stable priority FIFO. Not synchronized; the orchestrator owns it behind
/// its own lock, like the executor owns its DAG.
#[derive(Default)]
pub struct ExecutionQueue {
    high: VecDeque<SequenceRequest>,
    normal: VecDeque<SequenceRequest>,
}

impl ExecutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a request into its band. Arrival order is preserved within a
    /// band; CHAINED jumps to the head of NORMAL.
    pub fn enqueue(&mut self, request: SequenceRequest) {
        match request.priority {
            Priority::High => self.high.push_back(request),
            Priority::Normal => self.normal.push_back(request),
            Priority::Chained => self.normal.push_front(request),
        }
    }

    /// Remove and return the next request from the highest non-empty band.
    pub fn dequeue(&mut self) -> Option<SequenceRequest> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    /// The request the next `dequeue` would return.
    pub fn peek(&self) -> Option<&SequenceRequest> {
        self.high.front().or_else(|| self.normal.front())
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty()
    }

    /// Dequeue-order view for introspection surfaces.
    pub fn snapshot(&self) -> Vec<QueuedRequestView> {
        self.high
            .iter()
            .chain(self.normal.iter())
            .map(QueuedRequestView::from_request)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(name: &str, priority: Priority) -> SequenceRequest {
        SequenceRequest::new(name, json!({}), priority)
    }

    #[test]
    fn test_high_band_drains_before_normal() {
        let mut queue = ExecutionQueue::new();
        queue.enqueue(request("Demo.n1-symphony", Priority::Normal));
        queue.enqueue(request("Demo.n2-symphony", Priority::Normal));
        queue.enqueue(request("Demo.h1-symphony", Priority::High));

        let order: Vec<String> = std::iter::from_fn(|| queue.dequeue())
            .map(|r| r.sequence_name)
            .collect();
        assert_eq!(
            order,
            vec!["Demo.h1-symphony", "Demo.n1-symphony", "Demo.n2-symphony"]
        );
    }

    #[test]
    fn test_arrival_order_preserved_within_band() {
        let mut queue = ExecutionQueue::new();
        queue.enqueue(request("Demo.a-symphony", Priority::Normal));
        queue.enqueue(request("Demo.b-symphony", Priority::Normal));

        assert_eq!(queue.dequeue().unwrap().sequence_name, "Demo.a-symphony");
        assert_eq!(queue.dequeue().unwrap().sequence_name, "Demo.b-symphony");
    }

    #[test]
    fn test_chained_jumps_to_head_of_normal() {
        let mut queue = ExecutionQueue::new();
        queue.enqueue(request("Demo.n1-symphony", Priority::Normal));
        queue.enqueue(request("Demo.n2-symphony", Priority::Normal));
        queue.enqueue(request("Demo.chain-symphony", Priority::Chained));

        assert_eq!(queue.dequeue().unwrap().sequence_name, "Demo.chain-symphony");
        assert_eq!(queue.dequeue().unwrap().sequence_name, "Demo.n1-symphony");
    }

    #[test]
    fn test_high_still_beats_chained() {
        let mut queue = ExecutionQueue::new();
        queue.enqueue(request("Demo.chain-symphony", Priority::Chained));
        queue.enqueue(request("Demo.h1-symphony", Priority::High));

        assert_eq!(queue.dequeue().unwrap().sequence_name, "Demo.h1-symphony");
        assert_eq!(queue.dequeue().unwrap().sequence_name, "Demo.chain-symphony");
    }

    #[test]
    fn test_snapshot_reflects_dequeue_order() {
        let mut queue = ExecutionQueue::new();
        queue.enqueue(request("Demo.n1-symphony", Priority::Normal));
        queue.enqueue(request("Demo.h1-symphony", Priority::High));

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].sequence_name, "Demo.h1-symphony");
        assert_eq!(snapshot[1].sequence_name, "Demo.n1-symphony");
        assert!(queue.peek().is_some());
    }

    #[test]
    fn test_empty_queue_dequeues_none() {
        let mut queue = ExecutionQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(queue.dequeue().is_none());
        assert!(queue.peek().is_none());
    }
}
