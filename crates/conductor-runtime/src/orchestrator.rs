//! SequenceOrchestrator - admission pipeline and queue drainer.
//!
//! Admission is strictly ordered: resolve, deduplicate, record the hash,
//! extract identity, arbitrate the resource, enqueue, kick the drainer.
//! The drainer runs requests one at a time and never propagates an error;
//! a handler failure inside a sequence cannot halt it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde_json::{json, Value};

use conductor_core::bus::{topics, EventBus};
use conductor_core::dedup::DuplicationDetector;
use conductor_core::executor::{ExecutionOutcome, SequenceExecutor};
use conductor_core::ident;
use conductor_core::queue::{ExecutionQueue, QueuedRequestView};
use conductor_core::registry::SequenceRegistry;
use conductor_core::stats::StatisticsManager;
use conductor_core::types::{
    ConflictResolution, ExecutionType, Priority, SequenceRequest, SequenceStartResult,
};
use conductor_core::validate;

use crate::delegator::ResourceDelegator;
use crate::error::ConductorError;

/// Admission pipeline, queue owner, and drain loop.
pub struct SequenceOrchestrator {
    registry: Arc<SequenceRegistry>,
    bus: Arc<EventBus>,
    delegator: Arc<ResourceDelegator>,
    stats: Arc<StatisticsManager>,
    executor: Arc<SequenceExecutor>,
    dedup: DuplicationDetector,
    queue: Mutex<ExecutionQueue>,
    draining: AtomicBool,
}

impl SequenceOrchestrator {
    pub fn new(
        registry: Arc<SequenceRegistry>,
        bus: Arc<EventBus>,
        delegator: Arc<ResourceDelegator>,
        stats: Arc<StatisticsManager>,
        dedup: DuplicationDetector,
    ) -> Self {
        let executor = Arc::new(SequenceExecutor::new(Arc::clone(&bus)));
        Self {
            registry,
            bus,
            delegator,
            stats,
            executor,
            dedup,
            queue: Mutex::new(ExecutionQueue::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// Admit a request for execution.
    ///
    /// Duplicates within the dedup window are absorbed: the caller gets
    /// `success: false, is_duplicate: true` and observers see
    /// `sequence:cancelled { reason: "duplicate-request" }`.
    pub async fn start_sequence(
        self: &Arc<Self>,
        sequence_name: &str,
        data: Value,
        priority: Priority,
    ) -> Result<SequenceStartResult, ConductorError> {
        if !self.registry.contains(sequence_name) {
            self.bus.emit(
                topics::SEQUENCE_FAILED,
                json!({
                    "sequence_name": sequence_name,
                    "reason": "sequence-not-found",
                }),
            );
            return Err(ConductorError::SequenceNotFound(sequence_name.to_string()));
        }

        let decision =
            validate::deduplicate_request(&self.dedup, sequence_name, &data, priority);
        if decision.is_duplicate {
            let request_id = format!("{}-duplicate", uuid::Uuid::new_v4());
            self.stats.record_duplicate();
            tracing::debug!(
                sequence = %sequence_name,
                request_id = %request_id,
                "duplicate request absorbed"
            );
            self.bus.emit(
                topics::SEQUENCE_CANCELLED,
                json!({
                    "sequence_name": sequence_name,
                    "request_id": request_id,
                    "reason": "duplicate-request",
                }),
            );
            return Ok(SequenceStartResult::duplicate(request_id, decision.reason));
        }
        // Recorded before any further work so a racing re-invocation of the
        // same request hashes as a duplicate.
        self.dedup.record(decision.hash);

        let symphony_name = ident::symphony_name(sequence_name);
        let resource_id = ident::resource_id(sequence_name, &data);
        let instance_id = ident::instance_id(sequence_name, &resource_id);

        let check = self
            .delegator
            .check(&resource_id, &instance_id, &symphony_name, priority);
        match check.resolution {
            ConflictResolution::Reject => {
                self.bus.emit(
                    topics::SEQUENCE_FAILED,
                    json!({
                        "sequence_name": sequence_name,
                        "resource_id": resource_id,
                        "reason": "resource-rejected",
                    }),
                );
                return Err(ConductorError::ResourceRejected {
                    resource_id,
                    reason: check.reason.unwrap_or_default(),
                });
            }
            ConflictResolution::Override => {
                if let Some(owner) = self.delegator.owner(&resource_id) {
                    self.executor.request_cancel(&owner.instance_id, "preempted");
                }
                self.delegator
                    .acquire(&resource_id, &instance_id, &symphony_name, priority);
            }
            ConflictResolution::Allow => {
                self.delegator
                    .acquire(&resource_id, &instance_id, &symphony_name, priority);
            }
            // Ownership transfers when the request reaches the queue head.
            ConflictResolution::Queue => {}
        }

        let execution_type = if !self.executor.is_running() && self.queue().is_empty() {
            ExecutionType::Immediate
        } else {
            ExecutionType::Consecutive
        };
        let request = SequenceRequest {
            sequence_name: sequence_name.to_string(),
            data,
            priority,
            request_id: uuid::Uuid::new_v4().to_string(),
            queued_at: Instant::now(),
            instance_id,
            symphony_name,
            resource_id,
            conflict: check.resolution,
            sequence_hash: decision.hash,
            execution_type,
        };
        let request_id = request.request_id.clone();

        self.stats.record_queued();
        let queue_length = {
            let mut queue = self.queue();
            queue.enqueue(request);
            queue.len()
        };
        if !self.executor.is_running() {
            self.kick_drain();
        }

        tracing::info!(
            sequence = %sequence_name,
            request_id = %request_id,
            priority = priority.as_str(),
            queue_length,
            "sequence queued"
        );
        self.bus.emit(
            topics::SEQUENCE_QUEUED,
            json!({
                "sequence_name": sequence_name,
                "request_id": request_id,
                "priority": priority.as_str(),
                "queue_length": queue_length,
            }),
        );

        Ok(SequenceStartResult::started(request_id))
    }

    /// Drain the queue until empty, executing one sequence at a time.
    ///
    /// Single-flight: a second concurrent drain returns immediately. The
    /// loop converts every executor outcome into statistics and resource
    /// release; it never returns early on a failed sequence.
    pub async fn process_queue(self: Arc<Self>) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }

        loop {
            if self.executor.is_running() {
                break;
            }
            let Some(request) = self.queue().dequeue() else {
                break;
            };

            let resolved = self
                .registry
                .get(&request.sequence_name)
                .zip(self.registry.handlers(&request.sequence_name));
            let Some((sequence, handlers)) = resolved else {
                tracing::warn!(
                    sequence = %request.sequence_name,
                    request_id = %request.request_id,
                    "sequence disappeared between admission and drain"
                );
                self.stats.record_error();
                self.bus.emit(
                    topics::SEQUENCE_FAILED,
                    json!({
                        "sequence_name": request.sequence_name,
                        "request_id": request.request_id,
                        "reason": "missing-at-drain",
                    }),
                );
                continue;
            };

            self.stats.record_wait_time(request.wait_time());
            if request.conflict == ConflictResolution::Queue {
                self.delegator.acquire(
                    &request.resource_id,
                    &request.instance_id,
                    &request.symphony_name,
                    request.priority,
                );
            }

            self.stats.record_started();
            let outcome = self.executor.run(&request, &sequence, &handlers).await;
            self.delegator
                .release(&request.resource_id, &request.instance_id);

            match outcome {
                ExecutionOutcome::Completed { runtime, .. } => {
                    self.stats.record_completed(runtime);
                }
                ExecutionOutcome::Failed { .. } => self.stats.record_error(),
                ExecutionOutcome::Cancelled { .. } => self.stats.record_cancelled(),
            }
        }

        self.draining.store(false, Ordering::SeqCst);
        // A request admitted while the flag was still set skipped its kick;
        // pick it up here.
        if !self.queue().is_empty() && !self.executor.is_running() {
            self.kick_drain();
        }
    }

    /// Schedule a drain on the next cooperative turn.
    fn kick_drain(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.process_queue().await;
        });
    }

    /// Dequeue-order view of the pending queue.
    pub fn queue_snapshot(&self) -> Vec<QueuedRequestView> {
        self.queue().snapshot()
    }

    pub fn queue_len(&self) -> usize {
        self.queue().len()
    }

    /// True while a sequence is executing.
    pub fn is_sequence_running(&self) -> bool {
        self.executor.is_running()
    }

    fn queue(&self) -> MutexGuard<'_, ExecutionQueue> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::handler::{handler_fn, HandlerTable};
    use conductor_core::types::{Beat, Movement, Sequence};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::time::sleep;

    fn orchestrator() -> Arc<SequenceOrchestrator> {
        let bus = Arc::new(EventBus::new());
        Arc::new(SequenceOrchestrator::new(
            Arc::new(SequenceRegistry::new()),
            bus,
            Arc::new(ResourceDelegator::new()),
            Arc::new(StatisticsManager::new()),
            DuplicationDetector::new(1_000),
        ))
    }

    fn recorder(
        orchestrator: &SequenceOrchestrator,
        pattern: &str,
    ) -> Arc<StdMutex<Vec<conductor_core::BusEvent>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        orchestrator
            .bus
            .subscribe(pattern, move |event: &conductor_core::BusEvent| {
                sink.lock().unwrap().push(event.clone());
                Ok(())
            });
        seen
    }

    fn one_beat_sequence(name: &str, event: &str) -> Sequence {
        Sequence::new(name).with_movement(Movement::new("main").with_beat(Beat::new(1, event)))
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !check() {
            assert!(Instant::now() < deadline, "condition not met in time");
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_unknown_sequence_fails_admission() {
        let orchestrator = orchestrator();
        let result = orchestrator
            .start_sequence("Demo.absent-symphony", json!({}), Priority::Normal)
            .await;
        assert!(matches!(result, Err(ConductorError::SequenceNotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_admission_absorbed() {
        let orchestrator = orchestrator();
        orchestrator
            .registry
            .register(
                one_beat_sequence("Demo.ping-symphony", "demo:ping"),
                HandlerTable::new(),
            )
            .unwrap();
        let cancelled = recorder(&orchestrator, topics::SEQUENCE_CANCELLED);

        let first = orchestrator
            .start_sequence("Demo.ping-symphony", json!({"n": 1}), Priority::Normal)
            .await
            .unwrap();
        let second = orchestrator
            .start_sequence("Demo.ping-symphony", json!({"n": 1}), Priority::Normal)
            .await
            .unwrap();

        assert!(first.success);
        assert!(!second.success);
        assert!(second.is_duplicate);
        assert!(second.request_id.ends_with("-duplicate"));
        assert_eq!(orchestrator.stats.snapshot().counters.duplicates, 1);

        let cancelled = cancelled.lock().unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].payload["reason"], "duplicate-request");
    }

    #[tokio::test]
    async fn test_missing_at_drain_emits_failure_and_continues() {
        let orchestrator = orchestrator();
        orchestrator
            .registry
            .register(
                one_beat_sequence("Demo.vanish-symphony", "demo:vanish"),
                HandlerTable::new(),
            )
            .unwrap();
        orchestrator
            .registry
            .register(
                one_beat_sequence("Demo.stay-symphony", "demo:stay"),
                HandlerTable::new(),
            )
            .unwrap();
        let failed = recorder(&orchestrator, topics::SEQUENCE_FAILED);
        let completed = recorder(&orchestrator, topics::SEQUENCE_COMPLETED);

        orchestrator
            .start_sequence("Demo.vanish-symphony", json!({}), Priority::Normal)
            .await
            .unwrap();
        orchestrator
            .start_sequence("Demo.stay-symphony", json!({}), Priority::Normal)
            .await
            .unwrap();
        // Unregister before the spawned drain gets a turn.
        orchestrator.registry.unregister("Demo.vanish-symphony");

        wait_until(|| completed.lock().unwrap().len() == 1).await;

        let failed = failed.lock().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].payload["reason"], "missing-at-drain");
        assert_eq!(failed[0].payload["sequence_name"], "Demo.vanish-symphony");
        assert_eq!(orchestrator.stats.snapshot().counters.errored, 1);
    }

    #[tokio::test]
    async fn test_strict_resource_rejection_surfaces_error() {
        let orchestrator = orchestrator();
        orchestrator.delegator.set_strict("elem-7", true);
        let sequence = one_beat_sequence("Canvas.hold-symphony", "canvas:hold");
        let handlers = HandlerTable::new().on(
            "canvas:hold",
            handler_fn(|_, _| async {
                sleep(Duration::from_millis(100)).await;
                Ok(json!({}))
            }),
        );
        orchestrator.registry.register(sequence, handlers).unwrap();
        orchestrator
            .registry
            .register(
                one_beat_sequence("Canvas.poke-symphony", "canvas:poke"),
                HandlerTable::new(),
            )
            .unwrap();

        orchestrator
            .start_sequence(
                "Canvas.hold-symphony",
                json!({"elementId": "elem-7"}),
                Priority::Normal,
            )
            .await
            .unwrap();
        wait_until(|| orchestrator.is_sequence_running()).await;

        let result = orchestrator
            .start_sequence(
                "Canvas.poke-symphony",
                json!({"elementId": "elem-7"}),
                Priority::Normal,
            )
            .await;
        match result {
            Err(ConductorError::ResourceRejected { resource_id, .. }) => {
                assert_eq!(resource_id, "elem-7");
            }
            other => panic!("expected resource rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_queue_snapshot_reflects_pending_work() {
        let orchestrator = orchestrator();
        orchestrator
            .registry
            .register(
                one_beat_sequence("Demo.a-symphony", "demo:a"),
                HandlerTable::new(),
            )
            .unwrap();
        orchestrator
            .registry
            .register(
                one_beat_sequence("Demo.b-symphony", "demo:b"),
                HandlerTable::new(),
            )
            .unwrap();

        orchestrator
            .start_sequence("Demo.a-symphony", json!({}), Priority::Normal)
            .await
            .unwrap();
        orchestrator
            .start_sequence("Demo.b-symphony", json!({}), Priority::High)
            .await
            .unwrap();

        // Both admissions ran before the drain task got a turn.
        let snapshot = orchestrator.queue_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].sequence_name, "Demo.b-symphony");
        assert_eq!(snapshot[1].sequence_name, "Demo.a-symphony");
    }
}
