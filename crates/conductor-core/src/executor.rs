//! SequenceExecutor - drives one admitted request through its movements and
//! beats.
//!
//! The executor is responsible for:
//! - Lifecycle emission (`sequence:*`, `movement:*`, `beat:*` plus each
//!   beat's own event) on the shared bus
//! - Per-beat timing discipline (immediate, after-beat, delayed)
//! - Payload accumulation by shallow merge of handler results
//! - Per-beat error policy (stop, continue, abort-sequence)
//! - Cooperative cancellation at beat boundaries
//!
//! At most one sequence executes at a time process-wide; beats within it
//! execute in strict movement/beat order. A handler that never settles hangs
//! the executor, which is the documented contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::bus::{topics, EventBus};
use crate::handler::{HandlerContext, HandlerTable};
use crate::types::{BeatTiming, ErrorPolicy, Sequence, SequenceRequest};

/// Terminal outcome of one sequence execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// All beats across all movements completed.
    Completed {
        runtime: Duration,
        /// Final accumulated payload.
        payload: Value,
    },
    /// A beat failed under a terminating error policy.
    Failed { beat_event: String, error: String },
    /// The run was cancelled at a beat boundary.
    Cancelled { reason: String },
}

struct CurrentRun {
    instance_id: String,
    token: CancellationToken,
    cancel_reason: Option<String>,
}

/// Executes sequences one at a time against the shared bus.
pub struct SequenceExecutor {
    bus: Arc<EventBus>,
    running: AtomicBool,
    current: Mutex<Option<CurrentRun>>,
}

impl SequenceExecutor {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            running: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    /// True while a sequence is executing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flag the named instance for cooperative cancellation.
    ///
    /// The current beat is never preempted; the run aborts at the next beat
    /// boundary. Returns false when the instance is not the one running.
    pub fn request_cancel(&self, instance_id: &str, reason: impl Into<String>) -> bool {
        let mut current = self.current_guard();
        match current.as_mut() {
            Some(run) if run.instance_id == instance_id => {
                run.cancel_reason = Some(reason.into());
                run.token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Run one request to completion, emitting lifecycle events along the
    /// way. The terminal event has been emitted by the time this returns.
    pub async fn run(
        &self,
        request: &SequenceRequest,
        sequence: &Sequence,
        handlers: &HandlerTable,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let token = CancellationToken::new();
        *self.current_guard() = Some(CurrentRun {
            instance_id: request.instance_id.clone(),
            token: token.clone(),
            cancel_reason: None,
        });
        self.running.store(true, Ordering::SeqCst);

        let outcome = self
            .run_inner(request, sequence, handlers, &token, started)
            .await;

        self.running.store(false, Ordering::SeqCst);
        *self.current_guard() = None;
        outcome
    }

    async fn run_inner(
        &self,
        request: &SequenceRequest,
        sequence: &Sequence,
        handlers: &HandlerTable,
        token: &CancellationToken,
        started: Instant,
    ) -> ExecutionOutcome {
        tracing::info!(
            sequence = %request.sequence_name,
            request_id = %request.request_id,
            instance_id = %request.instance_id,
            "sequence execution started"
        );
        self.bus.emit(
            topics::SEQUENCE_STARTED,
            json!({
                "sequence_name": request.sequence_name,
                "request_id": request.request_id,
                "instance_id": request.instance_id,
            }),
        );

        let mut payload = match &request.data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        let mut errors: Vec<Value> = Vec::new();

        for (movement_index, movement) in sequence.movements.iter().enumerate() {
            self.bus.emit(
                topics::MOVEMENT_STARTED,
                json!({
                    "sequence_name": request.sequence_name,
                    "request_id": request.request_id,
                    "movement": movement.name,
                    "movement_index": movement_index,
                }),
            );

            for beat in &movement.beats {
                match beat.timing {
                    BeatTiming::Immediate => {}
                    BeatTiming::AfterBeat => tokio::task::yield_now().await,
                    BeatTiming::Delayed { ms } => sleep(Duration::from_millis(ms)).await,
                }
                if token.is_cancelled() {
                    return self.cancelled(request);
                }

                self.bus.emit(
                    topics::BEAT_STARTED,
                    json!({
                        "sequence_name": request.sequence_name,
                        "request_id": request.request_id,
                        "movement_index": movement_index,
                        "beat": beat.beat,
                        "event": beat.event,
                    }),
                );

                let beat_data = merge_under(&beat.data, &payload);
                let ctx = HandlerContext {
                    request_id: request.request_id.clone(),
                    instance_id: request.instance_id.clone(),
                    sequence_name: request.sequence_name.clone(),
                    symphony_name: request.symphony_name.clone(),
                    resource_id: request.resource_id.clone(),
                    movement_index,
                    beat: beat.beat,
                    payload: Value::Object(payload.clone()),
                    bus: Arc::clone(&self.bus),
                    execution_type: request.execution_type,
                    priority: request.priority,
                };

                let settled = match handlers.get(&beat.event) {
                    Some(handler) => handler.handle(beat_data, ctx).await,
                    // No handler bound: the beat is a pure bus emission.
                    None => Ok(Value::Null),
                };

                match settled {
                    Ok(result) => {
                        if let Value::Object(map) = &result {
                            for (key, value) in map {
                                payload.insert(key.clone(), value.clone());
                            }
                        }
                        self.bus.emit(
                            topics::BEAT_COMPLETED,
                            json!({
                                "sequence_name": request.sequence_name,
                                "request_id": request.request_id,
                                "movement_index": movement_index,
                                "beat": beat.beat,
                                "event": beat.event,
                                "result": result,
                            }),
                        );
                        self.bus.emit(
                            beat.event.clone(),
                            json!({
                                "sequence_name": request.sequence_name,
                                "request_id": request.request_id,
                                "instance_id": request.instance_id,
                                "movement_index": movement_index,
                                "beat": beat.beat,
                                "payload": Value::Object(payload.clone()),
                                "result": result,
                            }),
                        );
                    }
                    Err(error) => {
                        tracing::warn!(
                            sequence = %request.sequence_name,
                            request_id = %request.request_id,
                            beat = beat.beat,
                            event = %beat.event,
                            error = %error,
                            "beat handler failed"
                        );
                        self.bus.emit(
                            topics::BEAT_FAILED,
                            json!({
                                "sequence_name": request.sequence_name,
                                "request_id": request.request_id,
                                "movement_index": movement_index,
                                "beat": beat.beat,
                                "event": beat.event,
                                "error": error.to_string(),
                            }),
                        );
                        match beat.error_handling {
                            ErrorPolicy::Continue => {
                                errors.push(json!({
                                    "beat": beat.beat,
                                    "event": beat.event,
                                    "error": error.to_string(),
                                }));
                                payload.insert("_errors".to_string(), Value::Array(errors.clone()));
                            }
                            ErrorPolicy::Stop | ErrorPolicy::AbortSequence => {
                                let aborted =
                                    matches!(beat.error_handling, ErrorPolicy::AbortSequence);
                                self.bus.emit(
                                    topics::SEQUENCE_FAILED,
                                    json!({
                                        "sequence_name": request.sequence_name,
                                        "request_id": request.request_id,
                                        "beat": beat.beat,
                                        "event": beat.event,
                                        "error": error.to_string(),
                                        "aborted": aborted,
                                    }),
                                );
                                return ExecutionOutcome::Failed {
                                    beat_event: beat.event.clone(),
                                    error: error.to_string(),
                                };
                            }
                        }
                    }
                }

                // Cancellation is observed at the beat's settlement.
                if token.is_cancelled() {
                    return self.cancelled(request);
                }
            }
        }

        let runtime = started.elapsed();
        self.bus.emit(
            topics::SEQUENCE_COMPLETED,
            json!({
                "sequence_name": request.sequence_name,
                "request_id": request.request_id,
                "runtime_ms": runtime.as_millis() as u64,
            }),
        );
        tracing::info!(
            sequence = %request.sequence_name,
            request_id = %request.request_id,
            runtime_ms = runtime.as_millis() as u64,
            "sequence execution completed"
        );
        ExecutionOutcome::Completed {
            runtime,
            payload: Value::Object(payload),
        }
    }

    fn cancelled(&self, request: &SequenceRequest) -> ExecutionOutcome {
        let reason = self
            .current_guard()
            .as_ref()
            .and_then(|run| run.cancel_reason.clone())
            .unwrap_or_else(|| "cancelled".to_string());
        tracing::info!(
            sequence = %request.sequence_name,
            request_id = %request.request_id,
            reason = %reason,
            "sequence execution cancelled"
        );
        self.bus.emit(
            topics::SEQUENCE_CANCELLED,
            json!({
                "sequence_name": request.sequence_name,
                "request_id": request.request_id,
                "reason": reason,
            }),
        );
        ExecutionOutcome::Cancelled { reason }
    }

    fn current_guard(&self) -> MutexGuard<'_, Option<CurrentRun>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Static beat data merged under the runtime payload: the payload wins on
/// key collisions.
fn merge_under(base: &Value, over: &Map<String, Value>) -> Value {
    let mut merged = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    for (key, value) in over {
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}
