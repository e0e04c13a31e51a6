//! Beat handler abstraction
//!
//! This module defines the BeatHandler trait and related types:
//! - BeatHandler: the unit of work bound to a beat event
//! - HandlerTable: event name to handler mapping for one sequence
//! - HandlerContext: execution context handed to every handler
//! - FnHandler: adapter turning async closures into handlers

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::bus::EventBus;
use crate::types::{ExecutionType, Priority};

/// Error raised by a beat handler. Absorbed by the beat's error policy.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Execution context handed to every beat handler.
///
/// Carries the request identity, the position of the beat being executed, a
/// snapshot of the accumulated payload, and the shared event bus.
#[derive(Clone)]
pub struct HandlerContext {
    pub request_id: String,
    pub instance_id: String,
    pub sequence_name: String,
    pub symphony_name: String,
    pub resource_id: String,
    /// 0-based index of the movement being executed.
    pub movement_index: usize,
    /// 1-based beat number within the movement.
    pub beat: u32,
    /// Snapshot of the accumulated payload at handler invocation.
    pub payload: Value,
    pub bus: Arc<EventBus>,
    pub execution_type: ExecutionType,
    pub priority: Priority,
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("request_id", &self.request_id)
            .field("instance_id", &self.instance_id)
            .field("sequence_name", &self.sequence_name)
            .field("movement_index", &self.movement_index)
            .field("beat", &self.beat)
            .finish_non_exhaustive()
    }
}

/// The unit of work bound to a beat event.
///
/// Handlers are black boxes to the executor. They may await, emit on the
/// bus, and return a mapping that is shallow-merged into the sequence
/// payload; a non-mapping return leaves the payload untouched.
#[async_trait]
pub trait BeatHandler: Send + Sync {
    async fn handle(&self, data: Value, ctx: HandlerContext) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into a [`BeatHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> BeatHandler for FnHandler<F>
where
    F: Fn(Value, HandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn handle(&self, data: Value, ctx: HandlerContext) -> Result<Value, HandlerError> {
        (self.0)(data, ctx).await
    }
}

/// Wrap an async closure as a shared handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn BeatHandler>
where
    F: Fn(Value, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler::new(f))
}

/// Mapping from beat event names to handlers for one sequence.
///
/// A beat event with no entry is a pure bus emission: the executor treats
/// the body as a no-op and still emits the event.
#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn BeatHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an event to a handler, replacing any existing binding.
    pub fn on(mut self, event: impl Into<String>, handler: Arc<dyn BeatHandler>) -> Self {
        self.insert(event, handler);
        self
    }

    pub fn insert(&mut self, event: impl Into<String>, handler: Arc<dyn BeatHandler>) {
        self.handlers.insert(event.into(), handler);
    }

    pub fn get(&self, event: &str) -> Option<Arc<dyn BeatHandler>> {
        self.handlers.get(event).cloned()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_context(bus: Arc<EventBus>) -> HandlerContext {
        HandlerContext {
            request_id: "req-1".to_string(),
            instance_id: "Demo.ping-symphony:Demo:0".to_string(),
            sequence_name: "Demo.ping-symphony".to_string(),
            symphony_name: "Demo".to_string(),
            resource_id: "Demo".to_string(),
            movement_index: 0,
            beat: 1,
            payload: json!({}),
            bus,
            execution_type: ExecutionType::Immediate,
            priority: Priority::Normal,
        }
    }

    #[test]
    fn test_fn_handler_invokes_closure() {
        tokio_test::block_on(async {
            let handler = handler_fn(|data, _ctx| async move {
                let n = data.get("n").and_then(|v| v.as_u64()).unwrap_or(0);
                Ok(json!({"doubled": n * 2}))
            });

            let bus = Arc::new(EventBus::new());
            let result = handler
                .handle(json!({"n": 21}), test_context(bus))
                .await
                .unwrap();
            assert_eq!(result, json!({"doubled": 42}));
        });
    }

    #[test]
    fn test_handler_table_replaces_on_rebind() {
        tokio_test::block_on(async {
            let table = HandlerTable::new()
                .on("demo:ping", handler_fn(|_, _| async { Ok(json!({"v": 1})) }))
                .on("demo:ping", handler_fn(|_, _| async { Ok(json!({"v": 2})) }));

            assert_eq!(table.len(), 1);
            let bus = Arc::new(EventBus::new());
            let handler = table.get("demo:ping").unwrap();
            let result = handler.handle(json!({}), test_context(bus)).await.unwrap();
            assert_eq!(result, json!({"v": 2}));
        });
    }

    #[test]
    fn test_missing_event_yields_none() {
        let table = HandlerTable::new();
        assert!(table.get("demo:absent").is_none());
        assert!(!table.contains("demo:absent"));
    }
}
