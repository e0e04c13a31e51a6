//! Conductor facade.
//!
//! A conductor bundles the bus, registry, delegator, statistics, and
//! orchestrator into one entry point. Construction is explicit and
//! parameterizable; there is no hidden process-wide instance.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use conductor_core::bus::{BusEvent, EventBus, SubscriptionId};
use conductor_core::dedup::DuplicationDetector;
use conductor_core::handler::HandlerTable;
use conductor_core::queue::QueuedRequestView;
use conductor_core::registry::SequenceRegistry;
use conductor_core::stats::{StatisticsManager, StatsSnapshot};
use conductor_core::types::{Priority, Sequence, SequenceStartResult};

use crate::config::ConductorConfig;
use crate::delegator::ResourceDelegator;
use crate::error::ConductorError;
use crate::orchestrator::SequenceOrchestrator;

/// Plugin contribution: one sequence plus the handlers for its beats.
pub struct PluginDefinition {
    pub sequence: Sequence,
    pub handlers: HandlerTable,
}

/// Result of a plugin registration.
#[derive(Debug, Clone, Serialize)]
pub struct PluginRegistration {
    pub registered: bool,
    pub name: String,
}

/// Builder for [`Conductor`] instances.
///
/// Tests and embedders can supply their own bus; everything else is derived
/// from the config.
#[derive(Default)]
pub struct ConductorBuilder {
    config: ConductorConfig,
    bus: Option<Arc<EventBus>>,
}

impl ConductorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ConductorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> Conductor {
        let bus = self.bus.unwrap_or_else(|| Arc::new(EventBus::new()));
        let registry = Arc::new(SequenceRegistry::new());
        let delegator = Arc::new(ResourceDelegator::new());
        for resource in &self.config.strict_resources {
            delegator.set_strict(resource.clone(), true);
        }
        let stats = Arc::new(StatisticsManager::with_sample_cap(
            self.config.stats_sample_cap,
        ));
        let orchestrator = Arc::new(SequenceOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&bus),
            Arc::clone(&delegator),
            Arc::clone(&stats),
            DuplicationDetector::new(self.config.dedup_window_ms),
        ));
        Conductor {
            bus,
            registry,
            delegator,
            stats,
            orchestrator,
        }
    }
}

/// Public entry point to the orchestration runtime.
pub struct Conductor {
    bus: Arc<EventBus>,
    registry: Arc<SequenceRegistry>,
    delegator: Arc<ResourceDelegator>,
    stats: Arc<StatisticsManager>,
    orchestrator: Arc<SequenceOrchestrator>,
}

impl Conductor {
    /// A conductor with default configuration.
    pub fn new() -> Self {
        ConductorBuilder::new().build()
    }

    pub fn with_config(config: ConductorConfig) -> Self {
        ConductorBuilder::new().with_config(config).build()
    }

    pub fn builder() -> ConductorBuilder {
        ConductorBuilder::new()
    }

    /// Request execution of a sequence by name.
    ///
    /// An unqualified name is joined as `<domain>.<sequence_name>`; a name
    /// that already contains a `.` is used as-is. Priority defaults to
    /// NORMAL.
    pub async fn play(
        &self,
        domain: &str,
        sequence_name: &str,
        data: Value,
        priority: Option<Priority>,
    ) -> Result<SequenceStartResult, ConductorError> {
        let full_name = if sequence_name.contains('.') {
            sequence_name.to_string()
        } else {
            format!("{}.{}", domain, sequence_name)
        };
        self.orchestrator
            .start_sequence(&full_name, data, priority.unwrap_or_default())
            .await
    }

    /// Subscribe to bus topics. A trailing `*` matches by prefix.
    pub fn subscribe<F>(&self, pattern: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: Fn(&BusEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        self.bus.subscribe(pattern, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Register a plugin's sequence and handlers, replacing any prior
    /// binding for the same name.
    pub fn register_plugin(
        &self,
        plugin: PluginDefinition,
    ) -> Result<PluginRegistration, ConductorError> {
        let name = plugin.sequence.name.clone();
        self.registry.register(plugin.sequence, plugin.handlers)?;
        Ok(PluginRegistration {
            registered: true,
            name,
        })
    }

    /// Remove a registered sequence. Returns false when the name is unknown.
    pub fn unregister_plugin(&self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    /// Mark a resource strict: conflicting requests are rejected instead of
    /// queued.
    pub fn set_strict_resource(&self, resource_id: impl Into<String>, strict: bool) {
        self.delegator.set_strict(resource_id, strict);
    }

    pub fn statistics(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn queue_snapshot(&self) -> Vec<QueuedRequestView> {
        self.orchestrator.queue_snapshot()
    }

    pub fn registered_sequences(&self) -> Vec<String> {
        self.registry.names()
    }

    /// True while a sequence is executing.
    pub fn is_sequence_running(&self) -> bool {
        self.orchestrator.is_sequence_running()
    }

    /// The shared event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

impl Default for Conductor {
    fn default() -> Self {
        Self::new()
    }
}
