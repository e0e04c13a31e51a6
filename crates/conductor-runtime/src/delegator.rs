//! ResourceDelegator - serializes access to shared resources.
//!
//! Defines how admission handles a request whose resource is already owned
//! by a running or queued sequence.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use conductor_core::types::{ConflictResolution, Priority};

/// Current owner of a resource.
#[derive(Debug, Clone)]
pub struct ResourceOwnership {
    pub instance_id: String,
    pub symphony_name: String,
    pub priority: Priority,
    pub since: DateTime<Utc>,
}

/// Outcome of a conflict check.
#[derive(Debug, Clone)]
pub struct ConflictCheck {
    pub has_conflict: bool,
    pub resolution: ConflictResolution,
    pub reason: Option<String>,
}

impl ConflictCheck {
    fn allow() -> Self {
        Self {
            has_conflict: false,
            resolution: ConflictResolution::Allow,
            reason: None,
        }
    }

    fn resolved(resolution: ConflictResolution, reason: impl Into<String>) -> Self {
        Self {
            has_conflict: true,
            resolution,
            reason: Some(reason.into()),
        }
    }
}

/// Resource ownership table with per-resource strict mode.
///
/// Ownership is taken at admission for allow/override resolutions; for
/// queue it transfers when the queued request reaches the head. Release
/// happens on the terminal sequence event.
#[derive(Default)]
pub struct ResourceDelegator {
    ownership: Mutex<HashMap<String, ResourceOwnership>>,
    strict: Mutex<HashSet<String>>,
}

impl ResourceDelegator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a resource strict: conflicting requests are rejected instead of
    /// queued.
    pub fn set_strict(&self, resource_id: impl Into<String>, strict: bool) {
        let mut set = self.strict_guard();
        let resource_id = resource_id.into();
        if strict {
            set.insert(resource_id);
        } else {
            set.remove(&resource_id);
        }
    }

    pub fn is_strict(&self, resource_id: &str) -> bool {
        self.strict_guard().contains(resource_id)
    }

    /// Evaluate an incoming request against the current owner.
    ///
    /// Rules, evaluated top-down:
    /// 1. No current owner: allow.
    /// 2. Same instance: allow (re-entry).
    /// 3. HIGH incoming over a non-HIGH owner: override.
    /// 4. CHAINED incoming from the owner's symphony: queue.
    /// 5. Otherwise queue, or reject when the resource is strict.
    pub fn check(
        &self,
        resource_id: &str,
        instance_id: &str,
        symphony_name: &str,
        priority: Priority,
    ) -> ConflictCheck {
        let ownership = self.ownership_guard();
        let Some(owner) = ownership.get(resource_id) else {
            return ConflictCheck::allow();
        };

        if owner.instance_id == instance_id {
            return ConflictCheck::allow();
        }

        if priority == Priority::High && owner.priority != Priority::High {
            return ConflictCheck::resolved(
                ConflictResolution::Override,
                format!(
                    "HIGH request overrides '{}' on resource '{}'",
                    owner.instance_id, resource_id
                ),
            );
        }

        if priority == Priority::Chained && owner.symphony_name == symphony_name {
            return ConflictCheck::resolved(
                ConflictResolution::Queue,
                format!(
                    "CHAINED request runs after the '{}' chain on resource '{}'",
                    symphony_name, resource_id
                ),
            );
        }

        if self.is_strict(resource_id) {
            return ConflictCheck::resolved(
                ConflictResolution::Reject,
                format!("resource '{}' is strict and already owned", resource_id),
            );
        }

        ConflictCheck::resolved(
            ConflictResolution::Queue,
            format!("resource '{}' is owned; request queued", resource_id),
        )
    }

    /// Take ownership of a resource, replacing any current owner.
    pub fn acquire(
        &self,
        resource_id: impl Into<String>,
        instance_id: impl Into<String>,
        symphony_name: impl Into<String>,
        priority: Priority,
    ) {
        let resource_id = resource_id.into();
        let owner = ResourceOwnership {
            instance_id: instance_id.into(),
            symphony_name: symphony_name.into(),
            priority,
            since: Utc::now(),
        };
        tracing::debug!(
            resource_id = %resource_id,
            instance_id = %owner.instance_id,
            priority = owner.priority.as_str(),
            "resource acquired"
        );
        self.ownership_guard().insert(resource_id, owner);
    }

    /// Release ownership held by the given instance. Stale releases (the
    /// resource has moved to another owner) are ignored.
    pub fn release(&self, resource_id: &str, instance_id: &str) -> bool {
        let mut ownership = self.ownership_guard();
        let held = ownership
            .get(resource_id)
            .map(|owner| owner.instance_id == instance_id)
            .unwrap_or(false);
        if held {
            ownership.remove(resource_id);
            tracing::debug!(resource_id = %resource_id, instance_id = %instance_id, "resource released");
        }
        held
    }

    pub fn owner(&self, resource_id: &str) -> Option<ResourceOwnership> {
        self.ownership_guard().get(resource_id).cloned()
    }

    /// Number of resources currently owned.
    pub fn owned_count(&self) -> usize {
        self.ownership_guard().len()
    }

    fn ownership_guard(&self) -> MutexGuard<'_, HashMap<String, ResourceOwnership>> {
        match self.ownership.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn strict_guard(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.strict.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
