//! Sequence identity helpers: symphony names, resource ids, instance ids.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Everything before the last `.` of a sequence name.
///
/// `Canvas.drop-symphony` yields `Canvas`; a name without a dot is its own
/// symphony.
pub fn symphony_name(sequence_name: &str) -> String {
    match sequence_name.rsplit_once('.') {
        Some((prefix, _)) => prefix.to_string(),
        None => sequence_name.to_string(),
    }
}

/// Resource a request contends on, narrowest available object first:
/// `elementId`, then `resourceId`, falling back to the symphony name.
pub fn resource_id(sequence_name: &str, data: &Value) -> String {
    for key in ["elementId", "resourceId"] {
        if let Some(id) = data.get(key).and_then(|v| v.as_str()) {
            if !id.is_empty() {
                return id.to_string();
            }
        }
    }
    symphony_name(sequence_name)
}

/// `<name>:<resource>:<monotonic counter>`, unique per admitted run.
pub fn instance_id(sequence_name: &str, resource: &str) -> String {
    let serial = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}:{}:{}", sequence_name, resource, serial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_symphony_name_takes_prefix_before_last_dot() {
        assert_eq!(symphony_name("Canvas.drop-symphony"), "Canvas");
        assert_eq!(symphony_name("App.Canvas.drop-symphony"), "App.Canvas");
        assert_eq!(symphony_name("bare"), "bare");
    }

    #[test]
    fn test_resource_id_prefers_element_id() {
        let data = json!({"elementId": "elem-1", "resourceId": "res-1"});
        assert_eq!(resource_id("Canvas.drop-symphony", &data), "elem-1");
    }

    #[test]
    fn test_resource_id_falls_back_to_resource_then_symphony() {
        assert_eq!(
            resource_id("Canvas.drop-symphony", &json!({"resourceId": "res-1"})),
            "res-1"
        );
        assert_eq!(resource_id("Canvas.drop-symphony", &json!({})), "Canvas");
    }

    #[test]
    fn test_instance_ids_are_monotonic() {
        let first = instance_id("Demo.ping-symphony", "Demo");
        let second = instance_id("Demo.ping-symphony", "Demo");
        assert_ne!(first, second);
        assert!(first.starts_with("Demo.ping-symphony:Demo:"));
    }
}
