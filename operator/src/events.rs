use crate::store::ObjectStore;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType};
use tracing::warn;

#[must_use]
pub fn from_create(src_type: &str, src_name: &str, child_type: &str, child_name: &str, child: Option<ObjectReference>) -> Event {
    Event {
        type_: EventType::Normal,
        reason: "Created".to_string(),
        note: Some(format!("Created `{child_name}` {child_type} for `{src_name}` {src_type}")),
        action: format!("Creating {child_type}"),
        secondary: child,
    }
}

#[must_use]
pub fn from_ready(src_type: &str, src_name: &str) -> Event {
    Event {
        type_: EventType::Normal,
        reason: "Ready".to_string(),
        note: Some(format!("`{src_name}` {src_type} is ready")),
        action: "Reconciling".to_string(),
        secondary: None,
    }
}

#[must_use]
pub fn from_install(src_name: &str) -> Event {
    Event {
        type_: EventType::Normal,
        reason: "Installed".to_string(),
        note: Some(format!("Installer finished for `{src_name}` HostedControlPlane")),
        action: "Installing".to_string(),
        secondary: None,
    }
}

/// Publish `event`, a failure is only logged
pub async fn publish(store: &dyn ObjectStore, reference: &ObjectReference, event: Event) {
    if let Err(e) = store.publish_event(reference, &event).await {
        warn!(
            "Failed to publish {} event for {}/{}: {e}",
            event.reason,
            reference.namespace.as_deref().unwrap_or_default(),
            reference.name.as_deref().unwrap_or_default()
        );
    }
}
