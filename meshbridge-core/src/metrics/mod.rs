//! Metrics for bridge observability
//!
//! Everything goes through the `metrics` facade. Nothing is exported unless
//! the embedding binary installs a recorder.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Initialize metrics with descriptions
pub fn init_metrics() {
    // Inbound events
    describe_counter!(
        "meshbridge_collaborator_events_total",
        "Collaborator events forwarded to the mediator, by source and kind"
    );
    describe_counter!(
        "meshbridge_notifications_total",
        "Notifications emitted to the presentation layer, by kind"
    );

    // Provisioning
    describe_counter!("meshbridge_provision_requests_total", "Channel provisioning requests issued");
    describe_counter!("meshbridge_join_failures_total", "Provisioning requests that failed or timed out");
    describe_histogram!(
        "meshbridge_provisioning_duration_seconds",
        "Time from provision request to join confirmation"
    );

    // Routing
    describe_counter!(
        "meshbridge_messages_forwarded_total",
        "Messages forwarded across the bridge, by direction"
    );
    describe_counter!("meshbridge_send_failures_total", "Failed sends, by side");
    describe_counter!("meshbridge_orphan_messages_total", "Chat messages on unmapped channels");
    describe_counter!("meshbridge_stale_losses_total", "Loss events ignored for superseded instances");

    // State
    describe_gauge!("meshbridge_mapped_identities", "Identities present in the identity map");
    describe_gauge!("meshbridge_pending_provisions", "Provisioning requests awaiting a join");
    describe_gauge!("meshbridge_bridged_identities", "Identities with both a live instance and a channel");
}

/// A collaborator event reached an adapter. `source` is `mesh` or `chat`.
pub fn collaborator_event(source: &'static str, kind: &'static str) {
    counter!("meshbridge_collaborator_events_total", "source" => source, "kind" => kind).increment(1);
}

pub fn notification_emitted(kind: &'static str) {
    counter!("meshbridge_notifications_total", "kind" => kind).increment(1);
}

pub fn provision_requested() {
    counter!("meshbridge_provision_requests_total").increment(1);
}

pub fn join_failed() {
    counter!("meshbridge_join_failures_total").increment(1);
}

pub fn provisioning_duration(seconds: f64) {
    histogram!("meshbridge_provisioning_duration_seconds").record(seconds);
}

/// `direction` is `mesh_to_chat` or `chat_to_mesh`
pub fn message_forwarded(direction: &'static str) {
    counter!("meshbridge_messages_forwarded_total", "direction" => direction).increment(1);
}

/// `side` is `mesh` or `chat`
pub fn send_failed(side: &'static str) {
    counter!("meshbridge_send_failures_total", "side" => side).increment(1);
}

pub fn orphan_message() {
    counter!("meshbridge_orphan_messages_total").increment(1);
}

pub fn stale_loss_ignored() {
    counter!("meshbridge_stale_losses_total").increment(1);
}

pub fn set_mapped_identities(count: usize) {
    gauge!("meshbridge_mapped_identities").set(count as f64);
}

pub fn set_bridged_identities(count: usize) {
    gauge!("meshbridge_bridged_identities").set(count as f64);
}

pub fn set_pending_provisions(count: usize) {
    gauge!("meshbridge_pending_provisions").set(count as f64);
}
