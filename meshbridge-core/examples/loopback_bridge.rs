//! Example bridging two loopback peers with debug logging
//!
//! Run with:
//! ```bash
//! cargo run --example loopback_bridge
//! ```

use meshbridge_core::bridge::{LoopbackDelivery, LoopbackDiscovery, MediatorHandle};
use meshbridge_core::config::MediatorConfig;
use meshbridge_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use meshbridge_core::shutdown::ShutdownCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_with_config(LogConfig::new(LogLevel::Debug).with_target(true))?;

    let config = MediatorConfig::default();
    let discovery = Arc::new(LoopbackDiscovery::new(config.event_buffer));
    let delivery = Arc::new(LoopbackDelivery::auto(config.event_buffer));
    let shutdown = Arc::new(ShutdownCoordinator::new(Duration::from_secs(2)));

    let (handle, task) =
        MediatorHandle::spawn(&config, discovery.clone(), delivery.clone(), shutdown.clone())
            .await?;
    let mut notes = handle.subscribe();

    let alice = discovery.peer_found("alice").await;
    discovery.peer_found("bob").await;
    discovery.receive("alice", &alice, "hi from the mesh").await;

    // Two joins and one acknowledgement
    for _ in 0..3 {
        let note = notes.recv().await?;
        info!(kind = note.kind(), "{}", note);
    }

    for entry in handle.entries() {
        info!(identity = %entry.identity, state = %entry.state, "Entry");
    }

    shutdown.shutdown().await;
    shutdown.drain("mediator", task).await;
    Ok(())
}
