//! Test fixtures for creating common test objects

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::bridge::{
    ChannelHandle, LoopbackDelivery, LoopbackDiscovery, MediatorHandle, PeerIdentity,
};
use crate::config::MediatorConfig;
use crate::shutdown::ShutdownCoordinator;

use super::async_helpers::{assert_completes_within, DEFAULT_TEST_TIMEOUT};

pub fn identity(name: &str) -> PeerIdentity {
    PeerIdentity::new(name)
}

/// Channel `CH<n>` named `peer-<n>`
pub fn channel(n: u32) -> ChannelHandle {
    ChannelHandle::new(format!("CH{}", n), format!("peer-{}", n))
}

/// A running mediator wired to manual loopback collaborators
pub struct LoopbackBridge {
    pub handle: MediatorHandle,
    pub discovery: Arc<LoopbackDiscovery>,
    pub delivery: Arc<LoopbackDelivery>,
    pub shutdown: Arc<ShutdownCoordinator>,
    task: JoinHandle<()>,
}

impl LoopbackBridge {
    pub async fn start() -> Self {
        Self::with_config(MediatorConfig::default()).await
    }

    pub async fn with_config(config: MediatorConfig) -> Self {
        let discovery = Arc::new(LoopbackDiscovery::new(config.event_buffer));
        let delivery = Arc::new(LoopbackDelivery::new(config.event_buffer));
        Self::with_collaborators(config, discovery, delivery).await
    }

    pub async fn with_collaborators(
        config: MediatorConfig,
        discovery: Arc<LoopbackDiscovery>,
        delivery: Arc<LoopbackDelivery>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::default());
        let spawned =
            MediatorHandle::spawn(&config, discovery.clone(), delivery.clone(), shutdown.clone())
                .await;
        let (handle, task) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => panic!("Failed to spawn mediator: {}", e),
        };

        Self {
            handle,
            discovery,
            delivery,
            shutdown,
            task,
        }
    }

    /// Shut the mediator down and wait for its task to finish
    pub async fn stop(self) {
        let _ = self.handle.shutdown().await;
        let joined = assert_completes_within(DEFAULT_TEST_TIMEOUT, self.task).await;
        if let Err(e) = joined {
            panic!("Mediator task failed: {}", e);
        }
    }
}
