//! Collaborator seams
//!
//! The bridge drives two external services it does not own: a mesh
//! peer-discovery service and a cloud chat service. Commands are
//! fire-and-forget; a method returns once the request has been dispatched and
//! the outcome arrives later on the event stream handed out by `subscribe`.
//!
//! Collaborators never hold a reference back to the mediator.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::chat_adapter::ChatEvent;
use super::errors::BridgeResult;
use super::mesh_adapter::MeshEvent;
use super::types::{ChannelHandle, Message, PeerIdentity, PeerInstance};

/// Mesh peer-discovery service
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    /// Begin advertising and browsing for nearby devices
    async fn start_discovery(&self) -> BridgeResult<()>;

    /// Deliver `message` to a live device instance
    async fn send(&self, instance: &PeerInstance, message: &Message) -> BridgeResult<()>;

    /// Open the lifecycle event stream
    async fn subscribe(&self) -> BridgeResult<mpsc::Receiver<MeshEvent>>;
}

/// Cloud chat service
#[async_trait]
pub trait MessageDelivery: Send + Sync {
    /// Request a channel for `identity`
    ///
    /// # Arguments
    /// * `identity` - Tag echoed back on the matching join event
    /// * `display_name` - Human-readable channel name
    async fn provision_channel(&self, identity: &PeerIdentity, display_name: &str)
        -> BridgeResult<()>;

    /// Post `text` to `channel`
    async fn send(&self, channel: &ChannelHandle, text: &str) -> BridgeResult<()>;

    async fn subscribe(&self) -> BridgeResult<mpsc::Receiver<ChatEvent>>;
}

/// Type alias for a shared peer-discovery service
pub type PeerDiscoveryService = Arc<dyn PeerDiscovery>;

/// Type alias for a shared message-delivery service
pub type MessageDeliveryService = Arc<dyn MessageDelivery>;
