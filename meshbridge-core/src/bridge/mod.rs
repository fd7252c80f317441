//! Bridge between a mesh peer-discovery service and a cloud chat service
//!
//! Each mesh identity is paired with at most one chat channel. The
//! [`MediatorHandle`] is the entry point: it wires both collaborators to the
//! mediator task and exposes commands, read queries and notifications to the
//! presentation layer.

pub mod chat_adapter;
pub mod collaborators;
pub mod errors;
pub mod events;
pub mod identity_map;
pub mod loopback;
pub mod mediator;
pub mod mesh_adapter;
pub mod types;

pub use chat_adapter::{ChatEvent, ChatEventAdapter};
pub use collaborators::{MessageDelivery, MessageDeliveryService, PeerDiscovery, PeerDiscoveryService};
pub use errors::{BridgeError, BridgeResult};
pub use events::{BridgeNotification, NotificationBroadcaster, SendTarget};
pub use identity_map::{IdentityChannelEntry, IdentityChannelMap, Retention};
pub use loopback::{LoopbackDelivery, LoopbackDiscovery};
pub use mediator::{MediatorCommand, MediatorHandle};
pub use mesh_adapter::{MeshEvent, MeshEventAdapter};
pub use types::{BridgeState, ChannelHandle, JoinResult, Message, PeerIdentity, PeerInstance};
