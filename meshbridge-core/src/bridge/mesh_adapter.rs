//! MeshEventAdapter - peer-discovery events in, mediator commands out
//!
//! Holds no state besides the command queue it writes to. Stale-instance
//! filtering, provisioning and routing are all decided by the mediator.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::errors::{BridgeError, BridgeResult};
use super::mediator::MediatorCommand;
use super::types::{PeerIdentity, PeerInstance};

/// Lifecycle event raised by the peer-discovery collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshEvent {
    /// A new or returning device is in range
    Found {
        identity: PeerIdentity,
        instance: PeerInstance,
    },
    /// The device went out of range. `instance` is the reference that was
    /// lost, which may already be superseded.
    Lost {
        identity: PeerIdentity,
        instance: PeerInstance,
    },
    /// The device sent text meant for its chat channel
    Received {
        instance: PeerInstance,
        identity: PeerIdentity,
        text: String,
    },
    /// A forwarded message could not be delivered to `instance`
    SendFailed {
        instance: PeerInstance,
        reason: String,
    },
}

impl MeshEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MeshEvent::Found { .. } => "found",
            MeshEvent::Lost { .. } => "lost",
            MeshEvent::Received { .. } => "received",
            MeshEvent::SendFailed { .. } => "send_failed",
        }
    }
}

pub struct MeshEventAdapter {
    commands: mpsc::Sender<MediatorCommand>,
}

impl MeshEventAdapter {
    pub fn new(commands: mpsc::Sender<MediatorCommand>) -> Self {
        Self { commands }
    }

    pub fn translate(event: MeshEvent) -> MediatorCommand {
        match event {
            MeshEvent::Found { identity, instance } => {
                MediatorCommand::PeerFound { identity, instance }
            }
            MeshEvent::Lost { identity, instance } => MediatorCommand::PeerLost { identity, instance },
            MeshEvent::Received {
                instance,
                identity,
                text,
            } => MediatorCommand::MeshPayload {
                identity,
                instance: Some(instance),
                text,
            },
            MeshEvent::SendFailed { instance, reason } => {
                MediatorCommand::MeshSendFailed { instance, reason }
            }
        }
    }

    /// Translate `event` and queue it for the mediator
    pub async fn forward(&self, event: MeshEvent) -> BridgeResult<()> {
        crate::metrics::collaborator_event("mesh", event.kind());
        self.commands
            .send(Self::translate(event))
            .await
            .map_err(|_| BridgeError::MediatorClosed)
    }

    /// Pump `events` into the mediator until the stream ends or the
    /// mediator stops
    pub async fn run(self, mut events: mpsc::Receiver<MeshEvent>) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if self.forward(event).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        debug!("Mesh event stream closed");
                        break;
                    }
                },
                _ = self.commands.closed() => break,
            }
        }
        debug!("Mesh event adapter stopped");
    }
}
