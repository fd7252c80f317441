//! Notifications for the presentation layer
//!
//! Every subscriber sees every notification. No ordering between subscribers
//! is promised.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

use super::types::{ChannelHandle, Message, PeerIdentity, PeerInstance};

/// Where a failed send was headed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendTarget {
    Channel(ChannelHandle),
    Instance(PeerInstance),
}

impl fmt::Display for SendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendTarget::Channel(channel) => write!(f, "channel {}", channel),
            SendTarget::Instance(instance) => write!(f, "instance {}", instance),
        }
    }
}

/// Outward notification emitted by the mediator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeNotification {
    /// An identity now has a chat channel
    PeerJoinedChannel {
        channel: ChannelHandle,
        identity: PeerIdentity,
    },
    /// The chat service acknowledged a send; `response` is its echoed text
    MessageSent { response: String },
    /// A chat message arrived on a mapped channel
    MessageReceived { message: Message },
    /// Provisioning failed; the identity, when known, is back to discovered
    JoinFailed {
        identity: Option<PeerIdentity>,
        reason: String,
    },
    /// A chat message arrived on a channel no identity is mapped to
    OrphanChannel { channel_id: String },
    /// The mesh lost the current instance of an identity
    InstanceLost { identity: PeerIdentity },
    /// A send on either side failed. Nothing is retried.
    SendFailed { target: SendTarget, reason: String },
}

impl BridgeNotification {
    /// Short stable name, used as the metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeNotification::PeerJoinedChannel { .. } => "peer_joined_channel",
            BridgeNotification::MessageSent { .. } => "message_sent",
            BridgeNotification::MessageReceived { .. } => "message_received",
            BridgeNotification::JoinFailed { .. } => "join_failed",
            BridgeNotification::OrphanChannel { .. } => "orphan_channel",
            BridgeNotification::InstanceLost { .. } => "instance_lost",
            BridgeNotification::SendFailed { .. } => "send_failed",
        }
    }

    /// True for the observability-only failure notifications
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            BridgeNotification::JoinFailed { .. }
                | BridgeNotification::OrphanChannel { .. }
                | BridgeNotification::InstanceLost { .. }
                | BridgeNotification::SendFailed { .. }
        )
    }
}

impl fmt::Display for BridgeNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeNotification::PeerJoinedChannel { channel, identity } => {
                write!(f, "{} joined {}", identity, channel)
            }
            BridgeNotification::MessageSent { response } => write!(f, "sent: {}", response),
            BridgeNotification::MessageReceived { message } => {
                write!(f, "{}: {}", message.sender, message.text)
            }
            BridgeNotification::JoinFailed {
                identity: Some(identity),
                reason,
            } => write!(f, "join failed for {}: {}", identity, reason),
            BridgeNotification::JoinFailed {
                identity: None,
                reason,
            } => write!(f, "join failed: {}", reason),
            BridgeNotification::OrphanChannel { channel_id } => {
                write!(f, "message on unmapped channel {}", channel_id)
            }
            BridgeNotification::InstanceLost { identity } => write!(f, "lost {}", identity),
            BridgeNotification::SendFailed { target, reason } => {
                write!(f, "send to {} failed: {}", target, reason)
            }
        }
    }
}

/// Multicast fan-out of [`BridgeNotification`]s
///
/// Slow subscribers that fall more than `capacity` notifications behind see
/// `RecvError::Lagged` and skip ahead; the mediator never waits on them.
#[derive(Clone)]
pub struct NotificationBroadcaster {
    tx: broadcast::Sender<BridgeNotification>,
}

impl NotificationBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit a notification, returning how many subscribers it reached
    pub fn emit(&self, notification: BridgeNotification) -> usize {
        crate::metrics::notification_emitted(notification.kind());
        self.tx.send(notification).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeNotification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
