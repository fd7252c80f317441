//! Identity and handle types shared by both sides of the bridge

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Vendor-assigned identifier of a mesh-discovered device.
///
/// Stable for one discovery session. A device reappearing in a later session
/// is not guaranteed to reuse it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerIdentity {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

impl From<String> for PeerIdentity {
    fn from(identity: String) -> Self {
        Self(identity)
    }
}

/// Reference to a live device handle owned by the peer-discovery collaborator.
///
/// Two references denote the same instance iff their ids match. A reference
/// is only meaningful between the found and lost events that bracket it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInstance {
    id: Uuid,
}

impl PeerInstance {
    /// Mint a reference to a freshly discovered instance
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self { id }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for PeerInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id.simple())
    }
}

/// Reference to a chat channel owned by the message-delivery collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelHandle {
    sid: String,
    unique_name: String,
}

impl ChannelHandle {
    pub fn new(sid: impl Into<String>, unique_name: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            unique_name: unique_name.into(),
        }
    }

    /// Service-assigned channel id
    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.unique_name, self.sid)
    }
}

/// A chat payload in flight between the two sides. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: PeerIdentity,
    pub text: String,
    pub channel: Option<ChannelHandle>,
}

impl Message {
    pub fn new(sender: impl Into<PeerIdentity>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            channel: None,
        }
    }

    pub fn on_channel(mut self, channel: ChannelHandle) -> Self {
        self.channel = Some(channel);
        self
    }
}

/// Outcome of a channel provisioning request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinResult {
    Joined {
        channel: ChannelHandle,
        identity: PeerIdentity,
        display_name: String,
    },
    Failed {
        /// Identity the request was tagged with, when the service echoes it
        identity: Option<PeerIdentity>,
        reason: String,
    },
}

/// Per-identity bridge lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// Instance known, no channel
    Discovered,
    /// Channel requested, waiting for the join confirmation
    Provisioning,
    /// Instance and channel both live
    Bridged,
    /// Instance gone; channel retained or still being provisioned
    Lost,
    /// Channel known but no instance ever seen for the identity
    Detached,
}

impl BridgeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Discovered => "discovered",
            BridgeState::Provisioning => "provisioning",
            BridgeState::Bridged => "bridged",
            BridgeState::Lost => "lost",
            BridgeState::Detached => "detached",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_identity_is_by_id() {
        let a = PeerInstance::new();
        let b = PeerInstance::new();
        assert_ne!(a, b);
        assert_eq!(a, PeerInstance::from_uuid(a.id()));
    }

    #[test]
    fn test_identity_serializes_as_plain_string() {
        let json = serde_json::to_string(&PeerIdentity::new("B7A1-F00D")).unwrap();
        assert_eq!(json, "\"B7A1-F00D\"");
    }

    #[test]
    fn test_message_builder() {
        let channel = ChannelHandle::new("CH01", "general");
        let message = Message::new("alice", "hi").on_channel(channel.clone());
        assert_eq!(message.sender.as_str(), "alice");
        assert_eq!(message.channel, Some(channel));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(BridgeState::Provisioning.to_string(), "provisioning");
        assert_eq!(
            serde_json::to_string(&BridgeState::Detached).unwrap(),
            "\"detached\""
        );
    }
}
