//! ChatEventAdapter - chat-service events in, mediator commands out

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::errors::{BridgeError, BridgeResult};
use super::mediator::MediatorCommand;
use super::types::{ChannelHandle, JoinResult, Message, PeerIdentity};

/// Lifecycle event raised by the message-delivery collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatEvent {
    /// A channel now exists for `identity`
    Joined {
        channel: ChannelHandle,
        identity: PeerIdentity,
        display_name: String,
    },
    /// The most recent send went through
    SendAcknowledged { response: String },
    /// A chat message arrived on `channel`
    Received {
        channel: ChannelHandle,
        message: Message,
    },
    /// Provisioning failed. `identity` is the tag from the provision request
    /// when the service reports it.
    JoinFailed {
        identity: Option<PeerIdentity>,
        reason: String,
    },
    /// A send to `channel` was rejected after dispatch
    SendFailed {
        channel: ChannelHandle,
        reason: String,
    },
}

impl ChatEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::Joined { .. } => "joined",
            ChatEvent::SendAcknowledged { .. } => "send_acknowledged",
            ChatEvent::Received { .. } => "received",
            ChatEvent::JoinFailed { .. } => "join_failed",
            ChatEvent::SendFailed { .. } => "send_failed",
        }
    }
}

pub struct ChatEventAdapter {
    commands: mpsc::Sender<MediatorCommand>,
}

impl ChatEventAdapter {
    pub fn new(commands: mpsc::Sender<MediatorCommand>) -> Self {
        Self { commands }
    }

    pub fn translate(event: ChatEvent) -> MediatorCommand {
        match event {
            ChatEvent::Joined {
                channel,
                identity,
                display_name,
            } => MediatorCommand::JoinResolved(JoinResult::Joined {
                channel,
                identity,
                display_name,
            }),
            ChatEvent::JoinFailed { identity, reason } => {
                MediatorCommand::JoinResolved(JoinResult::Failed { identity, reason })
            }
            ChatEvent::SendAcknowledged { response } => {
                MediatorCommand::SendAcknowledged { response }
            }
            ChatEvent::Received { channel, message } => {
                MediatorCommand::ChatMessage { channel, message }
            }
            ChatEvent::SendFailed { channel, reason } => {
                MediatorCommand::ChatSendFailed { channel, reason }
            }
        }
    }

    pub async fn forward(&self, event: ChatEvent) -> BridgeResult<()> {
        crate::metrics::collaborator_event("chat", event.kind());
        self.commands
            .send(Self::translate(event))
            .await
            .map_err(|_| BridgeError::MediatorClosed)
    }

    pub async fn run(self, mut events: mpsc::Receiver<ChatEvent>) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if self.forward(event).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        debug!("Chat event stream closed");
                        break;
                    }
                },
                _ = self.commands.closed() => break,
            }
        }
        debug!("Chat event adapter stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_outcomes_become_join_results() {
        let joined = ChatEventAdapter::translate(ChatEvent::Joined {
            channel: ChannelHandle::new("CH1", "peer-1"),
            identity: PeerIdentity::new("P1"),
            display_name: "P1".into(),
        });
        assert!(matches!(
            joined,
            MediatorCommand::JoinResolved(JoinResult::Joined { .. })
        ));

        let failed = ChatEventAdapter::translate(ChatEvent::JoinFailed {
            identity: None,
            reason: "timeout".into(),
        });
        match failed {
            MediatorCommand::JoinResolved(JoinResult::Failed { identity, reason }) => {
                assert!(identity.is_none());
                assert_eq!(reason, "timeout");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_received_message_keeps_channel() {
        let channel = ChannelHandle::new("CH1", "peer-1");
        let command = ChatEventAdapter::translate(ChatEvent::Received {
            channel: channel.clone(),
            message: Message::new("cloud-user", "hey"),
        });
        assert!(matches!(
            command,
            MediatorCommand::ChatMessage { channel: c, .. } if c == channel
        ));
    }

    #[tokio::test]
    async fn test_forward_fails_once_mediator_is_gone() {
        let (command_tx, command_rx) = mpsc::channel(1);
        drop(command_rx);

        let adapter = ChatEventAdapter::new(command_tx);
        let result = adapter
            .forward(ChatEvent::SendAcknowledged {
                response: "ok".into(),
            })
            .await;
        assert!(matches!(result, Err(BridgeError::MediatorClosed)));
    }
}
