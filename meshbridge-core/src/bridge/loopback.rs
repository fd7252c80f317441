//! In-process collaborators
//!
//! `LoopbackDiscovery` and `LoopbackDelivery` stand in for the mesh and chat
//! services. They record every command they receive and let the caller inject
//! events by hand. `LoopbackDelivery::auto` additionally answers provisioning
//! requests with a join and sends with an acknowledgement, which is what the
//! `simulate` command runs against.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::chat_adapter::ChatEvent;
use super::collaborators::{MessageDelivery, PeerDiscovery};
use super::errors::{BridgeError, BridgeResult};
use super::mesh_adapter::MeshEvent;
use super::types::{ChannelHandle, Message, PeerIdentity, PeerInstance};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fan-out to every subscriber of a loopback collaborator
struct Subscribers<E> {
    buffer: usize,
    senders: Mutex<Vec<mpsc::Sender<E>>>,
}

impl<E: Clone + Send + 'static> Subscribers<E> {
    fn new(buffer: usize) -> Self {
        Self {
            buffer,
            senders: Mutex::new(Vec::new()),
        }
    }

    fn subscribe(&self) -> mpsc::Receiver<E> {
        let (tx, rx) = mpsc::channel(self.buffer);
        lock(&self.senders).push(tx);
        rx
    }

    fn snapshot(&self) -> Vec<mpsc::Sender<E>> {
        let mut senders = lock(&self.senders);
        senders.retain(|tx| !tx.is_closed());
        senders.clone()
    }

    async fn emit(&self, event: E) {
        for tx in self.snapshot() {
            let _ = tx.send(event.clone()).await;
        }
    }

    /// Emit from a separate task so a caller that is itself being awaited by
    /// the mediator never blocks on the mediator's queue
    fn emit_detached(&self, event: E) {
        let senders = self.snapshot();
        tokio::spawn(async move {
            for tx in senders {
                let _ = tx.send(event.clone()).await;
            }
        });
    }
}

/// Loopback mesh peer-discovery service
pub struct LoopbackDiscovery {
    subscribers: Subscribers<MeshEvent>,
    sent: Mutex<Vec<(PeerInstance, Message)>>,
    starts: AtomicUsize,
    fail_sends: AtomicBool,
}

impl LoopbackDiscovery {
    /// `buffer` sizes each subscriber's event channel
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Subscribers::new(buffer),
            sent: Mutex::new(Vec::new()),
            starts: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
        }
    }

    pub async fn emit(&self, event: MeshEvent) {
        self.subscribers.emit(event).await;
    }

    /// Report a fresh instance of `identity` in range and return it
    pub async fn peer_found(&self, identity: impl Into<PeerIdentity>) -> PeerInstance {
        let instance = PeerInstance::new();
        self.emit(MeshEvent::Found {
            identity: identity.into(),
            instance: instance.clone(),
        })
        .await;
        instance
    }

    pub async fn peer_lost(&self, identity: impl Into<PeerIdentity>, instance: &PeerInstance) {
        self.emit(MeshEvent::Lost {
            identity: identity.into(),
            instance: instance.clone(),
        })
        .await;
    }

    /// Deliver text from a mesh device to the bridge
    pub async fn receive(
        &self,
        identity: impl Into<PeerIdentity>,
        instance: &PeerInstance,
        text: impl Into<String>,
    ) {
        self.emit(MeshEvent::Received {
            instance: instance.clone(),
            identity: identity.into(),
            text: text.into(),
        })
        .await;
    }

    /// Every message handed to `send`, in order
    pub fn sent(&self) -> Vec<(PeerInstance, Message)> {
        lock(&self.sent).clone()
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Make subsequent sends fail at dispatch
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PeerDiscovery for LoopbackDiscovery {
    async fn start_discovery(&self) -> BridgeResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        debug!("Loopback discovery started");
        Ok(())
    }

    async fn send(&self, instance: &PeerInstance, message: &Message) -> BridgeResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BridgeError::Discovery(format!(
                "instance {} unreachable",
                instance
            )));
        }
        lock(&self.sent).push((instance.clone(), message.clone()));
        Ok(())
    }

    async fn subscribe(&self) -> BridgeResult<mpsc::Receiver<MeshEvent>> {
        Ok(self.subscribers.subscribe())
    }
}

/// Loopback cloud chat service
pub struct LoopbackDelivery {
    subscribers: Subscribers<ChatEvent>,
    provisioned: Mutex<Vec<(PeerIdentity, String)>>,
    sent: Mutex<Vec<(ChannelHandle, String)>>,
    auto: bool,
    fail_sends: AtomicBool,
    reject_provisioning: AtomicBool,
}

impl LoopbackDelivery {
    /// Records commands only; joins and acknowledgements are injected by hand
    pub fn new(buffer: usize) -> Self {
        Self::build(buffer, false)
    }

    /// Answers every provisioning request with a join on a fresh channel and
    /// every send with an acknowledgement echoing the text
    pub fn auto(buffer: usize) -> Self {
        Self::build(buffer, true)
    }

    fn build(buffer: usize, auto: bool) -> Self {
        Self {
            subscribers: Subscribers::new(buffer),
            provisioned: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            auto,
            fail_sends: AtomicBool::new(false),
            reject_provisioning: AtomicBool::new(false),
        }
    }

    pub async fn emit(&self, event: ChatEvent) {
        self.subscribers.emit(event).await;
    }

    /// Confirm a channel for `identity`
    pub async fn join(&self, identity: impl Into<PeerIdentity>, channel: &ChannelHandle) {
        let identity = identity.into();
        self.emit(ChatEvent::Joined {
            channel: channel.clone(),
            display_name: identity.to_string(),
            identity,
        })
        .await;
    }

    /// Report a provisioning failure, optionally tagged with the identity
    pub async fn fail_join(&self, identity: Option<PeerIdentity>, reason: impl Into<String>) {
        self.emit(ChatEvent::JoinFailed {
            identity,
            reason: reason.into(),
        })
        .await;
    }

    /// Deliver a chat message posted on `channel` by `sender`
    pub async fn chat_message(
        &self,
        channel: &ChannelHandle,
        sender: impl Into<PeerIdentity>,
        text: impl Into<String>,
    ) {
        self.emit(ChatEvent::Received {
            channel: channel.clone(),
            message: Message::new(sender, text),
        })
        .await;
    }

    /// Every `(identity, display_name)` provisioning request, in order
    pub fn provisioned(&self) -> Vec<(PeerIdentity, String)> {
        lock(&self.provisioned).clone()
    }

    /// Every `(channel, text)` send, in order
    pub fn sent(&self) -> Vec<(ChannelHandle, String)> {
        lock(&self.sent).clone()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent provisioning requests fail at dispatch
    pub fn set_reject_provisioning(&self, reject: bool) {
        self.reject_provisioning.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageDelivery for LoopbackDelivery {
    async fn provision_channel(
        &self,
        identity: &PeerIdentity,
        display_name: &str,
    ) -> BridgeResult<()> {
        if self.reject_provisioning.load(Ordering::SeqCst) {
            return Err(BridgeError::Delivery("provisioning rejected".to_string()));
        }
        lock(&self.provisioned).push((identity.clone(), display_name.to_string()));

        if self.auto {
            let channel = ChannelHandle::new(
                format!("CH{}", Uuid::new_v4().simple()),
                identity.as_str(),
            );
            debug!(identity = %identity, channel = %channel, "Loopback auto-join");
            self.subscribers.emit_detached(ChatEvent::Joined {
                channel,
                identity: identity.clone(),
                display_name: display_name.to_string(),
            });
        }
        Ok(())
    }

    async fn send(&self, channel: &ChannelHandle, text: &str) -> BridgeResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BridgeError::Delivery(format!(
                "channel {} rejected the message",
                channel.sid()
            )));
        }
        lock(&self.sent).push((channel.clone(), text.to_string()));

        if self.auto {
            self.subscribers.emit_detached(ChatEvent::SendAcknowledged {
                response: text.to_string(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self) -> BridgeResult<mpsc::Receiver<ChatEvent>> {
        Ok(self.subscribers.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discovery_fans_out_to_subscribers() {
        let discovery = LoopbackDiscovery::new(4);
        let mut a = discovery.subscribe().await.unwrap();
        let mut b = discovery.subscribe().await.unwrap();

        let instance = discovery.peer_found("P1").await;
        for rx in [&mut a, &mut b] {
            assert_eq!(
                rx.recv().await,
                Some(MeshEvent::Found {
                    identity: PeerIdentity::new("P1"),
                    instance: instance.clone(),
                })
            );
        }
    }

    #[tokio::test]
    async fn test_discovery_send_failure() {
        let discovery = LoopbackDiscovery::new(4);
        let instance = PeerInstance::new();
        discovery.set_fail_sends(true);

        let result = discovery.send(&instance, &Message::new("x", "y")).await;
        assert!(matches!(result, Err(BridgeError::Discovery(_))));
        assert!(discovery.sent().is_empty());
    }

    #[tokio::test]
    async fn test_auto_delivery_joins_and_acks() {
        let delivery = LoopbackDelivery::auto(4);
        let mut events = delivery.subscribe().await.unwrap();

        delivery
            .provision_channel(&PeerIdentity::new("P1"), "P1")
            .await
            .unwrap();
        match events.recv().await {
            Some(ChatEvent::Joined {
                channel, identity, ..
            }) => {
                assert_eq!(identity.as_str(), "P1");
                assert_eq!(channel.unique_name(), "P1");
                assert!(channel.sid().starts_with("CH"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let channel = ChannelHandle::new("CH1", "P1");
        delivery.send(&channel, "hello").await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(ChatEvent::SendAcknowledged {
                response: "hello".into()
            })
        );
        assert_eq!(delivery.sent(), vec![(channel, "hello".to_string())]);
    }

    #[tokio::test]
    async fn test_manual_delivery_only_records() {
        let delivery = LoopbackDelivery::new(4);
        let mut events = delivery.subscribe().await.unwrap();

        delivery
            .provision_channel(&PeerIdentity::new("P1"), "P1")
            .await
            .unwrap();
        assert_eq!(delivery.provisioned().len(), 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_provisioning_is_not_recorded() {
        let delivery = LoopbackDelivery::new(4);
        delivery.set_reject_provisioning(true);
        let result = delivery
            .provision_channel(&PeerIdentity::new("P1"), "P1")
            .await;
        assert!(matches!(result, Err(BridgeError::Delivery(_))));
        assert!(delivery.provisioned().is_empty());
    }
}
