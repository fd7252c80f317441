/*
   Mediator

   Owns the bridge state machine. A single task consumes MediatorCommands from
   one bounded queue fed by both event adapters and by MediatorHandle, and
   runs each command to completion (map mutation plus the collaborator call
   it implies) before taking the next.

    ┌──────────────────┐                       ┌──────────────────┐
    │  PeerDiscovery   │                       │ MessageDelivery  │
    └────────┬─────────┘                       └────────┬─────────┘
             │ MeshEvent                       ChatEvent │
    ┌────────▼─────────┐                       ┌────────▼─────────┐
    │ MeshEventAdapter │                       │ ChatEventAdapter │
    └────────┬─────────┘                       └────────┬─────────┘
             │            MediatorCommand               │
             └──────────────────┬───────────────────────┘
                                │   ◄── MediatorHandle (presentation)
                       ┌────────▼─────────┐
                       │     Mediator     │──► IdentityChannelMap
                       │   (actor loop)   │──► BridgeNotification broadcast
                       └──────────────────┘

   Per-identity lifecycle:

     Discovered ──provision──► Provisioning ──joined──► Bridged
         ▲                         │   │                  │
         └────────join failed──────┘   └──lost──► Lost ◄──┘ lost
                                                  │
                                        found ────┘ (re-bridged)

   Detached covers channels known before (or without) any instance.
*/

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::chat_adapter::ChatEventAdapter;
use super::collaborators::{MessageDeliveryService, PeerDiscoveryService};
use super::errors::{BridgeError, BridgeResult};
use super::events::{BridgeNotification, NotificationBroadcaster, SendTarget};
use super::identity_map::{IdentityChannelEntry, IdentityChannelMap, Retention};
use super::mesh_adapter::MeshEventAdapter;
use super::types::{BridgeState, ChannelHandle, JoinResult, Message, PeerIdentity, PeerInstance};
use crate::config::{LostPeerPolicy, MediatorConfig};
use crate::metrics;
use crate::shutdown::{ShutdownCoordinator, ShutdownSignal};

/// Commands processed by the mediator
#[derive(Debug)]
pub enum MediatorCommand {
    /// Ask the mesh collaborator to start browsing
    StartDiscovery,
    PeerFound {
        identity: PeerIdentity,
        instance: PeerInstance,
    },
    PeerLost {
        identity: PeerIdentity,
        instance: PeerInstance,
    },
    /// Text to route towards the identity's chat channel. `instance` is
    /// `None` for text typed on the bridging device itself.
    MeshPayload {
        identity: PeerIdentity,
        instance: Option<PeerInstance>,
        text: String,
    },
    MeshSendFailed {
        instance: PeerInstance,
        reason: String,
    },
    JoinResolved(JoinResult),
    SendAcknowledged {
        response: String,
    },
    ChatSendFailed {
        channel: ChannelHandle,
        reason: String,
    },
    ChatMessage {
        channel: ChannelHandle,
        message: Message,
    },
    /// Text from the presentation layer, sent as the local identity
    SendText {
        text: String,
    },
    /// Text from the presentation layer, straight to a known channel
    SendToChannel {
        channel: ChannelHandle,
        text: String,
    },
    Shutdown,
}

/// An outstanding channel request
#[derive(Debug)]
struct PendingProvision {
    /// Issue order, used to attribute untagged join failures
    seq: u64,
    requested_at: Instant,
    /// Latest payload waiting for the channel; earlier ones are superseded
    queued: Option<String>,
}

/// Handle to interact with a running mediator
#[derive(Clone)]
pub struct MediatorHandle {
    command_tx: mpsc::Sender<MediatorCommand>,
    map: Arc<IdentityChannelMap>,
    notifications: NotificationBroadcaster,
}

impl MediatorHandle {
    /// Subscribe to both collaborators, spawn the adapter pumps and the
    /// mediator task.
    ///
    /// The returned `JoinHandle` completes once the mediator and both pumps
    /// have stopped. Fails with `BridgeError::Config` if `config` does not
    /// validate.
    pub async fn spawn(
        config: &MediatorConfig,
        discovery: PeerDiscoveryService,
        delivery: MessageDeliveryService,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> BridgeResult<(Self, JoinHandle<()>)> {
        config.validate()?;

        let mesh_events = discovery.subscribe().await?;
        let chat_events = delivery.subscribe().await?;

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        let map = Arc::new(IdentityChannelMap::new());
        let notifications = NotificationBroadcaster::new(config.notification_capacity);

        let mesh_pump = tokio::spawn(MeshEventAdapter::new(command_tx.clone()).run(mesh_events));
        let chat_pump = tokio::spawn(ChatEventAdapter::new(command_tx.clone()).run(chat_events));

        let mediator = Mediator {
            local_identity: PeerIdentity::new(config.local_identity.clone()),
            config: config.clone(),
            map: map.clone(),
            discovery,
            delivery,
            notifications: notifications.clone(),
            pending: HashMap::new(),
            next_seq: 0,
            command_rx,
            shutdown_rx: shutdown.subscribe(),
            _shutdown: shutdown,
        };

        let task = tokio::spawn(async move {
            mediator.run().await;
            // Pumps notice the closed command queue and exit on their own
            let (mesh, chat) = tokio::join!(mesh_pump, chat_pump);
            for (pump, result) in [("mesh", mesh), ("chat", chat)] {
                if let Err(e) = result {
                    error!(pump, error = %e, "Event pump task failed");
                }
            }
        });

        Ok((
            MediatorHandle {
                command_tx,
                map,
                notifications,
            },
            task,
        ))
    }

    async fn send(&self, command: MediatorCommand) -> BridgeResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| BridgeError::MediatorClosed)
    }

    pub async fn start_discovery(&self) -> BridgeResult<()> {
        self.send(MediatorCommand::StartDiscovery).await
    }

    /// Send `text` from the bridging device's own chat identity. The first
    /// call provisions that identity's channel.
    pub async fn send_text(&self, text: impl Into<String>) -> BridgeResult<()> {
        self.send(MediatorCommand::SendText { text: text.into() })
            .await
    }

    pub async fn send_text_to_channel(
        &self,
        channel: ChannelHandle,
        text: impl Into<String>,
    ) -> BridgeResult<()> {
        self.send(MediatorCommand::SendToChannel {
            channel,
            text: text.into(),
        })
        .await
    }

    pub fn state_of(&self, identity: &PeerIdentity) -> Option<BridgeState> {
        self.map.state_of(identity)
    }

    pub fn instance_for(&self, identity: &PeerIdentity) -> Option<PeerInstance> {
        self.map.instance_for(identity)
    }

    pub fn channel_for(&self, identity: &PeerIdentity) -> Option<ChannelHandle> {
        self.map.channel_for(identity)
    }

    pub fn entry(&self, identity: &PeerIdentity) -> Option<IdentityChannelEntry> {
        self.map.entry(identity)
    }

    /// Every mapped identity, ordered by identity
    pub fn entries(&self) -> Vec<IdentityChannelEntry> {
        self.map.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeNotification> {
        self.notifications.subscribe()
    }

    /// True while the mediator task is accepting commands
    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// Stop the mediator. Commands queued ahead of this one still run;
    /// anything sent afterwards is rejected with `MediatorClosed`.
    pub async fn shutdown(&self) -> BridgeResult<()> {
        self.send(MediatorCommand::Shutdown).await
    }
}

struct Mediator {
    config: MediatorConfig,
    local_identity: PeerIdentity,
    map: Arc<IdentityChannelMap>,
    discovery: PeerDiscoveryService,
    delivery: MessageDeliveryService,
    notifications: NotificationBroadcaster,
    pending: HashMap<PeerIdentity, PendingProvision>,
    next_seq: u64,
    command_rx: mpsc::Receiver<MediatorCommand>,
    shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    // Keeps the shutdown sender alive for as long as we listen on it
    _shutdown: Arc<ShutdownCoordinator>,
}

impl Mediator {
    async fn run(mut self) {
        // The interval is only armed alongside a timeout
        let mut watchdog = self.config.provisioning_timeout.map(|_| {
            let mut interval = tokio::time::interval(self.config.watchdog_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        info!(
            local_identity = %self.local_identity,
            lost_peer_policy = %self.config.lost_peer_policy,
            watchdog = watchdog.is_some(),
            "Mediator started"
        );

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(MediatorCommand::Shutdown) | None => break,
                    Some(command) => {
                        self.handle_command(command).await;
                        self.record_gauges();
                    }
                },

                _ = next_tick(&mut watchdog) => {
                    self.expire_provisions();
                    self.record_gauges();
                }

                signal = self.shutdown_rx.recv() => {
                    info!(signal = ?signal, "Mediator received shutdown signal");
                    break;
                }
            }
        }

        self.teardown();
    }

    async fn handle_command(&mut self, command: MediatorCommand) {
        match command {
            MediatorCommand::StartDiscovery => {
                if let Err(e) = self.discovery.start_discovery().await {
                    warn!(error = %e, "Failed to start peer discovery");
                }
            }
            MediatorCommand::PeerFound { identity, instance } => {
                self.on_found(identity, instance).await;
            }
            MediatorCommand::PeerLost { identity, instance } => self.on_lost(identity, instance),
            MediatorCommand::MeshPayload {
                identity,
                instance,
                text,
            } => self.on_payload(identity, instance, text).await,
            MediatorCommand::MeshSendFailed { instance, reason } => {
                warn!(instance = %instance, reason = %reason, "Mesh send failed");
                metrics::send_failed("mesh");
                self.notifications.emit(BridgeNotification::SendFailed {
                    target: SendTarget::Instance(instance),
                    reason,
                });
            }
            MediatorCommand::JoinResolved(JoinResult::Joined {
                channel,
                identity,
                display_name,
            }) => self.on_joined(channel, identity, display_name).await,
            MediatorCommand::JoinResolved(JoinResult::Failed { identity, reason }) => {
                self.on_join_failed(identity, reason);
            }
            MediatorCommand::SendAcknowledged { response } => {
                self.notifications
                    .emit(BridgeNotification::MessageSent { response });
            }
            MediatorCommand::ChatSendFailed { channel, reason } => {
                warn!(channel = %channel, reason = %reason, "Chat send failed");
                metrics::send_failed("chat");
                self.notifications.emit(BridgeNotification::SendFailed {
                    target: SendTarget::Channel(channel),
                    reason,
                });
            }
            MediatorCommand::ChatMessage { channel, message } => {
                self.on_chat_message(channel, message).await;
            }
            MediatorCommand::SendText { text } => {
                let identity = self.local_identity.clone();
                self.on_payload(identity, None, text).await;
            }
            MediatorCommand::SendToChannel { channel, text } => {
                self.send_to_channel(&channel, &text).await;
            }
            // Consumed by the run loop
            MediatorCommand::Shutdown => {}
        }
    }

    async fn on_found(&mut self, identity: PeerIdentity, instance: PeerInstance) {
        let pending = self.pending.contains_key(&identity);
        let outcome = self.map.upsert(&identity, |entry| {
            let previous = entry.instance.replace(instance.clone());
            if previous.as_ref() == Some(&instance) {
                return (previous, false);
            }
            let needs_channel = if entry.channel.is_some() {
                entry.state = BridgeState::Bridged;
                false
            } else if pending {
                entry.state = BridgeState::Provisioning;
                false
            } else {
                entry.state = BridgeState::Discovered;
                true
            };
            (previous, needs_channel)
        });

        match outcome {
            (Some(previous), _) if previous == instance => {
                debug!(identity = %identity, "Duplicate found for current instance");
            }
            (Some(previous), needs_channel) => {
                info!(identity = %identity, previous = %previous, instance = %instance, "Peer instance replaced");
                if needs_channel {
                    self.provision(identity, None).await;
                }
            }
            (None, needs_channel) => {
                info!(identity = %identity, instance = %instance, "Peer found");
                if needs_channel {
                    self.provision(identity, None).await;
                }
            }
        }
    }

    fn on_lost(&mut self, identity: PeerIdentity, instance: PeerInstance) {
        let policy = self.config.lost_peer_policy;
        let pending = self.pending.contains_key(&identity);

        // None inside means the lost instance is not the current one
        let outcome = self.map.update_or_remove(&identity, |entry| {
            if entry.instance.as_ref() != Some(&instance) {
                return (None, Retention::Keep);
            }
            entry.instance = None;
            match policy {
                LostPeerPolicy::TearDown => (Some(Retention::Remove), Retention::Remove),
                LostPeerPolicy::RetainChannel if entry.channel.is_some() || pending => {
                    entry.state = BridgeState::Lost;
                    (Some(Retention::Keep), Retention::Keep)
                }
                LostPeerPolicy::RetainChannel => (Some(Retention::Remove), Retention::Remove),
            }
        });

        let Some(Some(retention)) = outcome else {
            debug!(identity = %identity, instance = %instance, "Ignoring loss of stale instance");
            metrics::stale_loss_ignored();
            return;
        };

        if policy == LostPeerPolicy::TearDown && self.pending.remove(&identity).is_some() {
            debug!(identity = %identity, "Abandoned pending provisioning");
        }

        info!(
            identity = %identity,
            retained = retention == Retention::Keep,
            "Peer lost"
        );
        self.notifications
            .emit(BridgeNotification::InstanceLost { identity });
    }

    async fn on_payload(&mut self, identity: PeerIdentity, instance: Option<PeerInstance>, text: String) {
        let pending = self.pending.contains_key(&identity);
        let channel = self.map.upsert(&identity, |entry| {
            if entry.instance.is_none() {
                entry.instance = instance;
            }
            if entry.instance.is_some() {
                if entry.channel.is_some() {
                    entry.state = BridgeState::Bridged;
                } else if pending {
                    entry.state = BridgeState::Provisioning;
                }
            }
            entry.channel.clone()
        });

        if let Some(channel) = channel {
            self.send_to_channel(&channel, &text).await;
        } else if let Some(provision) = self.pending.get_mut(&identity) {
            if provision.queued.replace(text).is_some() {
                debug!(identity = %identity, "Replaced queued payload");
            }
        } else {
            self.provision(identity, Some(text)).await;
        }
    }

    async fn on_joined(&mut self, channel: ChannelHandle, identity: PeerIdentity, display_name: String) {
        let provision = self.pending.remove(&identity);

        let shared_with = self
            .map
            .identities_for_channel(&channel)
            .into_iter()
            .filter(|entry| entry.identity != identity)
            .count();
        if shared_with > 0 {
            debug!(channel = %channel, shared_with, "Channel is shared with other identities");
        }

        let (replaced, state) = self.map.upsert(&identity, |entry| {
            let replaced = entry.channel.replace(channel.clone());
            entry.state = if entry.instance.is_some() {
                BridgeState::Bridged
            } else if entry.state == BridgeState::Lost {
                BridgeState::Lost
            } else {
                BridgeState::Detached
            };
            (replaced, entry.state)
        });

        if let Some(old) = replaced.filter(|old| *old != channel) {
            debug!(identity = %identity, old = %old, "Channel replaced");
        }
        info!(
            identity = %identity,
            channel = %channel,
            display_name = %display_name,
            state = %state,
            "Peer joined channel"
        );

        let queued = provision.and_then(|provision| {
            metrics::provisioning_duration(provision.requested_at.elapsed().as_secs_f64());
            provision.queued
        });

        self.notifications.emit(BridgeNotification::PeerJoinedChannel {
            channel: channel.clone(),
            identity,
        });

        if let Some(text) = queued {
            self.send_to_channel(&channel, &text).await;
        }
    }

    fn on_join_failed(&mut self, identity: Option<PeerIdentity>, reason: String) {
        let target = identity.or_else(|| self.oldest_pending());
        match target {
            Some(identity) if self.pending.contains_key(&identity) => {
                self.fail_provisioning(&identity, reason);
            }
            other => {
                warn!(identity = ?other, reason = %reason, "Join failed with no matching request");
                metrics::join_failed();
                self.notifications.emit(BridgeNotification::JoinFailed {
                    identity: other,
                    reason,
                });
            }
        }
    }

    async fn on_chat_message(&mut self, channel: ChannelHandle, mut message: Message) {
        let members = self.map.identities_for_channel(&channel);
        if members.is_empty() {
            warn!(channel_id = channel.sid(), "Chat message on unmapped channel, dropping");
            metrics::orphan_message();
            self.notifications.emit(BridgeNotification::OrphanChannel {
                channel_id: channel.sid().to_string(),
            });
            return;
        }

        if members.len() > 1 {
            debug!(channel = %channel, members = members.len(), "Fanning out shared channel message");
        }

        message.channel = Some(channel);
        self.notifications.emit(BridgeNotification::MessageReceived {
            message: message.clone(),
        });

        for entry in members {
            if entry.identity == message.sender {
                continue;
            }
            let Some(instance) = entry.instance else {
                debug!(identity = %entry.identity, "No live instance, message not forwarded");
                continue;
            };

            match self.discovery.send(&instance, &message).await {
                Ok(()) => metrics::message_forwarded("chat_to_mesh"),
                Err(e) => {
                    warn!(identity = %entry.identity, error = %e, "Forwarding to mesh failed");
                    metrics::send_failed("mesh");
                    self.notifications.emit(BridgeNotification::SendFailed {
                        target: SendTarget::Instance(instance),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    async fn provision(&mut self, identity: PeerIdentity, queued: Option<String>) {
        self.next_seq += 1;
        self.pending.insert(
            identity.clone(),
            PendingProvision {
                seq: self.next_seq,
                requested_at: Instant::now(),
                queued,
            },
        );
        self.map
            .upsert(&identity, |entry| entry.state = BridgeState::Provisioning);
        metrics::provision_requested();

        let display_name = self.display_name_for(&identity);
        info!(identity = %identity, display_name = %display_name, "Provisioning chat channel");

        if let Err(e) = self.delivery.provision_channel(&identity, &display_name).await {
            warn!(identity = %identity, error = %e, "Provisioning request rejected");
            self.fail_provisioning(&identity, e.to_string());
        }
    }

    /// Give up on `identity`'s outstanding request and notify
    fn fail_provisioning(&mut self, identity: &PeerIdentity, reason: String) {
        if let Some(provision) = self.pending.remove(identity) {
            if provision.queued.is_some() {
                debug!(identity = %identity, "Dropping queued payload");
            }
        }

        self.map.update_or_remove(identity, |entry| {
            if entry.instance.is_some() {
                entry.state = BridgeState::Discovered;
                ((), Retention::Keep)
            } else if entry.channel.is_some() {
                entry.state = BridgeState::Detached;
                ((), Retention::Keep)
            } else {
                ((), Retention::Remove)
            }
        });

        warn!(identity = %identity, reason = %reason, "Join failed");
        metrics::join_failed();
        self.notifications.emit(BridgeNotification::JoinFailed {
            identity: Some(identity.clone()),
            reason,
        });
    }

    fn expire_provisions(&mut self) {
        let Some(timeout) = self.config.provisioning_timeout else {
            return;
        };

        let mut expired: Vec<(u64, PeerIdentity)> = self
            .pending
            .iter()
            .filter(|(_, provision)| provision.requested_at.elapsed() >= timeout)
            .map(|(identity, provision)| (provision.seq, identity.clone()))
            .collect();
        expired.sort();

        for (_, identity) in expired {
            self.fail_provisioning(&identity, "provisioning timed out".to_string());
        }
    }

    async fn send_to_channel(&self, channel: &ChannelHandle, text: &str) {
        match self.delivery.send(channel, text).await {
            Ok(()) => {
                debug!(channel = %channel, "Message sent to chat");
                metrics::message_forwarded("mesh_to_chat");
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "Sending to chat failed");
                metrics::send_failed("chat");
                self.notifications.emit(BridgeNotification::SendFailed {
                    target: SendTarget::Channel(channel.clone()),
                    reason: e.to_string(),
                });
            }
        }
    }

    fn oldest_pending(&self) -> Option<PeerIdentity> {
        self.pending
            .iter()
            .min_by_key(|(_, provision)| provision.seq)
            .map(|(identity, _)| identity.clone())
    }

    fn display_name_for(&self, identity: &PeerIdentity) -> String {
        if *identity == self.local_identity {
            self.config.display_name.clone()
        } else {
            identity.to_string()
        }
    }

    fn record_gauges(&self) {
        metrics::set_mapped_identities(self.map.len());
        metrics::set_bridged_identities(self.map.count_in(BridgeState::Bridged));
        metrics::set_pending_provisions(self.pending.len());
    }

    fn teardown(&mut self) {
        let abandoned = self.pending.len();
        self.pending.clear();
        let cleared = self.map.clear();
        self.record_gauges();
        info!(cleared, abandoned, "Mediator stopped");
    }
}

/// Tick `watchdog`, or never complete when it is disarmed
async fn next_tick(watchdog: &mut Option<Interval>) {
    match watchdog {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::loopback::{LoopbackDelivery, LoopbackDiscovery};
    use crate::test_utils::{eventually, next_notification};
    use std::time::Duration;

    async fn spawn_with(
        config: MediatorConfig,
    ) -> (MediatorHandle, Arc<LoopbackDiscovery>, Arc<LoopbackDelivery>, JoinHandle<()>) {
        let discovery = Arc::new(LoopbackDiscovery::new(16));
        let delivery = Arc::new(LoopbackDelivery::new(16));
        let (handle, task) = MediatorHandle::spawn(
            &config,
            discovery.clone(),
            delivery.clone(),
            Arc::new(ShutdownCoordinator::default()),
        )
        .await
        .unwrap();
        (handle, discovery, delivery, task)
    }

    #[tokio::test]
    async fn test_send_text_provisions_local_channel_with_display_name() {
        let config = MediatorConfig {
            local_identity: "me".into(),
            display_name: "My Device".into(),
            ..MediatorConfig::default()
        };
        let (handle, _discovery, delivery, _task) = spawn_with(config).await;

        handle.send_text("hi").await.unwrap();
        eventually(|| delivery.provisioned().len() == 1).await;

        let (identity, display_name) = delivery.provisioned()[0].clone();
        assert_eq!(identity.as_str(), "me");
        assert_eq!(display_name, "My Device");
        assert_eq!(handle.state_of(&identity), Some(BridgeState::Provisioning));
        assert_eq!(handle.instance_for(&identity), None);
    }

    #[tokio::test]
    async fn test_untagged_join_failure_hits_oldest_request() {
        let (handle, discovery, delivery, _task) = spawn_with(MediatorConfig::default()).await;
        let mut notes = handle.subscribe();

        discovery.peer_found("P1").await;
        discovery.peer_found("P2").await;
        eventually(|| delivery.provisioned().len() == 2).await;

        delivery
            .emit(crate::bridge::ChatEvent::JoinFailed {
                identity: None,
                reason: "quota".into(),
            })
            .await;

        let note = next_notification(&mut notes).await;
        assert_eq!(
            note,
            BridgeNotification::JoinFailed {
                identity: Some(PeerIdentity::new("P1")),
                reason: "quota".into(),
            }
        );
        assert_eq!(handle.state_of(&PeerIdentity::new("P1")), Some(BridgeState::Discovered));
        assert_eq!(handle.state_of(&PeerIdentity::new("P2")), Some(BridgeState::Provisioning));
    }

    #[tokio::test]
    async fn test_shutdown_clears_map_and_stops_task() {
        let (handle, discovery, delivery, task) = spawn_with(MediatorConfig::default()).await;

        discovery.peer_found("P1").await;
        eventually(|| delivery.provisioned().len() == 1).await;
        assert_eq!(handle.entries().len(), 1);

        handle.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        assert!(handle.entries().is_empty());
        assert!(!handle.is_running());
        assert!(matches!(
            handle.send_text("late").await,
            Err(BridgeError::MediatorClosed)
        ));
    }

    #[tokio::test]
    async fn test_zero_watchdog_interval_without_timeout_runs() {
        let config = MediatorConfig {
            watchdog_interval: Duration::ZERO,
            provisioning_timeout: None,
            ..MediatorConfig::default()
        };
        let (handle, discovery, delivery, task) = spawn_with(config).await;

        discovery.peer_found("P1").await;
        eventually(|| delivery.provisioned().len() == 1).await;

        assert!(handle.is_running());
        assert!(!task.is_finished());
        assert_eq!(
            handle.state_of(&PeerIdentity::new("P1")),
            Some(BridgeState::Provisioning)
        );
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_config() {
        for config in [
            MediatorConfig {
                command_buffer: 0,
                ..MediatorConfig::default()
            },
            MediatorConfig {
                notification_capacity: 0,
                ..MediatorConfig::default()
            },
            MediatorConfig {
                provisioning_timeout: Some(Duration::from_secs(5)),
                watchdog_interval: Duration::ZERO,
                ..MediatorConfig::default()
            },
        ] {
            let result = MediatorHandle::spawn(
                &config,
                Arc::new(LoopbackDiscovery::new(4)),
                Arc::new(LoopbackDelivery::new(4)),
                Arc::new(ShutdownCoordinator::default()),
            )
            .await;
            assert!(matches!(result, Err(BridgeError::Config(_))));
        }
    }

    #[tokio::test]
    async fn test_commands_queued_before_shutdown_still_run() {
        let (handle, discovery, delivery, task) = spawn_with(MediatorConfig::default()).await;
        let channel = ChannelHandle::new("CH1", "peer-1");

        handle.send_text_to_channel(channel.clone(), "first").await.unwrap();
        handle.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(delivery.sent(), vec![(channel, "first".to_string())]);
        assert!(discovery.sent().is_empty());
    }

    #[tokio::test]
    async fn test_coordinator_signal_stops_mediator() {
        let discovery = Arc::new(LoopbackDiscovery::new(4));
        let delivery = Arc::new(LoopbackDelivery::new(4));
        let coordinator = Arc::new(ShutdownCoordinator::default());
        let (handle, task) = MediatorHandle::spawn(
            &MediatorConfig::default(),
            discovery,
            delivery,
            coordinator.clone(),
        )
        .await
        .unwrap();

        coordinator.shutdown().await;
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!handle.is_running());
    }
}
