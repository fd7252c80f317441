//! IdentityChannelMap - which instance and which channel belong to an identity
//!
//! One entry per `PeerIdentity`, holding at most one instance reference and at
//! most one channel reference. Both halves live behind a single lock so a
//! reader always sees a whole entry, never one half from before a write and
//! the other from after it.
//!
//! The mediator is the only writer. Everyone else reads through
//! `MediatorHandle`, which hands out clones.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::types::{BridgeState, ChannelHandle, PeerIdentity, PeerInstance};

/// A single identity's pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityChannelEntry {
    pub identity: PeerIdentity,
    pub instance: Option<PeerInstance>,
    pub channel: Option<ChannelHandle>,
    /// Maintained by the mediator. `set_instance`/`set_channel` only seed it
    /// when they create the entry.
    pub state: BridgeState,
}

impl IdentityChannelEntry {
    fn new(identity: PeerIdentity, state: BridgeState) -> Self {
        Self {
            identity,
            instance: None,
            channel: None,
            state,
        }
    }
}

/// Whether `update_or_remove` keeps the entry it just modified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Keep,
    Remove,
}

/// Concurrent identity → (instance, channel) store
#[derive(Debug, Default)]
pub struct IdentityChannelMap {
    entries: RwLock<HashMap<PeerIdentity, IdentityChannelEntry>>,
}

impl IdentityChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section below is a plain HashMap operation, so a
    // poisoned lock still guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<PeerIdentity, IdentityChannelEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PeerIdentity, IdentityChannelEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Associate `instance` with `identity`, returning the reference it replaced
    pub fn set_instance(
        &self,
        identity: &PeerIdentity,
        instance: PeerInstance,
    ) -> Option<PeerInstance> {
        self.write()
            .entry(identity.clone())
            .or_insert_with(|| IdentityChannelEntry::new(identity.clone(), BridgeState::Discovered))
            .instance
            .replace(instance)
    }

    /// Associate `channel` with `identity`, returning the handle it replaced
    pub fn set_channel(
        &self,
        identity: &PeerIdentity,
        channel: ChannelHandle,
    ) -> Option<ChannelHandle> {
        self.write()
            .entry(identity.clone())
            .or_insert_with(|| IdentityChannelEntry::new(identity.clone(), BridgeState::Detached))
            .channel
            .replace(channel)
    }

    pub fn instance_for(&self, identity: &PeerIdentity) -> Option<PeerInstance> {
        self.read().get(identity).and_then(|entry| entry.instance.clone())
    }

    pub fn channel_for(&self, identity: &PeerIdentity) -> Option<ChannelHandle> {
        self.read().get(identity).and_then(|entry| entry.channel.clone())
    }

    pub fn state_of(&self, identity: &PeerIdentity) -> Option<BridgeState> {
        self.read().get(identity).map(|entry| entry.state)
    }

    /// Snapshot of the whole entry
    pub fn entry(&self, identity: &PeerIdentity) -> Option<IdentityChannelEntry> {
        self.read().get(identity).cloned()
    }

    pub fn remove(&self, identity: &PeerIdentity) -> Option<IdentityChannelEntry> {
        self.write().remove(identity)
    }

    /// Mutate an existing entry and drop it in the same critical section if
    /// `f` asks for it
    pub fn update_or_remove<R>(
        &self,
        identity: &PeerIdentity,
        f: impl FnOnce(&mut IdentityChannelEntry) -> (R, Retention),
    ) -> Option<R> {
        let mut entries = self.write();
        let (result, retention) = f(entries.get_mut(identity)?);
        if retention == Retention::Remove {
            entries.remove(identity);
        }
        Some(result)
    }

    /// Mutate the entry for `identity`, creating a `Discovered` one first if needed
    pub fn upsert<R>(
        &self,
        identity: &PeerIdentity,
        f: impl FnOnce(&mut IdentityChannelEntry) -> R,
    ) -> R {
        let mut entries = self.write();
        let entry = entries
            .entry(identity.clone())
            .or_insert_with(|| IdentityChannelEntry::new(identity.clone(), BridgeState::Discovered));
        f(entry)
    }

    /// Every entry currently mapped to `channel`, ordered by identity.
    ///
    /// More than one result means the channel is shared (group chat).
    pub fn identities_for_channel(&self, channel: &ChannelHandle) -> Vec<IdentityChannelEntry> {
        let mut matches: Vec<_> = self
            .read()
            .values()
            .filter(|entry| entry.channel.as_ref() == Some(channel))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.identity.cmp(&b.identity));
        matches
    }

    /// All entries, ordered by identity
    pub fn snapshot(&self) -> Vec<IdentityChannelEntry> {
        let mut entries: Vec<_> = self.read().values().cloned().collect();
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));
        entries
    }

    /// Number of identities with a given state
    pub fn count_in(&self, state: BridgeState) -> usize {
        self.read().values().filter(|entry| entry.state == state).count()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every entry, returning how many there were
    pub fn clear(&self) -> usize {
        let mut entries = self.write();
        let count = entries.len();
        entries.clear();
        count
    }
}
