//! State notifier — turns discovery events into state changes for one group.
//!
//! Every advertisement carries its publisher's member id. A notifier
//! created with the same member id as a registration ignores that
//! registration's advertisements: the local process caused the change, so
//! reacting to it would only feed the change back into itself.
//!
//! Filtering happens in this order, cheapest first:
//!   1. service type and group tag in the service name
//!   2. record decode
//!   3. group id in the record
//!   4. member id in the record (echo suppression)

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use bytes::Bytes;
use tokio::sync::broadcast;

use netstate_core::wire::SERVICE_TYPE;
use netstate_core::{matches_group, AdvertisedRecord};

use crate::peer::{new_peer_table, PeerState, PeerTable};
use crate::transport::{Advertisement, DiscoveryEvent};

/// Receives state changes from a notifier.
///
/// Called synchronously from whatever task feeds the notifier, with no
/// locks held.
pub trait StateObserver: Send + Sync {
    /// A peer appeared, or its state or version changed.
    fn state_changed(&self, peer: &PeerState);

    /// A peer withdrew its advertisement or expired.
    fn peer_removed(&self, peer: &PeerState);
}

/// What the notifier did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// New or changed state, passed to the observer.
    Delivered,
    /// Re-announcement of state already seen.
    Unchanged,
    /// Our own advertisement, dropped.
    Echo,
    /// Different service type or group, dropped.
    ForeignGroup,
    /// Record could not be decoded, dropped.
    Malformed,
    /// Known peer removed, observer told.
    Removed,
    /// Removal for a peer we never saw.
    Unknown,
}

/// Tracks the peers of one group on behalf of one member.
pub struct NetStateNotifier {
    group_id: String,
    member_id: String,
    peers: PeerTable,
    observer: Arc<dyn StateObserver>,
}

impl NetStateNotifier {
    pub fn new(
        group_id: impl Into<String>,
        member_id: impl Into<String>,
        observer: Arc<dyn StateObserver>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            member_id: member_id.into(),
            peers: new_peer_table(),
            observer,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    /// Peers currently known, keyed on service name.
    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Apply one discovery event.
    pub fn handle_event(&self, event: &DiscoveryEvent) -> Disposition {
        match event {
            DiscoveryEvent::Found(advertisement) => self.handle_found(advertisement),
            DiscoveryEvent::Removed(service_name) => self.handle_removed(service_name),
        }
    }

    fn handle_found(&self, advertisement: &Advertisement) -> Disposition {
        let service_name = advertisement.service_name.as_str();

        if advertisement.service_type != SERVICE_TYPE || !matches_group(service_name, &self.group_id) {
            return Disposition::ForeignGroup;
        }

        let record = match AdvertisedRecord::decode(&advertisement.record) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(service = service_name, error = %e, "discarding malformed record");
                return Disposition::Malformed;
            }
        };

        if record.group_id != self.group_id {
            // Group tag collision; the record is authoritative.
            tracing::debug!(service = service_name, group = %record.group_id, "group mismatch");
            return Disposition::ForeignGroup;
        }

        if record.member_id == self.member_id {
            tracing::trace!(service = service_name, "ignoring own advertisement");
            return Disposition::Echo;
        }

        let changed = self.upsert(service_name, record);
        match changed {
            Some(peer) => {
                tracing::debug!(
                    service = service_name,
                    member = %peer.member_id,
                    version = peer.version,
                    "peer state changed"
                );
                self.observer.state_changed(&peer);
                Disposition::Delivered
            }
            None => Disposition::Unchanged,
        }
    }

    /// Insert or refresh a peer. Returns a snapshot if the observer should
    /// hear about it.
    fn upsert(&self, service_name: &str, record: AdvertisedRecord) -> Option<PeerState> {
        let now = Instant::now();

        if let Some(mut existing) = self.peers.get_mut(service_name) {
            existing.last_seen = now;
            if !existing.differs_from(&record.state, record.version) {
                return None;
            }
            existing.state = record.state;
            existing.version = record.version;
            existing.member_id = record.member_id;
            return Some(existing.clone());
        }

        let peer = PeerState {
            service_name: service_name.to_string(),
            group_id: record.group_id,
            member_id: record.member_id,
            state: record.state,
            version: record.version,
            last_seen: now,
        };
        self.peers.insert(service_name.to_string(), peer.clone());
        Some(peer)
    }

    fn handle_removed(&self, service_name: &str) -> Disposition {
        match self.peers.remove(service_name) {
            Some((_, peer)) => {
                tracing::debug!(service = service_name, member = %peer.member_id, "peer removed");
                self.observer.peer_removed(&peer);
                Disposition::Removed
            }
            None => Disposition::Unknown,
        }
    }

    /// Drop peers not refreshed within `ttl`. Returns how many were removed.
    pub fn expire(&self, ttl: Duration) -> usize {
        let stale: Vec<String> = self
            .peers
            .iter()
            .filter(|entry| entry.last_seen.elapsed() >= ttl)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for service_name in stale {
            // Re-check under the entry lock; a refresh may have raced us.
            if let Some((_, peer)) = self
                .peers
                .remove_if(&service_name, |_, peer| peer.last_seen.elapsed() >= ttl)
            {
                self.observer.peer_removed(&peer);
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(group = %self.group_id, removed, "expired peer entries");
        }
        removed
    }

    /// The (state, version) last seen for a service, if any.
    pub fn state_of(&self, service_name: &str) -> Option<(Bytes, u64)> {
        self.peers
            .get(service_name)
            .map(|peer| (peer.state.clone(), peer.version))
    }

    /// Feed events from a broadcast receiver until the sender goes away.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<DiscoveryEvent>) -> Result<()> {
        loop {
            match events.recv().await {
                Ok(event) => {
                    self.handle_event(&event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(group = %self.group_id, skipped, "notifier fell behind, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!(group = %self.group_id, "discovery channel closed");
                    return Ok(());
                }
            }
        }
    }
}
