//! Advertisement transport — the seam between registrations and whatever
//! carries their advertisements to peers.
//!
//! Registrations hand encoded records to an [`Advertiser`]; listeners
//! consume [`DiscoveryEvent`]s from the same transport. The daemon plugs in
//! IPv6 multicast; tests and dry runs use [`LoopbackTransport`].

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;

use netstate_core::wire::{SERVICE_DOMAIN, SERVICE_TYPE};
use netstate_core::{Registration, TxtError};

/// One advertised service: identity plus record bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub service_type: String,
    pub domain: String,
    pub service_name: String,
    pub record: Bytes,
}

impl Advertisement {
    /// The advertisement describing a registration's current state.
    pub fn for_registration(registration: &Registration) -> Result<Self, TxtError> {
        Ok(Self {
            service_type: SERVICE_TYPE.to_string(),
            domain: SERVICE_DOMAIN.to_string(),
            service_name: registration.service_name(),
            record: Bytes::from(registration.encode_record()?),
        })
    }
}

/// What a listener learns from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// An advertisement appeared or its record changed.
    Found(Advertisement),
    /// The named advertisement was withdrawn.
    Removed(String),
}

/// Publishes advertisements on behalf of registrations.
///
/// Implementations must tolerate `publish` being called repeatedly for the
/// same service name (each call replaces the previous record) and
/// `withdraw` for names that were never published.
pub trait Advertiser: Send + Sync {
    fn publish(&self, advertisement: &Advertisement) -> Result<()>;

    fn withdraw(&self, service_name: &str) -> Result<()>;
}

// ── Loopback ──────────────────────────────────────────────────────────────────

/// Number of undelivered events a slow subscriber may fall behind by.
const LOOPBACK_CAPACITY: usize = 256;

/// In-process transport: every publish is delivered to every subscriber.
///
/// Cloning shares the same bus.
#[derive(Clone)]
pub struct LoopbackTransport {
    events: broadcast::Sender<DiscoveryEvent>,
    live: Arc<DashMap<String, Advertisement>>,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(LOOPBACK_CAPACITY);
        Self {
            events,
            live: Arc::new(DashMap::new()),
        }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    /// Advertisements currently live on the bus, as `Found` events, so a
    /// late subscriber can catch up.
    pub fn snapshot(&self) -> Vec<DiscoveryEvent> {
        self.live
            .iter()
            .map(|entry| DiscoveryEvent::Found(entry.value().clone()))
            .collect()
    }

    /// Number of live advertisements.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn send(&self, event: DiscoveryEvent) {
        // No subscribers is fine; the event is simply not observed.
        if self.events.send(event).is_err() {
            tracing::trace!("loopback event dropped, no subscribers");
        }
    }
}

impl Advertiser for LoopbackTransport {
    fn publish(&self, advertisement: &Advertisement) -> Result<()> {
        self.live
            .insert(advertisement.service_name.clone(), advertisement.clone());
        self.send(DiscoveryEvent::Found(advertisement.clone()));
        Ok(())
    }

    fn withdraw(&self, service_name: &str) -> Result<()> {
        if self.live.remove(service_name).is_some() {
            self.send(DiscoveryEvent::Removed(service_name.to_string()));
        }
        Ok(())
    }
}
