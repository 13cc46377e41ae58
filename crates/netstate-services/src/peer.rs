//! Peer table — the last advertisement seen from each remote registration.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;

/// Tracked state for one remote registration.
#[derive(Debug, Clone)]
pub struct PeerState {
    /// Service name the registration is advertised under.
    pub service_name: String,

    pub group_id: String,

    /// Member that owns the registration.
    pub member_id: String,

    /// Advertised state: the literal blob, or its 20-byte digest once the
    /// publisher's blob crossed the digest threshold.
    pub state: Bytes,

    /// Publisher's change counter.
    pub version: u64,

    /// Last time the advertisement was seen. Used for TTL expiry.
    pub last_seen: Instant,
}

impl PeerState {
    /// Registration id embedded in the service name.
    pub fn registration_id(&self) -> Option<&str> {
        self.service_name.split(' ').nth(1)
    }

    /// Whether (state, version) differs from what was last seen.
    pub fn differs_from(&self, state: &Bytes, version: u64) -> bool {
        self.version != version || &self.state != state
    }
}

/// The peer table, keyed on service name.
pub type PeerTable = Arc<DashMap<String, PeerState>>;

/// Create a new empty peer table.
pub fn new_peer_table() -> PeerTable {
    Arc::new(DashMap::new())
}
