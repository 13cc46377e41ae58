//! NetState integration test harness.
//!
//! Tests in this crate run several members in one process, connected by
//! the in-process loopback transport. Each member owns its registrations
//! and one notifier per group it watches, exactly as the daemon does; only
//! the wire is simulated.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use bytes::Bytes;
use tokio::sync::broadcast::error::TryRecvError;

use netstate_services::{
    Disposition, DiscoveryEvent, LoopbackTransport, NetStateNotifier, NetStateRegistration,
    PeerState, StateObserver,
};

mod groups;
mod lifecycle;
mod state_sharing;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Everything an observer was told, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Changed { member: String, state: Bytes, version: u64 },
    Removed { member: String },
}

#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<Seen>>,
}

impl Recorder {
    pub fn take(&self) -> Vec<Seen> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }
}

impl StateObserver for Recorder {
    fn state_changed(&self, peer: &PeerState) {
        self.seen.lock().unwrap().push(Seen::Changed {
            member: peer.member_id.clone(),
            state: peer.state.clone(),
            version: peer.version,
        });
    }

    fn peer_removed(&self, peer: &PeerState) {
        self.seen.lock().unwrap().push(Seen::Removed {
            member: peer.member_id.clone(),
        });
    }
}

/// One simulated participant watching one group.
pub struct Member {
    pub id: String,
    pub transport: LoopbackTransport,
    pub notifier: NetStateNotifier,
    pub recorder: Arc<Recorder>,
    events: tokio::sync::broadcast::Receiver<DiscoveryEvent>,
}

impl Member {
    /// Join `group` on `transport`, catching up on what is already live.
    pub fn join(transport: &LoopbackTransport, id: &str, group: &str) -> Self {
        let recorder = Arc::new(Recorder::default());
        let notifier = NetStateNotifier::new(group, id, recorder.clone());
        let events = transport.subscribe();
        for event in transport.snapshot() {
            notifier.handle_event(&event);
        }
        Self {
            id: id.to_string(),
            transport: transport.clone(),
            notifier,
            recorder,
            events,
        }
    }

    /// Publish a registration as this member.
    pub fn register(&self, group: &str, name: &str, state: &'static [u8]) -> Result<NetStateRegistration> {
        NetStateRegistration::create(
            Arc::new(self.transport.clone()),
            group,
            self.id.as_str(),
            name,
            Bytes::from_static(state),
        )
    }

    /// Apply every pending event; return what the notifier did with each.
    pub fn pump(&mut self) -> Vec<Disposition> {
        let mut out = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => out.push(self.notifier.handle_event(&event)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return out,
                Err(TryRecvError::Lagged(n)) => panic!("member {} lagged by {n}", self.id),
            }
        }
    }
}
