//! Logs peer state changes. The daemon has no other consumer of them.

use netstate_services::{PeerState, StateObserver};

/// States at most this long are logged in full.
const MAX_LOGGED_STATE: usize = 32;

pub struct LoggingObserver;

impl StateObserver for LoggingObserver {
    fn state_changed(&self, peer: &PeerState) {
        tracing::info!(
            group = %peer.group_id,
            member = %peer.member_id,
            registration = peer.registration_id().unwrap_or("?"),
            version = peer.version,
            state = %describe_state(&peer.state),
            "peer state"
        );
    }

    fn peer_removed(&self, peer: &PeerState) {
        tracing::info!(
            group = %peer.group_id,
            member = %peer.member_id,
            registration = peer.registration_id().unwrap_or("?"),
            "peer gone"
        );
    }
}

fn describe_state(state: &[u8]) -> String {
    if state.len() > MAX_LOGGED_STATE {
        return format!("{} bytes", state.len());
    }
    match std::str::from_utf8(state) {
        Ok(text) => format!("{text:?}"),
        Err(_) => hex::encode(state),
    }
}
