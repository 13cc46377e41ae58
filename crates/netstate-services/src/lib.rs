//! netstate-services — publishing registrations and observing peers.
//!
//! The transport is abstract here: anything implementing [`Advertiser`]
//! can carry advertisements, and anything producing [`DiscoveryEvent`]s can
//! feed a [`NetStateNotifier`].

pub mod notifier;
pub mod peer;
pub mod publisher;
pub mod transport;

pub use notifier::{Disposition, NetStateNotifier, StateObserver};
pub use peer::{new_peer_table, PeerState, PeerTable};
pub use publisher::NetStateRegistration;
pub use transport::{Advertisement, Advertiser, DiscoveryEvent, LoopbackTransport};
