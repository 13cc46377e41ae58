//! Link-local multicast transport for NetState advertisements.
//!
//! `broadcast` publishes this process's registrations; `listener` receives
//! everyone's (ours included) and feeds the notifiers.

pub mod broadcast;
pub mod listener;

pub use broadcast::{broadcast_loop, if_index, MulticastAdvertiser};
pub use listener::{expiry_loop, listener_loop};
