//! netstate-core — identity, record format, and datagram framing.
//! All other NetState crates depend on this one.

pub mod config;
pub mod crypto;
pub mod record;
pub mod registration;
pub mod wire;

pub use record::{decode_record, encode_record, TxtError, TxtRecord, TxtValue};
pub use registration::{
    matches_group, AdvertisedRecord, AdvertisedState, Registration, RegistrationError,
    STATE_DIGEST_THRESHOLD,
};
