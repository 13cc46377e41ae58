//! Hashing and identifier generation for NetState.
//!
//! Two hash functions, for two different jobs:
//!   1. SHA-1 — the state digest substituted for oversize state blobs.
//!      Fixed at 20 bytes so existing peers can compare digests.
//!   2. BLAKE3 — the group tag that prefixes every service name.
//!
//! Neither is used for authentication.

use rand::RngCore;
use sha1::{Digest, Sha1};

/// Length of the digest advertised in place of an oversize state blob.
pub const STATE_DIGEST_LEN: usize = 20;

/// Bytes of BLAKE3 output kept in a group tag (hex-encoded to twice this).
const GROUP_TAG_BYTES: usize = 8;

/// Length of a group tag in a service name.
pub const GROUP_TAG_LEN: usize = GROUP_TAG_BYTES * 2;

/// Length of a registration identifier.
pub const REGISTRATION_ID_LEN: usize = 16;

/// SHA-1 of a state blob.
pub fn state_digest(state: &[u8]) -> [u8; STATE_DIGEST_LEN] {
    let mut digest = [0u8; STATE_DIGEST_LEN];
    digest.copy_from_slice(&Sha1::digest(state));
    digest
}

/// Service-name prefix identifying a group.
///
/// Derived from the group identifier so that arbitrarily long identifiers
/// still fit in a DNS label, and so that one group's tag is never a prefix
/// of another's.
pub fn group_tag(group_id: &str) -> String {
    let hash = blake3::hash(group_id.as_bytes());
    hex::encode(&hash.as_bytes()[..GROUP_TAG_BYTES])
}

/// Generate a registration identifier: 8 random bytes, lowercase hex.
pub fn generate_registration_id() -> String {
    let mut id = [0u8; REGISTRATION_ID_LEN / 2];
    rand::thread_rng().fill_bytes(&mut id);
    hex::encode(id)
}

/// Generate a member identifier for a process that was not configured with one.
pub fn generate_member_id() -> String {
    let mut id = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut id);
    hex::encode(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_digest_matches_known_vector() {
        // SHA-1("abc")
        assert_eq!(
            hex::encode(state_digest(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn group_tags_are_deterministic_and_fixed_width() {
        let a = group_tag("group-A");
        assert_eq!(a, group_tag("group-A"));
        assert_ne!(a, group_tag("group-B"));
        assert_eq!(a.len(), GROUP_TAG_LEN);
        assert_eq!(group_tag(&"x".repeat(500)).len(), GROUP_TAG_LEN);
    }

    #[test]
    fn registration_ids_are_unique_hex() {
        let a = generate_registration_id();
        let b = generate_registration_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), REGISTRATION_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
