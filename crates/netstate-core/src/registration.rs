//! Registration identity, state digest policy, and service naming.
//!
//! A registration publishes the state of one local resource to a peer
//! group. It is identified by:
//!   - a registration id, unique to this instance, generated at creation
//!   - a group id, naming the peers interested in the resource
//!   - a member id, naming the participant that owns the registration
//!   - a name, for debugging only
//!
//! This type only holds identity and state and knows how to describe
//! itself as a service name plus record. Publishing is done by
//! `netstate_services::NetStateRegistration`.

use bytes::Bytes;

use crate::crypto::{self, STATE_DIGEST_LEN};
use crate::record::{
    self, TxtError, TxtRecord, TxtValue, GROUP_IDENTIFIER_KEY, MAX_VALUE_LEN,
    MEMBER_IDENTIFIER_KEY, STATE_KEY, VERSION_KEY,
};
use crate::wire::MAX_SERVICE_NAME_LEN;

/// State blobs at or above this size are advertised as their SHA-1 digest.
pub const STATE_DIGEST_THRESHOLD: usize = 200;

/// Separates the components of a service name.
const NAME_SEPARATOR: char = ' ';

// ── Advertised state ──────────────────────────────────────────────────────────

/// The state value as it goes on the wire.
///
/// Once a blob crosses the threshold, receivers see only its digest:
/// two oversize blobs with the same SHA-1 are indistinguishable downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertisedState {
    Literal(Bytes),
    Digest([u8; STATE_DIGEST_LEN]),
}

impl AdvertisedState {
    /// Apply the digest policy to a state blob.
    pub fn for_state(state: &Bytes) -> Self {
        if state.len() >= STATE_DIGEST_THRESHOLD {
            AdvertisedState::Digest(crypto::state_digest(state))
        } else {
            AdvertisedState::Literal(state.clone())
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AdvertisedState::Literal(b) => b,
            AdvertisedState::Digest(d) => d,
        }
    }

    pub fn is_digest(&self) -> bool {
        matches!(self, AdvertisedState::Digest(_))
    }
}

// ── Registration ──────────────────────────────────────────────────────────────

/// Identity and current state of one published resource.
///
/// Only the state changes after creation. Mutation takes `&mut self`, so a
/// registration shared between threads needs a lock around it.
#[derive(Debug, Clone)]
pub struct Registration {
    registration_id: String,
    group_id: String,
    member_id: String,
    name: String,
    state: Bytes,
    version: u64,
    invalidated: bool,
}

impl Registration {
    /// Create a registration with a fresh registration id.
    ///
    /// Fails if any identity field is empty, or if the group or member id
    /// cannot fit in a record value.
    pub fn new(
        group_id: impl Into<String>,
        member_id: impl Into<String>,
        name: impl Into<String>,
        state: impl Into<Bytes>,
    ) -> Result<Self, RegistrationError> {
        let group_id = group_id.into();
        let member_id = member_id.into();
        let name = name.into();

        validate_identifier("group_id", &group_id)?;
        validate_identifier("member_id", &member_id)?;
        if name.is_empty() {
            return Err(RegistrationError::EmptyField("name"));
        }

        Ok(Self {
            registration_id: crypto::generate_registration_id(),
            group_id,
            member_id,
            name,
            state: state.into(),
            version: 0,
            invalidated: false,
        })
    }

    pub fn registration_id(&self) -> &str {
        &self.registration_id
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &Bytes {
        &self.state
    }

    /// Number of state changes since creation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Replace the state and bump the version.
    pub fn set_state(&mut self, state: impl Into<Bytes>) -> Result<(), RegistrationError> {
        if self.invalidated {
            return Err(RegistrationError::Invalidated);
        }
        self.state = state.into();
        self.version += 1;
        Ok(())
    }

    /// Mark the registration dead. Returns false if it already was.
    pub fn invalidate(&mut self) -> bool {
        !std::mem::replace(&mut self.invalidated, true)
    }

    /// The state value to advertise, after the digest policy.
    pub fn advertised_state(&self) -> AdvertisedState {
        AdvertisedState::for_state(&self.state)
    }

    /// `"<group-tag> <registration-id> <name>"`, cut to one DNS label.
    ///
    /// Only the name can be truncated; tag and id always fit.
    pub fn service_name(&self) -> String {
        let mut service_name = format!(
            "{}{NAME_SEPARATOR}{}{NAME_SEPARATOR}{}",
            crypto::group_tag(&self.group_id),
            self.registration_id,
            self.name
        );
        truncate_on_char_boundary(&mut service_name, MAX_SERVICE_NAME_LEN);
        service_name
    }

    /// The record advertised for the current state.
    pub fn txt_record(&self) -> TxtRecord {
        let mut record = TxtRecord::new();
        record.insert(GROUP_IDENTIFIER_KEY.into(), self.group_id.as_str().into());
        record.insert(MEMBER_IDENTIFIER_KEY.into(), self.member_id.as_str().into());
        record.insert(
            STATE_KEY.into(),
            TxtValue::Data(self.advertised_state().as_bytes().to_vec()),
        );
        record.insert(VERSION_KEY.into(), self.version.into());
        record
    }

    /// The encoded record, in the untagged form advertisements use.
    pub fn encode_record(&self) -> Result<Vec<u8>, TxtError> {
        record::encode_record(&self.txt_record(), false)
    }
}

/// Whether a service name was advertised under `group_id`.
pub fn matches_group(service_name: &str, group_id: &str) -> bool {
    service_name
        .strip_prefix(crypto::group_tag(group_id).as_str())
        .is_some_and(|rest| rest.starts_with(NAME_SEPARATOR))
}

fn validate_identifier(field: &'static str, value: &str) -> Result<(), RegistrationError> {
    if value.is_empty() {
        return Err(RegistrationError::EmptyField(field));
    }
    if value.len() > MAX_VALUE_LEN {
        return Err(RegistrationError::FieldTooLong {
            field,
            len: value.len(),
        });
    }
    Ok(())
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

// ── Received records ──────────────────────────────────────────────────────────

/// The fields a listener extracts from a peer's record.
///
/// `state` is whatever was advertised: the literal blob or its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedRecord {
    pub group_id: String,
    pub member_id: String,
    pub state: Bytes,
    pub version: u64,
}

impl AdvertisedRecord {
    /// Decode an untagged record and pull out the known keys.
    pub fn decode(data: &[u8]) -> Result<Self, TxtError> {
        Self::from_txt(&record::decode_record(data, false)?)
    }

    pub fn from_txt(record: &TxtRecord) -> Result<Self, TxtError> {
        let text = |key: &'static str| -> Result<String, TxtError> {
            let value = record.get(key).ok_or(TxtError::MissingKey(key))?;
            value
                .as_str()
                .map(str::to_owned)
                .ok_or(TxtError::NotText(key))
        };

        let state = record
            .get(STATE_KEY)
            .ok_or(TxtError::MissingKey(STATE_KEY))?
            .as_bytes()
            .into_owned();
        let version = record
            .get(VERSION_KEY)
            .ok_or(TxtError::MissingKey(VERSION_KEY))?
            .as_u64()
            .ok_or_else(|| TxtError::InvalidInteger(VERSION_KEY.into()))?;

        Ok(Self {
            group_id: text(GROUP_IDENTIFIER_KEY)?,
            member_id: text(MEMBER_IDENTIFIER_KEY)?,
            state: Bytes::from(state),
            version,
        })
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("{field} is {len} bytes, maximum is {}", MAX_VALUE_LEN)]
    FieldTooLong { field: &'static str, len: usize },

    #[error("registration has been invalidated")]
    Invalidated,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn registration(state: Vec<u8>) -> Registration {
        Registration::new("group-A", "member-1", "Document", state).unwrap()
    }

    #[test]
    fn empty_identity_fields_are_refused() {
        assert_eq!(
            Registration::new("", "m", "n", Bytes::new()).unwrap_err(),
            RegistrationError::EmptyField("group_id")
        );
        assert_eq!(
            Registration::new("g", "", "n", Bytes::new()).unwrap_err(),
            RegistrationError::EmptyField("member_id")
        );
        assert_eq!(
            Registration::new("g", "m", "", Bytes::new()).unwrap_err(),
            RegistrationError::EmptyField("name")
        );
    }

    #[test]
    fn oversize_identifiers_are_refused() {
        assert!(matches!(
            Registration::new("g", "m".repeat(256), "n", Bytes::new()),
            Err(RegistrationError::FieldTooLong { field: "member_id", len: 256 })
        ));
    }

    #[test]
    fn registration_ids_differ_per_instance() {
        assert_ne!(
            registration(vec![]).registration_id(),
            registration(vec![]).registration_id()
        );
    }

    #[test]
    fn small_state_is_advertised_literally() {
        let reg = registration(vec![7u8; 10]);
        let decoded = AdvertisedRecord::decode(&reg.encode_record().unwrap()).unwrap();
        assert_eq!(decoded.group_id, "group-A");
        assert_eq!(decoded.member_id, "member-1");
        assert_eq!(decoded.state.as_ref(), &[7u8; 10]);
        assert_eq!(decoded.version, 0);
    }

    #[test]
    fn large_state_is_advertised_as_digest() {
        let state = vec![3u8; 5000];
        let reg = registration(state.clone());
        assert!(reg.advertised_state().is_digest());

        let bytes = reg.encode_record().unwrap();
        let decoded = record::decode_record(&bytes, false).unwrap();
        let keys: Vec<_> = decoded.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["g", "m", "s", "v"]);
        assert_eq!(decoded["g"].as_str(), Some("group-A"));
        assert_eq!(decoded["m"].as_str(), Some("member-1"));
        assert_eq!(decoded["s"].as_bytes().len(), STATE_DIGEST_LEN);
        assert_eq!(decoded["s"].as_bytes().as_ref(), &crypto::state_digest(&state));
        assert_eq!(decoded["v"].as_u64(), Some(0));
        assert_eq!(decoded, reg.txt_record());
    }

    #[test]
    fn digest_threshold_is_inclusive() {
        let below = registration(vec![0u8; STATE_DIGEST_THRESHOLD - 1]);
        let at = registration(vec![0u8; STATE_DIGEST_THRESHOLD]);
        assert!(!below.advertised_state().is_digest());
        assert!(at.advertised_state().is_digest());
    }

    #[test]
    fn set_state_bumps_version_until_invalidated() {
        let mut reg = registration(b"one".to_vec());
        reg.set_state(&b"two"[..]).unwrap();
        reg.set_state(&b"three"[..]).unwrap();
        assert_eq!(reg.version(), 2);
        assert_eq!(reg.state().as_ref(), b"three");

        assert!(reg.invalidate());
        assert!(!reg.invalidate(), "second invalidate is a no-op");
        assert_eq!(reg.set_state(&b"four"[..]), Err(RegistrationError::Invalidated));
        assert_eq!(reg.state().as_ref(), b"three");
    }

    #[test]
    fn service_name_is_one_dns_label() {
        let reg = Registration::new("g", "m", "é".repeat(100), Bytes::new()).unwrap();
        let name = reg.service_name();
        assert!(name.len() <= MAX_SERVICE_NAME_LEN);
        assert!(name.contains(reg.registration_id()));
        assert!(matches_group(&name, "g"));
    }

    #[test]
    fn matches_group_distinguishes_groups() {
        let a = Registration::new("group-A", "m", "n", Bytes::new()).unwrap();
        let b = Registration::new("group-B", "m", "n", Bytes::new()).unwrap();
        assert!(matches_group(&a.service_name(), "group-A"));
        assert!(!matches_group(&a.service_name(), "group-B"));
        assert!(matches_group(&b.service_name(), "group-B"));
        assert!(!matches_group("unrelated service", "group-A"));
        assert!(!matches_group(&crypto::group_tag("group-A"), "group-A"));
    }

    #[test]
    fn missing_keys_are_reported() {
        let mut txt = registration(vec![]).txt_record();
        txt.remove(MEMBER_IDENTIFIER_KEY);
        assert_eq!(
            AdvertisedRecord::from_txt(&txt),
            Err(TxtError::MissingKey(MEMBER_IDENTIFIER_KEY))
        );
    }

    proptest! {
        #[test]
        fn prop_own_record_decodes_to_own_identity(
            group in "[a-zA-Z0-9._-]{1,64}",
            member in "[a-zA-Z0-9._-]{1,64}",
            name in "[ -~]{1,80}",
            state in proptest::collection::vec(any::<u8>(), 0..1024),
        ) {
            let reg = Registration::new(group.clone(), member.clone(), name, state.clone()).unwrap();
            let decoded = AdvertisedRecord::decode(&reg.encode_record().unwrap()).unwrap();
            prop_assert_eq!(&decoded.group_id, &group);
            prop_assert_eq!(&decoded.member_id, &member);
            prop_assert!(matches_group(&reg.service_name(), &group));

            if state.len() < STATE_DIGEST_THRESHOLD {
                prop_assert_eq!(decoded.state.as_ref(), state.as_slice());
            } else {
                prop_assert_eq!(decoded.state.as_ref(), &crypto::state_digest(&state)[..]);
            }
        }
    }
}
