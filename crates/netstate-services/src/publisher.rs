//! Published registrations.
//!
//! Wraps a core [`Registration`] together with the transport that carries
//! its advertisement. Creating one publishes; `set_state` re-publishes;
//! `invalidate` withdraws. Dropping a live registration does not withdraw
//! it; the advertisement stays up until peers expire it.

use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;

use netstate_core::{AdvertisedState, Registration};

use crate::transport::{Advertisement, Advertiser};

/// A registration whose state is advertised to its group.
///
/// Not internally synchronized: mutation takes `&mut self`.
pub struct NetStateRegistration {
    inner: Registration,
    advertiser: Arc<dyn Advertiser>,
}

impl NetStateRegistration {
    /// Validate identity, generate a registration id, and publish the
    /// initial state.
    pub fn create(
        advertiser: Arc<dyn Advertiser>,
        group_id: impl Into<String>,
        member_id: impl Into<String>,
        name: impl Into<String>,
        state: impl Into<Bytes>,
    ) -> Result<Self> {
        let inner = Registration::new(group_id, member_id, name, state)?;
        publish(advertiser.as_ref(), &inner)?;

        tracing::info!(
            registration = inner.registration_id(),
            group = inner.group_id(),
            member = inner.member_id(),
            name = inner.name(),
            "registration published"
        );

        Ok(Self { inner, advertiser })
    }

    pub fn registration(&self) -> &Registration {
        &self.inner
    }

    pub fn service_name(&self) -> String {
        self.inner.service_name()
    }

    pub fn advertised_state(&self) -> AdvertisedState {
        self.inner.advertised_state()
    }

    /// Replace the advertised state.
    ///
    /// The local state is updated even if the transport then fails to
    /// publish; the next successful publish carries it.
    pub fn set_state(&mut self, state: impl Into<Bytes>) -> Result<()> {
        self.inner.set_state(state)?;

        tracing::debug!(
            registration = self.inner.registration_id(),
            version = self.inner.version(),
            bytes = self.inner.state().len(),
            digest = self.inner.advertised_state().is_digest(),
            "registration state changed"
        );

        publish(self.advertiser.as_ref(), &self.inner)
    }

    /// Stop advertising. Calling this again after it succeeded is a no-op.
    ///
    /// If the transport fails to withdraw, the registration stays live and
    /// the call can be retried.
    pub fn invalidate(&mut self) -> Result<()> {
        if self.inner.is_invalidated() {
            return Ok(());
        }

        self.advertiser
            .withdraw(&self.inner.service_name())
            .context("failed to withdraw advertisement")?;
        self.inner.invalidate();

        tracing::info!(registration = self.inner.registration_id(), "registration invalidated");
        Ok(())
    }
}

impl Drop for NetStateRegistration {
    fn drop(&mut self) {
        if !self.inner.is_invalidated() {
            tracing::warn!(
                registration = self.inner.registration_id(),
                "registration dropped without invalidate, advertisement left in place"
            );
        }
    }
}

fn publish(advertiser: &dyn Advertiser, registration: &Registration) -> Result<()> {
    let advertisement =
        Advertisement::for_registration(registration).context("failed to encode record")?;
    advertiser
        .publish(&advertisement)
        .context("failed to publish advertisement")
}
