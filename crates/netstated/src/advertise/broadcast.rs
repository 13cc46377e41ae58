//! Advertisement broadcast.
//!
//! Keeps the encoded frame of every live registration and re-sends them
//! to the link-local multicast address ff02::1 on a regular interval, so
//! peers that join late or drop a datagram still converge. Publishing a new
//! record or withdrawing one is sent immediately.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::time;

use netstate_core::wire::{encode_frame, FrameKind, MULTICAST_ADDR};
use netstate_services::{Advertisement, Advertiser};

/// Sends NetState frames to ff02::1 on one interface.
pub struct MulticastAdvertiser {
    socket: Socket,
    dest: SocketAddrV6,
    /// service name → (service type, encoded announce frame).
    live: DashMap<String, (String, Vec<u8>)>,
}

impl MulticastAdvertiser {
    /// # Arguments
    /// * `interface_index` - The OS interface index to send on (from `if_nametoindex`).
    /// * `port` - UDP port peers listen on.
    pub fn new(interface_index: u32, port: u16) -> Result<Self> {
        let socket = make_multicast_socket(interface_index)
            .context("failed to create multicast broadcast socket")?;
        let multicast: Ipv6Addr = MULTICAST_ADDR
            .parse()
            .context("invalid multicast address")?;

        Ok(Self {
            socket,
            dest: SocketAddrV6::new(multicast, port, 0, interface_index),
            live: DashMap::new(),
        })
    }

    fn send(&self, frame: &[u8]) -> Result<()> {
        let n = self
            .socket
            .send_to(frame, &self.dest.into())
            .context("multicast send failed")?;
        tracing::trace!(bytes = n, "frame sent");
        Ok(())
    }

    /// Send every live frame once.
    fn announce_all(&self) {
        tracing::trace!(count = self.live.len(), "re-announcing");
        for entry in self.live.iter() {
            if let Err(e) = self.send(&entry.value().1) {
                tracing::warn!(service = %entry.key(), error = %e, "re-announce failed");
            }
        }
    }
}

impl Advertiser for MulticastAdvertiser {
    fn publish(&self, advertisement: &Advertisement) -> Result<()> {
        let frame = encode_frame(
            FrameKind::Announce,
            &advertisement.service_type,
            &advertisement.service_name,
            &advertisement.record,
        )
        .context("failed to frame advertisement")?;

        // Stored first so a failed send is retried by the next re-announce.
        self.live.insert(
            advertisement.service_name.clone(),
            (advertisement.service_type.clone(), frame.clone()),
        );
        self.send(&frame)
    }

    fn withdraw(&self, service_name: &str) -> Result<()> {
        let Some((_, (service_type, _))) = self.live.remove(service_name) else {
            return Ok(());
        };

        let goodbye = encode_frame(FrameKind::Goodbye, &service_type, service_name, &[])
            .context("failed to frame goodbye")?;
        self.send(&goodbye)
    }
}

/// Re-announce live advertisements on a regular interval.
///
/// Runs until the task is aborted.
pub async fn broadcast_loop(advertiser: Arc<MulticastAdvertiser>, interval: Duration) -> Result<()> {
    let mut interval_timer = time::interval(interval);

    tracing::info!(
        dest = %advertiser.dest,
        interval_secs = interval.as_secs(),
        "advertisement broadcast starting"
    );

    loop {
        interval_timer.tick().await;
        advertiser.announce_all();
    }
}

/// Create a UDP socket suitable for sending IPv6 multicast.
fn make_multicast_socket(interface_index: u32) -> Result<Socket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket
        .set_multicast_if_v6(interface_index)
        .context("IPV6_MULTICAST_IF")?;
    // Hop limit 1: stay on this link
    socket.set_multicast_hops_v6(1).context("IPV6_MULTICAST_HOPS")?;
    // Other processes on this host are peers too
    socket
        .set_multicast_loop_v6(true)
        .context("IPV6_MULTICAST_LOOP")?;

    Ok(socket)
}

/// Get the OS interface index for a named network interface.
/// Returns an error if the interface does not exist.
pub fn if_index(name: &str) -> Result<u32> {
    let name_cstr = std::ffi::CString::new(name).context("interface name contains null byte")?;
    let index = unsafe { libc::if_nametoindex(name_cstr.as_ptr()) };
    if index == 0 {
        anyhow::bail!("interface '{}' not found", name);
    }
    Ok(index)
}
