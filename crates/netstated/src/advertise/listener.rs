//! Advertisement listener.
//!
//! Joins the ff02::1 multicast group and listens for NetState frames from
//! nearby peers, this process included (multicast loops back). Every
//! frame becomes a discovery event handed to each notifier; the notifiers
//! do group filtering and echo suppression. A separate expiry task removes
//! peers that stopped announcing.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use netstate_core::wire::{
    decode_frame, FrameKind, FRAME_HEADER_LEN, MAX_RECORD_LEN, MAX_SERVICE_NAME_LEN,
    MULTICAST_ADDR, SERVICE_DOMAIN, SERVICE_TYPE,
};
use netstate_services::{Advertisement, DiscoveryEvent, NetStateNotifier};

/// Notifiers fed by one listener, one per observed group.
pub type Notifiers = Arc<Vec<Arc<NetStateNotifier>>>;

/// Large enough for any valid frame.
const RECV_BUF_LEN: usize = FRAME_HEADER_LEN + 255 + MAX_SERVICE_NAME_LEN + MAX_RECORD_LEN;

/// Listen for advertisements and feed them to the notifiers.
///
/// Runs until the task is aborted.
pub async fn listener_loop(notifiers: Notifiers, interface_index: u32, port: u16) -> Result<()> {
    let socket = make_listener_socket(interface_index, port)
        .context("failed to create multicast listener socket")?;

    // Convert to tokio UdpSocket for async recv
    let socket = UdpSocket::from_std(socket).context("failed to convert to tokio UdpSocket")?;

    let mut buf = vec![0u8; RECV_BUF_LEN];

    tracing::info!(port, groups = notifiers.len(), "advertisement listener starting");

    loop {
        let (len, peer_addr) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "recv_from failed");
                continue;
            }
        };

        let Some(event) = event_from_datagram(&buf[..len]) else {
            tracing::trace!(addr = %peer_addr, "ignoring datagram");
            continue;
        };

        for notifier in notifiers.iter() {
            let disposition = notifier.handle_event(&event);
            tracing::trace!(group = notifier.group_id(), ?disposition, "event handled");
        }
    }
}

/// Turn a datagram into a discovery event, if it is a NetState frame.
pub fn event_from_datagram(datagram: &[u8]) -> Option<DiscoveryEvent> {
    let frame = match decode_frame(datagram) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::trace!(error = %e, "failed to parse frame");
            return None;
        }
    };

    if frame.service_type != SERVICE_TYPE {
        return None;
    }

    Some(match frame.kind {
        FrameKind::Announce => DiscoveryEvent::Found(Advertisement {
            service_type: frame.service_type.to_string(),
            domain: SERVICE_DOMAIN.to_string(),
            service_name: frame.service_name.to_string(),
            record: Bytes::copy_from_slice(frame.record),
        }),
        FrameKind::Goodbye => DiscoveryEvent::Removed(frame.service_name.to_string()),
    })
}

/// Remove peers that have not been refreshed within the TTL.
///
/// Runs until the task is aborted.
pub async fn expiry_loop(notifiers: Notifiers, ttl: Duration) -> Result<()> {
    let check_interval = Duration::from_secs(1);
    let mut interval = tokio::time::interval(check_interval);

    loop {
        interval.tick().await;
        for notifier in notifiers.iter() {
            notifier.expire(ttl);
        }
    }
}

/// Create a UDP socket joined to the ff02::1 multicast group.
fn make_listener_socket(interface_index: u32, port: u16) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_only_v6(true).context("IPV6_V6ONLY")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;

    let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0);
    socket.bind(&bind_addr.into()).context("bind()")?;

    let multicast: Ipv6Addr = MULTICAST_ADDR
        .parse()
        .context("invalid multicast address")?;
    socket
        .join_multicast_v6(&multicast, interface_index)
        .context("IPV6_JOIN_GROUP")?;

    Ok(socket.into())
}
