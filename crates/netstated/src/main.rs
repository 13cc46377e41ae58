//! netstated — NetState advertisement daemon.
//!
//! Publishes the registrations listed in the config file, watches the
//! groups they belong to, and logs what other members advertise.
//!
//!   netstated [INTERFACE] [--loopback]
//!
//! With `--loopback` nothing touches the network: advertisements go over
//! an in-process bus, which only ever carries our own (filtered) echoes.
//!
//! While running, each stdin line `<name> <state>` replaces the state of
//! the registration with that name.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use netstate_core::config::NetStateConfig;
use netstate_core::crypto::generate_member_id;
use netstate_services::{
    Advertiser, LoopbackTransport, NetStateNotifier, NetStateRegistration, StateObserver,
};

mod advertise;
mod observer;

use advertise::{broadcast_loop, expiry_loop, if_index, listener_loop, MulticastAdvertiser};
use observer::LoggingObserver;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = NetStateConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = NetStateConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        NetStateConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    let loopback = args.iter().any(|a| a == "--loopback");
    let interface = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| config.network.interface.clone());

    let member_id = if config.identity.member_id.is_empty() {
        generate_member_id()
    } else {
        config.identity.member_id.clone()
    };
    tracing::info!(member = %member_id, loopback, "netstated starting");

    // One notifier per group we publish into
    let groups: BTreeSet<&str> = config
        .registrations
        .iter()
        .map(|r| r.group.as_str())
        .collect();
    let observer: Arc<dyn StateObserver> = Arc::new(LoggingObserver);
    let notifiers: Vec<Arc<NetStateNotifier>> = groups
        .iter()
        .map(|group| Arc::new(NetStateNotifier::new(*group, member_id.as_str(), observer.clone())))
        .collect();
    let notifiers = Arc::new(notifiers);

    // ── Transport ────────────────────────────────────────────────────────────

    let peer_ttl = Duration::from_secs(config.network.peer_ttl_secs);
    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    let advertiser: Arc<dyn Advertiser> = if loopback {
        let transport = LoopbackTransport::new();
        for notifier in notifiers.iter() {
            tasks.spawn(notifier.clone().run(transport.subscribe()));
        }
        Arc::new(transport)
    } else {
        if interface.is_empty() {
            anyhow::bail!("no interface given: pass one as the first argument or set network.interface");
        }
        let interface_index = if_index(&interface)?;
        tracing::info!(interface, interface_index, port = config.network.port, "using multicast transport");

        let multicast = Arc::new(
            MulticastAdvertiser::new(interface_index, config.network.port)
                .context("failed to set up multicast advertiser")?,
        );
        tasks.spawn(broadcast_loop(
            multicast.clone(),
            Duration::from_secs(config.network.announce_interval_secs),
        ));
        tasks.spawn(listener_loop(notifiers.clone(), interface_index, config.network.port));
        multicast
    };
    tasks.spawn(expiry_loop(notifiers.clone(), peer_ttl));

    // ── Registrations ────────────────────────────────────────────────────────

    let mut registrations = Vec::new();
    for entry in &config.registrations {
        match NetStateRegistration::create(
            advertiser.clone(),
            entry.group.as_str(),
            member_id.as_str(),
            entry.name.as_str(),
            Bytes::from(entry.state.clone().into_bytes()),
        ) {
            Ok(registration) => registrations.push(registration),
            Err(e) => tracing::warn!(group = %entry.group, name = %entry.name, error = %e, "registration skipped"),
        }
    }
    if registrations.is_empty() {
        tracing::warn!("no registrations configured, only listening");
    }

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("shutting down");
                break;
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => apply_state_command(&mut registrations, &line),
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    stdin_open = false;
                }
            },
            Some(r) = tasks.join_next() => {
                tracing::error!("task exited: {:?}", r);
                break;
            }
        }
    }

    for registration in &mut registrations {
        if let Err(e) = registration.invalidate() {
            tracing::warn!(error = %e, "failed to withdraw registration");
        }
    }

    Ok(())
}

/// Apply `<name> <state>` to the registration with that name.
fn apply_state_command(registrations: &mut [NetStateRegistration], line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let (name, state) = line.split_once(' ').unwrap_or((line, ""));

    let Some(registration) = registrations
        .iter_mut()
        .find(|r| r.registration().name() == name)
    else {
        tracing::warn!(name, "no registration with that name");
        return;
    };

    if let Err(e) = registration.set_state(Bytes::from(state.as_bytes().to_vec())) {
        tracing::warn!(name, error = %e, "state update failed");
    }
}
