//! Registration lifecycle as seen by peers.

use std::time::Duration;

use bytes::Bytes;
use netstate_core::RegistrationError;
use netstate_services::{Disposition, LoopbackTransport};

use crate::{Member, Seen};

#[test]
fn invalidate_removes_peer_exactly_once() -> anyhow::Result<()> {
    let bus = LoopbackTransport::new();
    let alice = Member::join(&bus, "alice", "docs");
    let mut bob = Member::join(&bus, "bob", "docs");

    let mut doc = alice.register("docs", "Report", b"x")?;
    doc.invalidate()?;
    doc.invalidate()?;

    assert_eq!(bob.pump(), vec![Disposition::Delivered, Disposition::Removed]);
    assert_eq!(
        bob.recorder.take(),
        vec![
            Seen::Changed { member: "alice".into(), state: Bytes::from_static(b"x"), version: 0 },
            Seen::Removed { member: "alice".into() },
        ]
    );
    assert!(bus.is_empty());
    Ok(())
}

#[test]
fn invalidated_registration_refuses_state() -> anyhow::Result<()> {
    let bus = LoopbackTransport::new();
    let alice = Member::join(&bus, "alice", "docs");
    let mut bob = Member::join(&bus, "bob", "docs");

    let mut doc = alice.register("docs", "Report", b"x")?;
    doc.invalidate()?;
    bob.pump();
    bob.recorder.take();

    let err = doc.set_state(Bytes::from_static(b"y")).unwrap_err();
    assert_eq!(err.downcast_ref::<RegistrationError>(), Some(&RegistrationError::Invalidated));
    assert!(bob.pump().is_empty(), "nothing is published after invalidate");
    Ok(())
}

#[test]
fn silent_peers_expire() -> anyhow::Result<()> {
    let bus = LoopbackTransport::new();
    let alice = Member::join(&bus, "alice", "docs");
    let mut bob = Member::join(&bus, "bob", "docs");

    let mut doc = alice.register("docs", "Report", b"x")?;
    bob.pump();
    bob.recorder.take();

    assert_eq!(bob.notifier.expire(Duration::from_secs(3600)), 0);
    assert_eq!(bob.notifier.expire(Duration::ZERO), 1);
    assert_eq!(bob.recorder.take(), vec![Seen::Removed { member: "alice".into() }]);

    doc.invalidate()?;
    Ok(())
}

#[test]
fn empty_identity_is_refused() {
    let bus = LoopbackTransport::new();
    let nobody = Member::join(&bus, "", "docs");
    assert!(nobody.register("docs", "Report", b"x").is_err());
    assert!(nobody.register("", "Report", b"x").is_err());
    assert!(bus.is_empty());
}
