//! Two members sharing state in one group.

use bytes::Bytes;
use netstate_core::crypto::state_digest;
use netstate_services::{Disposition, LoopbackTransport};

use crate::{Member, Seen};

#[test]
fn peer_sees_state_and_changes() -> anyhow::Result<()> {
    let bus = LoopbackTransport::new();
    let mut alice = Member::join(&bus, "alice", "docs");
    let mut bob = Member::join(&bus, "bob", "docs");

    let mut doc = alice.register("docs", "Report", b"rev-1")?;
    doc.set_state(Bytes::from_static(b"rev-2"))?;

    assert_eq!(bob.pump(), vec![Disposition::Delivered, Disposition::Delivered]);
    assert_eq!(
        bob.recorder.take(),
        vec![
            Seen::Changed { member: "alice".into(), state: Bytes::from_static(b"rev-1"), version: 0 },
            Seen::Changed { member: "alice".into(), state: Bytes::from_static(b"rev-2"), version: 1 },
        ]
    );

    // Alice hears only her own echoes.
    assert_eq!(alice.pump(), vec![Disposition::Echo, Disposition::Echo]);
    assert!(alice.recorder.take().is_empty());

    doc.invalidate()?;
    Ok(())
}

#[test]
fn both_members_publish_and_each_sees_only_the_other() -> anyhow::Result<()> {
    let bus = LoopbackTransport::new();
    let mut alice = Member::join(&bus, "alice", "docs");
    let mut bob = Member::join(&bus, "bob", "docs");

    let mut a = alice.register("docs", "A", b"a")?;
    let mut b = bob.register("docs", "B", b"b")?;

    alice.pump();
    bob.pump();

    assert_eq!(
        alice.recorder.take(),
        vec![Seen::Changed { member: "bob".into(), state: Bytes::from_static(b"b"), version: 0 }]
    );
    assert_eq!(
        bob.recorder.take(),
        vec![Seen::Changed { member: "alice".into(), state: Bytes::from_static(b"a"), version: 0 }]
    );
    assert_eq!(alice.notifier.peers().len(), 1);
    assert_eq!(bob.notifier.peers().len(), 1);

    a.invalidate()?;
    b.invalidate()?;
    Ok(())
}

#[test]
fn oversize_state_arrives_as_digest() -> anyhow::Result<()> {
    static BIG: [u8; 5000] = [0x5a; 5000];

    let bus = LoopbackTransport::new();
    let alice = Member::join(&bus, "alice", "docs");
    let mut bob = Member::join(&bus, "bob", "docs");

    let mut doc = alice.register("docs", "Big", &BIG)?;
    bob.pump();

    match bob.recorder.take().as_slice() {
        [Seen::Changed { state, .. }] => {
            assert_eq!(state.len(), 20);
            assert_eq!(state.as_ref(), &state_digest(&BIG));
        }
        other => panic!("unexpected observations: {other:?}"),
    }

    doc.invalidate()?;
    Ok(())
}

#[test]
fn late_joiner_catches_up_from_snapshot() -> anyhow::Result<()> {
    let bus = LoopbackTransport::new();
    let alice = Member::join(&bus, "alice", "docs");
    let mut doc = alice.register("docs", "Report", b"rev-1")?;

    let carol = Member::join(&bus, "carol", "docs");
    assert_eq!(
        carol.recorder.take(),
        vec![Seen::Changed { member: "alice".into(), state: Bytes::from_static(b"rev-1"), version: 0 }]
    );

    doc.invalidate()?;
    Ok(())
}
