//! Group isolation.

use netstate_core::matches_group;
use netstate_services::{Disposition, LoopbackTransport};

use crate::Member;

#[test]
fn members_only_hear_their_own_group() -> anyhow::Result<()> {
    let bus = LoopbackTransport::new();
    let mut docs_watcher = Member::join(&bus, "watcher", "docs");
    let mut music_watcher = Member::join(&bus, "watcher", "music");
    let publisher = Member::join(&bus, "publisher", "docs");

    let mut doc = publisher.register("docs", "Report", b"x")?;
    let mut song = publisher.register("music", "Song", b"y")?;

    assert!(matches_group(&doc.service_name(), "docs"));
    assert!(!matches_group(&doc.service_name(), "music"));
    assert!(matches_group(&song.service_name(), "music"));

    assert_eq!(
        docs_watcher.pump(),
        vec![Disposition::Delivered, Disposition::ForeignGroup]
    );
    assert_eq!(
        music_watcher.pump(),
        vec![Disposition::ForeignGroup, Disposition::Delivered]
    );

    doc.invalidate()?;
    song.invalidate()?;
    Ok(())
}

#[test]
fn own_registration_outside_the_group_is_foreign() -> anyhow::Result<()> {
    let bus = LoopbackTransport::new();
    let mut me_docs = Member::join(&bus, "me", "docs");

    // Our own registration in a group we do not watch never reaches
    // the echo check; it is dropped as foreign first.
    let mut other_group = me_docs.register("music", "Song", b"y")?;
    let mut same_group = me_docs.register("docs", "Report", b"x")?;

    assert_eq!(me_docs.pump(), vec![Disposition::ForeignGroup, Disposition::Echo]);

    other_group.invalidate()?;
    same_group.invalidate()?;
    Ok(())
}
