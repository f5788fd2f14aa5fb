//! End-to-end tests against scripted server conversations.
//!
//! Each test drives a full [`Session`] over a `tokio_test` mock stream
//! whose script asserts every byte the client writes, so a drifting
//! tag, a missing CONDSTORE parameter or an unencoded mailbox name
//! fails the test immediately.

#![allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]

use std::path::Path;

use tokio_test::io::Builder;

use mailtether_imap::{
    AccountConfig, Capability, FetchAttribute, FetchItems, Flag, Flags, Mailbox, ModSeq, Security,
    SeqNum, SequenceSet, Session, SessionState, StatusAttribute, StoreAction, Uid, UidValidity,
};

fn config(cache_dir: Option<&Path>) -> AccountConfig {
    let mut builder = AccountConfig::builder("mail.example.com").security(Security::None);
    if let Some(dir) = cache_dir {
        builder = builder.cache_dir(dir);
    }
    builder.build()
}

#[tokio::test]
async fn full_session_walkthrough() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1] mail.example.com ready\r\n")
        .write(b"a0000 LOGIN ana secret\r\n")
        .read(b"a0000 OK [CAPABILITY IMAP4rev1 ENABLE CONDSTORE QRESYNC UIDPLUS MOVE IDLE] logged in\r\n")
        .write(b"a0001 ENABLE QRESYNC\r\n")
        .read(b"* ENABLED QRESYNC\r\na0001 OK enabled\r\n")
        .write(b"a0002 SELECT INBOX (CONDSTORE)\r\n")
        .read(
            b"* 2 EXISTS\r\n\
              * 0 RECENT\r\n\
              * OK [UIDVALIDITY 11] UIDs valid\r\n\
              * OK [UIDNEXT 10] predicted\r\n\
              * OK [HIGHESTMODSEQ 100] tracked\r\n\
              a0002 OK [READ-WRITE] SELECT completed\r\n",
        )
        .write(b"a0003 FETCH 1:2 (UID FLAGS MODSEQ)\r\n")
        .read(
            b"* 1 FETCH (UID 4 FLAGS (\\Seen) MODSEQ (90))\r\n\
              * 2 FETCH (UID 9 FLAGS () MODSEQ (100))\r\n\
              a0003 OK FETCH completed\r\n",
        )
        .write(b"a0004 UID STORE 9 +FLAGS.SILENT (\\Seen)\r\n")
        .read(b"a0004 OK STORE completed\r\n")
        .write(b"a0005 CLOSE\r\n")
        .read(b"a0005 OK CLOSE completed\r\n")
        .write(b"a0006 LOGOUT\r\n")
        .read(b"* BYE signing off\r\na0006 OK LOGOUT completed\r\n")
        .build();

    let mut session = Session::from_stream(mock, config(None)).await.unwrap();
    assert_eq!(*session.state(), SessionState::Connected);

    // The completion carries fresh capabilities, so no extra
    // CAPABILITY round-trip appears in the script.
    session.login("ana", "secret").await.unwrap();
    assert!(session.state().is_authenticated());
    assert!(session.capabilities().has(&Capability::QResync));

    session.enable_extensions().await.unwrap();

    let summary = session.open(&Mailbox::inbox(), false).await.unwrap();
    assert_eq!(summary.exists, 2);
    assert_eq!(summary.uid_validity, UidValidity::new(11));
    assert_eq!(summary.highest_modseq, ModSeq::new(100));
    assert!(!summary.read_only);

    let rows = session
        .fetch(
            SequenceSet::range(1, 2).unwrap(),
            FetchItems::flag_sync(),
            false,
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(session.store().len(), 2);
    let record = session.record(Uid::new(4).unwrap()).unwrap();
    assert!(record.flags.contains(&Flag::Seen));

    let modified = session
        .store_flags(
            SequenceSet::single(9).unwrap(),
            StoreAction::add(Flags::from_iter([Flag::Seen])).silent(),
            true,
        )
        .await
        .unwrap();
    assert!(modified.is_none());

    session.close().await.unwrap();
    assert!(session.mailbox().is_none());
    assert!(session.state().is_authenticated());

    session.logout().await.unwrap();
    assert_eq!(*session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn lost_messages_flag_a_resync_and_rebuild() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
        .write(b"a0000 SELECT INBOX\r\n")
        .read(
            b"* 3 EXISTS\r\n\
              * OK [UIDVALIDITY 7] valid\r\n\
              a0000 OK [READ-WRITE] selected\r\n",
        )
        .write(b"a0001 FETCH 1:3 (UID FLAGS)\r\n")
        .read(
            b"* 1 FETCH (UID 11 FLAGS ())\r\n\
              * 2 FETCH (UID 12 FLAGS ())\r\n\
              * 3 FETCH (UID 13 FLAGS (\\Seen))\r\n\
              a0001 OK fetched\r\n",
        )
        .write(b"a0002 NOOP\r\n")
        .read(b"* 2 EXISTS\r\na0002 OK noop\r\n")
        .write(b"a0003 FETCH 1:2 (UID FLAGS)\r\n")
        .read(
            b"* 1 FETCH (UID 11 FLAGS ())\r\n\
              * 2 FETCH (UID 13 FLAGS (\\Seen))\r\n\
              a0003 OK rebuilt\r\n",
        )
        .build();

    let mut session = Session::from_stream(mock, config(None)).await.unwrap();
    session.open(&Mailbox::inbox(), false).await.unwrap();
    session
        .fetch(
            SequenceSet::range(1, 3).unwrap(),
            FetchItems::Items(vec![FetchAttribute::Uid, FetchAttribute::Flags]),
            false,
        )
        .await
        .unwrap();
    assert_eq!(session.store().len(), 3);

    // The EXISTS count dropped without any EXPUNGE, so a message
    // vanished behind our back and the whole index is suspect.
    session.noop().await.unwrap();
    assert!(session.needs_resync());

    session.resync().await.unwrap();
    assert!(!session.needs_resync());
    assert_eq!(session.store().len(), 2);
    assert!(session.record(Uid::new(12).unwrap()).is_none());
    let sync = session.sync().unwrap();
    assert_eq!(sync.uid_at(SeqNum::new(2).unwrap()), Uid::new(13));
}

/// Runs a first session that indexes three messages and logs out,
/// leaving a QRESYNC checkpoint and cached records under `dir`.
async fn seed_checkpoint(dir: &Path) {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 ENABLE CONDSTORE QRESYNC] ready\r\n")
        .write(b"a0000 ENABLE QRESYNC\r\n")
        .read(b"* ENABLED QRESYNC\r\na0000 OK enabled\r\n")
        .write(b"a0001 SELECT INBOX (CONDSTORE)\r\n")
        .read(
            b"* 3 EXISTS\r\n\
              * OK [UIDVALIDITY 99] valid\r\n\
              * OK [HIGHESTMODSEQ 500] tracked\r\n\
              a0001 OK [READ-WRITE] selected\r\n",
        )
        .write(b"a0002 FETCH 1:3 (UID FLAGS MODSEQ)\r\n")
        .read(
            b"* 1 FETCH (UID 101 FLAGS (\\Seen) MODSEQ (510))\r\n\
              * 2 FETCH (UID 102 FLAGS () MODSEQ (515))\r\n\
              * 3 FETCH (UID 103 FLAGS (\\Answered) MODSEQ (520))\r\n\
              a0002 OK fetched\r\n",
        )
        .write(b"a0003 LOGOUT\r\n")
        .read(b"* BYE signing off\r\na0003 OK bye\r\n")
        .build();

    let mut session = Session::from_stream(mock, config(Some(dir))).await.unwrap();
    session.enable_extensions().await.unwrap();
    session.open(&Mailbox::inbox(), false).await.unwrap();
    session
        .fetch(
            SequenceSet::range(1, 3).unwrap(),
            FetchItems::flag_sync(),
            false,
        )
        .await
        .unwrap();
    session.logout().await.unwrap();
}

#[tokio::test]
async fn reopen_resumes_from_the_disk_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    seed_checkpoint(dir.path()).await;

    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 ENABLE CONDSTORE QRESYNC] ready\r\n")
        .write(b"a0000 ENABLE QRESYNC\r\n")
        .read(b"* ENABLED QRESYNC\r\na0000 OK enabled\r\n")
        .write(b"a0001 SELECT INBOX (QRESYNC (99 520 101:103))\r\n")
        .read(
            b"* 3 EXISTS\r\n\
              * OK [UIDVALIDITY 99] valid\r\n\
              * OK [HIGHESTMODSEQ 520] tracked\r\n\
              a0001 OK [READ-WRITE] selected\r\n",
        )
        .build();

    let mut session = Session::from_stream(mock, config(Some(dir.path())))
        .await
        .unwrap();
    session.enable_extensions().await.unwrap();
    let summary = session.open(&Mailbox::inbox(), false).await.unwrap();

    // The records come back from disk without a single FETCH on the
    // wire; the script above would panic on one.
    assert_eq!(summary.exists, 3);
    assert_eq!(summary.highest_modseq, ModSeq::new(520));
    assert_eq!(session.store().len(), 3);
    let record = session.record(Uid::new(101).unwrap()).unwrap();
    assert!(record.flags.contains(&Flag::Seen));
    let record = session.record(Uid::new(103).unwrap()).unwrap();
    assert!(record.flags.contains(&Flag::Answered));
}

#[tokio::test]
async fn changed_uidvalidity_discards_the_warm_start() {
    let dir = tempfile::tempdir().unwrap();
    seed_checkpoint(dir.path()).await;

    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 ENABLE CONDSTORE QRESYNC] ready\r\n")
        .write(b"a0000 ENABLE QRESYNC\r\n")
        .read(b"* ENABLED QRESYNC\r\na0000 OK enabled\r\n")
        .write(b"a0001 SELECT INBOX (QRESYNC (99 520 101:103))\r\n")
        .read(
            b"* 3 EXISTS\r\n\
              * OK [UIDVALIDITY 100] rebuilt\r\n\
              a0001 OK [READ-WRITE] selected\r\n",
        )
        .build();

    let mut session = Session::from_stream(mock, config(Some(dir.path())))
        .await
        .unwrap();
    session.enable_extensions().await.unwrap();
    let summary = session.open(&Mailbox::inbox(), false).await.unwrap();

    // The mailbox was rebuilt server-side; everything restored from
    // the old epoch is dropped again.
    assert_eq!(summary.uid_validity, UidValidity::new(100));
    assert_eq!(session.store().len(), 0);
    assert!(session.record(Uid::new(101).unwrap()).is_none());
}

#[tokio::test]
async fn mailbox_names_travel_quoted_and_encoded() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
        .write(b"a0000 STATUS \"Sent Items\" (MESSAGES)\r\n")
        .read(b"* STATUS \"Sent Items\" (MESSAGES 3)\r\na0000 OK status\r\n")
        .write(b"a0001 CREATE Entw&APw-rfe\r\n")
        .read(b"a0001 OK created\r\n")
        .build();

    let mut session = Session::from_stream(mock, config(None)).await.unwrap();

    let status = session
        .status(&Mailbox::new("Sent Items"), vec![StatusAttribute::Messages])
        .await
        .unwrap();
    assert_eq!(status.messages, 3);
    assert!(session.cached_status(&Mailbox::new("Sent Items")).is_some());

    session.create(&Mailbox::new("Entwürfe")).await.unwrap();
}
