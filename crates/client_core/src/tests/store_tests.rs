use super::*;
use shared::domain::Address;

fn session(address: u64, epoch: u64) -> Session {
    Session {
        address: Some(Address::from_low_u64(address)),
        epoch,
    }
}

fn snapshot(account: u64, players: &[u64]) -> LotterySnapshot {
    LotterySnapshot {
        account: Address::from_low_u64(account),
        status: false,
        winner: None,
        players: players.iter().copied().map(Address::from_low_u64).collect(),
        owner: Address::from_low_u64(1),
        claimed: false,
        entered_by_current: false,
    }
}

#[test]
fn newest_started_refresh_wins_regardless_of_completion_order() {
    let store = SnapshotStore::new();
    store.reset_session(session(0xaa, 1));

    let older = store.begin_refresh(1).expect("older ticket");
    let newer = store.begin_refresh(1).expect("newer ticket");

    assert_eq!(
        store.apply(newer, snapshot(0xaa, &[0xaa, 0xbb])),
        RefreshDisposition::Applied
    );
    assert_eq!(
        store.apply(older, snapshot(0xaa, &[0xaa])),
        RefreshDisposition::Superseded
    );
    assert_eq!(
        store.current().expect("snapshot").players.len(),
        2,
        "slow older refresh must not overwrite the newer result"
    );
}

#[test]
fn in_order_completion_publishes_each_result() {
    let store = SnapshotStore::new();
    store.reset_session(session(0xaa, 1));

    let first = store.begin_refresh(1).expect("first");
    let second = store.begin_refresh(1).expect("second");
    assert_eq!(
        store.apply(first, snapshot(0xaa, &[])),
        RefreshDisposition::Applied
    );
    assert_eq!(
        store.apply(second, snapshot(0xaa, &[0xaa])),
        RefreshDisposition::Applied
    );
    assert_eq!(store.current().expect("snapshot").players.len(), 1);
}

#[test]
fn results_for_a_replaced_session_are_discarded() {
    let store = SnapshotStore::new();
    store.reset_session(session(0xaa, 1));
    let ticket = store.begin_refresh(1).expect("ticket");

    store.reset_session(session(0xbb, 2));

    assert_eq!(
        store.apply(ticket, snapshot(0xaa, &[0xaa])),
        RefreshDisposition::StaleSession
    );
    assert!(store.current().is_none());
    assert!(store.begin_refresh(1).is_none());
    assert_eq!(ticket.epoch(), 1);
}

#[test]
fn snapshot_for_another_account_is_never_published() {
    let store = SnapshotStore::new();
    store.reset_session(session(0xaa, 1));
    let ticket = store.begin_refresh(1).expect("ticket");

    assert_eq!(
        store.apply(ticket, snapshot(0xbb, &[])),
        RefreshDisposition::StaleSession
    );
    assert!(store.current().is_none());
}

#[test]
fn session_switch_clears_snapshot_and_notifies_watchers() {
    let store = SnapshotStore::new();
    store.reset_session(session(0xaa, 1));
    let ticket = store.begin_refresh(1).expect("ticket");
    store.apply(ticket, snapshot(0xaa, &[]));
    let mut watcher = store.watch();

    store.reset_session(session(0xbb, 2));

    assert!(watcher.has_changed().expect("open"));
    let state = watcher.borrow_and_update().clone();
    assert_eq!(state.session, session(0xbb, 2));
    assert!(state.snapshot.is_none());
}

#[test]
fn older_session_never_replaces_a_newer_one() {
    let store = SnapshotStore::new();
    assert!(store.reset_session(session(0xaa, 3)));
    let ticket = store.begin_refresh(3).expect("ticket");
    store.apply(ticket, snapshot(0xaa, &[0xaa]));

    assert!(!store.reset_session(Session {
        address: None,
        epoch: 2,
    }));
    assert!(!store.reset_session(session(0xbb, 3)));

    assert_eq!(store.session(), session(0xaa, 3));
    assert_eq!(store.current().expect("snapshot kept").players.len(), 1);
}
