//! The per-session snapshot slot and its single-writer ordering rules.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use shared::domain::{LotterySnapshot, Session};
use tokio::sync::watch;
use tracing::debug;

/// Issued when a refresh starts; orders results by start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    epoch: u64,
    seq: u64,
}

impl RefreshTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDisposition {
    Applied,
    /// A refresh started later has already been published.
    Superseded,
    /// The session the refresh was started for is no longer active.
    StaleSession,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub session: Session,
    pub snapshot: Option<Arc<LotterySnapshot>>,
    applied_seq: u64,
}

pub struct SnapshotStore {
    state: watch::Sender<SyncState>,
    next_seq: AtomicU64,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            state,
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn session(&self) -> Session {
        self.state.borrow().session.clone()
    }

    pub fn current(&self) -> Option<Arc<LotterySnapshot>> {
        self.state.borrow().snapshot.clone()
    }

    pub fn watch(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Switches to `session` and drops the previous session's snapshot. Sessions not
    /// newer than the current one are ignored; returns whether the switch happened.
    pub fn reset_session(&self, session: Session) -> bool {
        self.state.send_if_modified(|state| {
            if session.epoch <= state.session.epoch {
                debug!(
                    current_epoch = state.session.epoch,
                    offered_epoch = session.epoch,
                    "ignoring superseded session"
                );
                return false;
            }
            debug!(
                from_epoch = state.session.epoch,
                to_epoch = session.epoch,
                "snapshot store switched session"
            );
            state.session = session;
            state.snapshot = None;
            true
        })
    }

    pub fn begin_refresh(&self, epoch: u64) -> Option<RefreshTicket> {
        if self.state.borrow().session.epoch != epoch {
            return None;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        Some(RefreshTicket { epoch, seq })
    }

    pub fn apply(&self, ticket: RefreshTicket, snapshot: LotterySnapshot) -> RefreshDisposition {
        let mut disposition = RefreshDisposition::Applied;
        self.state.send_if_modified(|state| {
            if state.session.epoch != ticket.epoch
                || state.session.address.as_ref() != Some(&snapshot.account)
            {
                disposition = RefreshDisposition::StaleSession;
                return false;
            }
            if ticket.seq <= state.applied_seq {
                disposition = RefreshDisposition::Superseded;
                return false;
            }
            state.applied_seq = ticket.seq;
            state.snapshot = Some(Arc::new(snapshot));
            true
        });
        debug!(
            epoch = ticket.epoch,
            seq = ticket.seq,
            ?disposition,
            "refresh result"
        );
        disposition
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
