//! Single-flight execution of state-changing lottery actions.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use shared::{
    domain::{Address, LotterySnapshot, TxHash, Wei},
    error::LotteryError,
    protocol::{ActionKind, ActionRequest, TransactionOutcome},
};
use tokio::{sync::watch, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    contract::{ContractClient, PendingTransaction},
    reader::StateReader,
    store::{RefreshDisposition, SnapshotStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionPolicy {
    pub entry_stake: Wei,
    /// Whether the lottery manager may also enter as a player.
    pub allow_owner_entry: bool,
    pub confirmation_timeout: Option<Duration>,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self {
            entry_stake: Wei::from_milli_ether(1),
            allow_owner_entry: true,
            confirmation_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    pub tx_hash: TxHash,
    pub submitted_at: DateTime<Utc>,
    pub session_epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionPhase {
    #[default]
    Idle,
    Submitting {
        kind: ActionKind,
    },
    Pending {
        kind: ActionKind,
        record: PendingRecord,
    },
    Confirmed(TransactionOutcome),
    Failed(TransactionOutcome),
}

impl ActionPhase {
    pub fn kind(&self) -> Option<ActionKind> {
        match self {
            ActionPhase::Idle => None,
            ActionPhase::Submitting { kind } | ActionPhase::Pending { kind, .. } => Some(*kind),
            ActionPhase::Confirmed(outcome) | ActionPhase::Failed(outcome) => Some(outcome.kind),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ActionPhase::Idle)
    }
}

/// Result of a confirmed action together with what happened to the follow-up refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReceipt {
    pub outcome: TransactionOutcome,
    pub refresh: Result<RefreshDisposition, LotteryError>,
}

/// Returns the coordinator to `Idle` however the action ends.
struct PhaseGuard<'a> {
    phase: &'a watch::Sender<ActionPhase>,
}

impl PhaseGuard<'_> {
    fn set(&self, next: ActionPhase) {
        debug!(phase = ?next, "action phase");
        self.phase.send_replace(next);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.send_replace(ActionPhase::Idle);
    }
}

pub struct ActionCoordinator {
    store: Arc<SnapshotStore>,
    reader: StateReader,
    policy: ActionPolicy,
    phase: watch::Sender<ActionPhase>,
}

impl ActionCoordinator {
    pub fn new(store: Arc<SnapshotStore>, reader: StateReader, policy: ActionPolicy) -> Self {
        let (phase, _) = watch::channel(ActionPhase::Idle);
        Self {
            store,
            reader,
            policy,
            phase,
        }
    }

    pub fn policy(&self) -> &ActionPolicy {
        &self.policy
    }

    pub fn phase(&self) -> ActionPhase {
        self.phase.borrow().clone()
    }

    pub fn watch_phase(&self) -> watch::Receiver<ActionPhase> {
        self.phase.subscribe()
    }

    pub async fn enter(&self, client: &ContractClient) -> Result<ActionReceipt, LotteryError> {
        self.execute(client, ActionRequest::enter(self.policy.entry_stake))
            .await
    }

    pub async fn pick_winner(&self, client: &ContractClient) -> Result<ActionReceipt, LotteryError> {
        self.execute(client, ActionRequest::plain(ActionKind::PickWinner))
            .await
    }

    pub async fn claim_prize(&self, client: &ContractClient) -> Result<ActionReceipt, LotteryError> {
        self.execute(client, ActionRequest::plain(ActionKind::ClaimPrize))
            .await
    }

    pub async fn reset_lottery(
        &self,
        client: &ContractClient,
    ) -> Result<ActionReceipt, LotteryError> {
        self.execute(client, ActionRequest::plain(ActionKind::ResetLottery))
            .await
    }

    async fn execute(
        &self,
        client: &ContractClient,
        request: ActionRequest,
    ) -> Result<ActionReceipt, LotteryError> {
        let kind = request.kind;
        let guard = self.try_begin(kind)?;
        let origin_epoch = self.store.session().epoch;

        let snapshot = self.synchronized_snapshot(client)?;
        if let Err(err) = check_preconditions(kind, &snapshot, client.signer(), &self.policy) {
            debug!(action = %kind, signer = %client.signer(), error = %err, "action rejected locally");
            return Err(err);
        }

        info!(action = %kind, signer = %client.signer(), value = %request.value, "submitting transaction");
        let pending = match client.submit(&request).await {
            Ok(pending) => pending,
            Err(err) => {
                let err = LotteryError::from(err);
                warn!(action = %kind, error = %err, "transaction submission failed");
                guard.set(ActionPhase::Failed(TransactionOutcome::failed(
                    kind, None, &err,
                )));
                return Err(err);
            }
        };

        let tx_hash = pending.hash().clone();
        guard.set(ActionPhase::Pending {
            kind,
            record: PendingRecord {
                tx_hash: tx_hash.clone(),
                submitted_at: Utc::now(),
                session_epoch: origin_epoch,
            },
        });

        if let Err(err) = self.await_confirmation(kind, pending).await {
            warn!(action = %kind, tx = %tx_hash, error = %err, "transaction failed");
            guard.set(ActionPhase::Failed(TransactionOutcome::failed(
                kind,
                Some(tx_hash),
                &err,
            )));
            return Err(err);
        }

        let outcome = TransactionOutcome::confirmed(kind, tx_hash.clone());
        guard.set(ActionPhase::Confirmed(outcome.clone()));
        info!(action = %kind, tx = %tx_hash, "transaction confirmed");

        let refresh = if self.store.session().epoch != origin_epoch {
            warn!(
                action = %kind,
                tx = %tx_hash,
                origin_epoch,
                "session changed while transaction was pending; discarding completion"
            );
            Ok(RefreshDisposition::StaleSession)
        } else {
            self.reader
                .refresh_into(&self.store, origin_epoch, client)
                .await
        };
        Ok(ActionReceipt { outcome, refresh })
    }

    fn try_begin(&self, kind: ActionKind) -> Result<PhaseGuard<'_>, LotteryError> {
        let mut active = None;
        let acquired = self.phase.send_if_modified(|phase| {
            if phase.is_idle() {
                *phase = ActionPhase::Submitting { kind };
                true
            } else {
                active = phase.kind();
                false
            }
        });
        if !acquired {
            let active = active.unwrap_or(kind);
            debug!(requested = %kind, %active, "coordinator busy");
            return Err(LotteryError::Busy { active });
        }
        Ok(PhaseGuard { phase: &self.phase })
    }

    fn synchronized_snapshot(
        &self,
        client: &ContractClient,
    ) -> Result<Arc<LotterySnapshot>, LotteryError> {
        let snapshot = self.store.current().ok_or_else(|| {
            LotteryError::NotSynchronized("no snapshot has been read for this session".into())
        })?;
        if snapshot.account != *client.signer() {
            return Err(LotteryError::NotSynchronized(format!(
                "snapshot was read for {}, signer is {}",
                snapshot.account,
                client.signer()
            )));
        }
        Ok(snapshot)
    }

    async fn await_confirmation(
        &self,
        kind: ActionKind,
        pending: Box<dyn PendingTransaction>,
    ) -> Result<(), LotteryError> {
        let Some(limit) = self.policy.confirmation_timeout else {
            return pending.wait().await.map_err(LotteryError::from);
        };

        let tx_hash = pending.hash().clone();
        let mut confirmation = tokio::spawn(pending.wait());
        match timeout(limit, &mut confirmation).await {
            Ok(Ok(result)) => result.map_err(LotteryError::from),
            Ok(Err(join_err)) => Err(LotteryError::Rejected(format!(
                "confirmation task failed: {join_err}"
            ))),
            Err(_) => {
                let late_hash = tx_hash.clone();
                tokio::spawn(async move {
                    match confirmation.await {
                        Ok(Ok(())) => warn!(
                            action = %kind,
                            tx = %late_hash,
                            "late confirmation after local timeout; not applied"
                        ),
                        Ok(Err(err)) => warn!(
                            action = %kind,
                            tx = %late_hash,
                            error = %err,
                            "late failure after local timeout"
                        ),
                        Err(join_err) => {
                            debug!(tx = %late_hash, error = %join_err, "late confirmation task ended")
                        }
                    }
                });
                Err(LotteryError::TimedOut {
                    tx_hash,
                    after: limit,
                })
            }
        }
    }
}

/// Client-side gate evaluated before any ledger call.
pub fn check_preconditions(
    kind: ActionKind,
    snapshot: &LotterySnapshot,
    caller: &Address,
    policy: &ActionPolicy,
) -> Result<(), LotteryError> {
    match kind {
        ActionKind::Enter => {
            if snapshot.status {
                return Err(LotteryError::LotteryClosed);
            }
            if snapshot.entered_by_current {
                return Err(LotteryError::AlreadyEntered {
                    caller: caller.clone(),
                });
            }
            if !policy.allow_owner_entry && snapshot.is_owner(caller) {
                return Err(LotteryError::OwnerEntryDisabled);
            }
        }
        ActionKind::PickWinner => {
            if !snapshot.is_owner(caller) {
                return Err(LotteryError::NotOwner {
                    caller: caller.clone(),
                });
            }
            if snapshot.status {
                return Err(LotteryError::LotteryClosed);
            }
        }
        ActionKind::ClaimPrize => {
            if !snapshot.status || !snapshot.is_winner(caller) {
                return Err(LotteryError::NotWinner {
                    caller: caller.clone(),
                });
            }
            if snapshot.claimed {
                return Err(LotteryError::AlreadyClaimed);
            }
        }
        ActionKind::ResetLottery => {
            if !snapshot.is_owner(caller) {
                return Err(LotteryError::NotOwner {
                    caller: caller.clone(),
                });
            }
            if !(snapshot.status && snapshot.claimed) {
                return Err(LotteryError::NotResettable {
                    status: snapshot.status,
                    claimed: snapshot.claimed,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
