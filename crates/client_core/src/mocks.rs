//! In-memory stand-ins for the ledger and the host identity provider.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{
    domain::{Address, TxHash, Wei},
    error::{LedgerError, LotteryError},
    protocol::{ActionKind, ActionRequest, LedgerRead},
};
use tokio::sync::{broadcast, oneshot};

use crate::{
    contract::{LotteryLedger, PendingTransaction},
    session::{IdentityEvent, IdentityProvider},
};

/// Contract address used by fixtures.
pub fn contract_address() -> Address {
    Address::from_low_u64(0xc0de)
}

#[derive(Debug, Clone, Default)]
struct LotteryState {
    status: bool,
    winner: Option<Address>,
    players: Vec<Address>,
    entered: HashSet<Address>,
    claimed: bool,
}

struct QueuedWrite {
    from: Address,
    request: ActionRequest,
    done: oneshot::Sender<Result<(), LedgerError>>,
}

#[derive(Default)]
struct LedgerInner {
    lottery: LotteryState,
    next_tx: u64,
    next_winner: Option<Address>,
    hold_confirmations: bool,
    queued: VecDeque<QueuedWrite>,
    fail_next_send: Option<LedgerError>,
    failing_reads: HashSet<&'static str>,
    read_overrides: HashMap<&'static str, Value>,
    sends: Vec<(Address, ActionKind)>,
    reads: usize,
}

/// Lottery contract simulator enforcing the same rules the deployed contract does.
pub struct InMemoryLedger {
    manager: Address,
    min_stake: Wei,
    inner: Mutex<LedgerInner>,
}

impl InMemoryLedger {
    pub fn new(manager: Address) -> Self {
        Self {
            manager,
            min_stake: Wei::from_milli_ether(1),
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    pub fn manager(&self) -> &Address {
        &self.manager
    }

    /// Queue writes until [`confirm_next`](Self::confirm_next) instead of mining them at once.
    pub fn hold_confirmations(&self) {
        self.lock().hold_confirmations = true;
    }

    pub fn queued_writes(&self) -> usize {
        self.lock().queued.len()
    }

    /// Mines the oldest queued write. Returns false when nothing was queued.
    pub fn confirm_next(&self) -> bool {
        let mut inner = self.lock();
        let Some(write) = inner.queued.pop_front() else {
            return false;
        };
        let result = self.execute(&mut inner, &write.from, &write.request);
        let _ = write.done.send(result);
        true
    }

    pub fn fail_next_send(&self, err: LedgerError) {
        self.lock().fail_next_send = Some(err);
    }

    pub fn fail_read(&self, method: &'static str) {
        self.lock().failing_reads.insert(method);
    }

    pub fn clear_read_failures(&self) {
        self.lock().failing_reads.clear();
    }

    /// Replaces the raw result of `method` with an arbitrary JSON value.
    pub fn override_read(&self, method: &'static str, value: Value) {
        self.lock().read_overrides.insert(method, value);
    }

    pub fn set_next_winner(&self, winner: Address) {
        self.lock().next_winner = Some(winner);
    }

    /// Mines a write for `from` directly, bypassing any client.
    pub fn apply_external(&self, from: &Address, request: &ActionRequest) -> Result<(), LedgerError> {
        let mut inner = self.lock();
        self.execute(&mut inner, from, request)
    }

    pub fn send_count(&self) -> usize {
        self.lock().sends.len()
    }

    pub fn sends(&self) -> Vec<(Address, ActionKind)> {
        self.lock().sends.clone()
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    pub fn players(&self) -> Vec<Address> {
        self.lock().lottery.players.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn execute(
        &self,
        inner: &mut LedgerInner,
        from: &Address,
        request: &ActionRequest,
    ) -> Result<(), LedgerError> {
        let lottery = &mut inner.lottery;
        match request.kind {
            ActionKind::Enter => {
                if lottery.status {
                    return Err(LedgerError::Revert("lottery already drawn".into()));
                }
                if lottery.entered.contains(from) {
                    return Err(LedgerError::Revert("already entered".into()));
                }
                if request.value < self.min_stake {
                    return Err(LedgerError::Revert("stake below minimum".into()));
                }
                lottery.entered.insert(from.clone());
                lottery.players.push(from.clone());
            }
            ActionKind::PickWinner => {
                if *from != self.manager {
                    return Err(LedgerError::Revert("only manager".into()));
                }
                if lottery.status {
                    return Err(LedgerError::Revert("winner already picked".into()));
                }
                let Some(first) = lottery.players.first().cloned() else {
                    return Err(LedgerError::Revert("no players".into()));
                };
                let winner = inner
                    .next_winner
                    .take()
                    .filter(|candidate| lottery.entered.contains(candidate))
                    .unwrap_or(first);
                lottery.winner = Some(winner);
                lottery.status = true;
            }
            ActionKind::ClaimPrize => {
                if !lottery.status || lottery.winner.as_ref() != Some(from) {
                    return Err(LedgerError::Revert("only winner".into()));
                }
                if lottery.claimed {
                    return Err(LedgerError::Revert("already claimed".into()));
                }
                lottery.claimed = true;
            }
            ActionKind::ResetLottery => {
                if *from != self.manager {
                    return Err(LedgerError::Revert("only manager".into()));
                }
                if !(lottery.status && lottery.claimed) {
                    return Err(LedgerError::Revert("round not settled".into()));
                }
                *lottery = LotteryState::default();
            }
        }
        Ok(())
    }
}

struct MockPendingTransaction {
    hash: TxHash,
    done: oneshot::Receiver<Result<(), LedgerError>>,
}

#[async_trait]
impl PendingTransaction for MockPendingTransaction {
    fn hash(&self) -> &TxHash {
        &self.hash
    }

    async fn wait(self: Box<Self>) -> Result<(), LedgerError> {
        self.done
            .await
            .unwrap_or_else(|_| Err(LedgerError::Transport("transaction dropped".into())))
    }
}

#[async_trait]
impl LotteryLedger for InMemoryLedger {
    async fn call(&self, _contract: &Address, _from: &Address, read: LedgerRead) -> Result<Value> {
        let mut inner = self.lock();
        inner.reads += 1;
        let method = read.method();
        if inner.failing_reads.contains(method) {
            return Err(anyhow!("node unavailable while reading {method}"));
        }
        if let Some(value) = inner.read_overrides.get(method) {
            return Ok(value.clone());
        }
        let lottery = &inner.lottery;
        Ok(match read {
            LedgerRead::Status => json!(lottery.status),
            LedgerRead::GetWinner => {
                json!(lottery.winner.clone().unwrap_or_else(Address::zero).as_str())
            }
            LedgerRead::GetPlayers => json!(lottery
                .players
                .iter()
                .map(Address::as_str)
                .collect::<Vec<_>>()),
            LedgerRead::GetManager => json!(self.manager.as_str()),
            LedgerRead::Claimed => json!(lottery.claimed),
            LedgerRead::Entered { account } => json!(lottery.entered.contains(&account)),
        })
    }

    async fn send(
        &self,
        _contract: &Address,
        from: &Address,
        request: &ActionRequest,
    ) -> Result<Box<dyn PendingTransaction>, LedgerError> {
        let mut inner = self.lock();
        inner.sends.push((from.clone(), request.kind));
        if let Some(err) = inner.fail_next_send.take() {
            return Err(err);
        }

        inner.next_tx += 1;
        let hash = TxHash(format!("0x{:064x}", inner.next_tx));
        let (done_tx, done_rx) = oneshot::channel();
        if inner.hold_confirmations {
            inner.queued.push_back(QueuedWrite {
                from: from.clone(),
                request: request.clone(),
                done: done_tx,
            });
        } else {
            let result = self.execute(&mut inner, from, request);
            let _ = done_tx.send(result);
        }
        Ok(Box::new(MockPendingTransaction {
            hash,
            done: done_rx,
        }))
    }
}

/// Host wallet stand-in with scriptable account switching.
pub struct MockIdentityProvider {
    accounts: Mutex<Vec<Address>>,
    reject_access: AtomicBool,
    access_requests: AtomicUsize,
    events: broadcast::Sender<IdentityEvent>,
}

impl MockIdentityProvider {
    pub fn new(accounts: Vec<Address>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(accounts),
            reject_access: AtomicBool::new(false),
            access_requests: AtomicUsize::new(0),
            events,
        }
    }

    pub fn reject_access(&self) {
        self.reject_access.store(true, Ordering::SeqCst);
    }

    pub fn access_requests(&self) -> usize {
        self.access_requests.load(Ordering::SeqCst)
    }

    /// Makes `address` the active account (or disconnects) and notifies subscribers.
    pub fn switch_to(&self, address: Option<Address>) {
        let accounts: Vec<Address> = address.into_iter().collect();
        *self.lock_accounts() = accounts.clone();
        let _ = self.events.send(IdentityEvent::IdentityChanged(accounts));
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn lock_accounts(&self) -> std::sync::MutexGuard<'_, Vec<Address>> {
        self.accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn request_access(&self) -> Result<Vec<Address>, LotteryError> {
        self.access_requests.fetch_add(1, Ordering::SeqCst);
        if self.reject_access.load(Ordering::SeqCst) {
            return Err(LotteryError::UserRejected);
        }
        Ok(self.lock_accounts().clone())
    }

    async fn list_active_addresses(&self) -> Result<Vec<Address>, LotteryError> {
        Ok(self.lock_accounts().clone())
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<IdentityEvent>, LotteryError> {
        Ok(self.events.subscribe())
    }
}
