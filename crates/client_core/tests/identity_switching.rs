use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use client_core::{
    mocks::{contract_address, InMemoryLedger, MockIdentityProvider},
    LotteryClient, LotteryLedger, PendingTransaction, Settings,
};
use serde_json::Value;
use shared::{
    domain::Address,
    error::{LedgerError, LotteryError},
    protocol::{ActionRequest, LedgerRead},
};
use tokio::time::{sleep, timeout};

const MANAGER: u64 = 0x01;
const ALICE: u64 = 0xaa;
const BOB: u64 = 0xbb;
const CAROL: u64 = 0xcc;

fn addr(value: u64) -> Address {
    Address::from_low_u64(value)
}

/// Never answers reads issued on behalf of one account.
struct StallingLedger {
    inner: Arc<InMemoryLedger>,
    stalled: Address,
    stalled_reads: AtomicUsize,
}

#[async_trait]
impl LotteryLedger for StallingLedger {
    async fn call(
        &self,
        contract: &Address,
        from: &Address,
        read: LedgerRead,
    ) -> anyhow::Result<Value> {
        if *from == self.stalled {
            self.stalled_reads.fetch_add(1, Ordering::SeqCst);
            futures::future::pending::<()>().await;
        }
        self.inner.call(contract, from, read).await
    }

    async fn send(
        &self,
        contract: &Address,
        from: &Address,
        request: &ActionRequest,
    ) -> Result<Box<dyn PendingTransaction>, LedgerError> {
        self.inner.send(contract, from, request).await
    }
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let polled = timeout(Duration::from_secs(2), async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    if polled.is_err() {
        panic!("timed out waiting for {what}");
    }
}

#[tokio::test]
async fn identity_changes_are_followed_while_a_refresh_is_stalled() {
    let inner = Arc::new(InMemoryLedger::new(addr(MANAGER)));
    let ledger = Arc::new(StallingLedger {
        inner: inner.clone(),
        stalled: addr(BOB),
        stalled_reads: AtomicUsize::new(0),
    });
    let provider = Arc::new(MockIdentityProvider::new(vec![addr(ALICE)]));
    let client = LotteryClient::new(
        &Settings::new(contract_address()),
        provider.clone(),
        ledger.clone(),
    );
    client.start().await.expect("start");

    provider.switch_to(Some(addr(BOB)));
    {
        let client = client.clone();
        let ledger = ledger.clone();
        eventually("bob's refresh to stall", move || {
            client.session().address == Some(addr(BOB))
                && ledger.stalled_reads.load(Ordering::SeqCst) > 0
        })
        .await;
    }
    assert!(client.snapshot().is_none());
    assert!(matches!(
        client.enter().await,
        Err(LotteryError::NotSynchronized(_))
    ));
    assert_eq!(inner.send_count(), 0);

    provider.switch_to(Some(addr(CAROL)));
    {
        let client = client.clone();
        eventually("carol's snapshot", move || {
            client
                .snapshot()
                .is_some_and(|snapshot| snapshot.account == addr(CAROL))
        })
        .await;
    }
    assert_eq!(client.session().address, Some(addr(CAROL)));

    client.enter().await.expect("carol enters");
    assert_eq!(
        inner.sends().first().map(|(from, _)| from.clone()),
        Some(addr(CAROL))
    );
    assert_eq!(inner.players(), vec![addr(CAROL)]);

    client.stop().await;
}

#[tokio::test]
async fn identity_returning_after_disconnect_is_bound_and_synchronized() {
    let inner = Arc::new(InMemoryLedger::new(addr(MANAGER)));
    let provider = Arc::new(MockIdentityProvider::new(vec![addr(ALICE)]));
    let client = LotteryClient::new(
        &Settings::new(contract_address()),
        provider.clone(),
        inner.clone(),
    );
    client.start().await.expect("start");

    client.disconnect().await.expect("disconnect");
    provider.switch_to(Some(addr(BOB)));
    {
        let client = client.clone();
        eventually("bob's snapshot", move || {
            client
                .snapshot()
                .is_some_and(|snapshot| snapshot.account == addr(BOB))
        })
        .await;
    }

    let session = client.session();
    assert_eq!(session.address, Some(addr(BOB)));
    assert_eq!(session.epoch, 3);
    client.enter().await.expect("bob enters");
    assert_eq!(inner.players(), vec![addr(BOB)]);
}
