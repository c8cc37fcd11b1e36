use super::*;
use crate::mocks::MockIdentityProvider;
use std::time::Duration;
use tokio::{sync::mpsc, time::timeout};

fn addr(value: u64) -> Address {
    Address::from_low_u64(value)
}

fn collecting_handler(
    tx: mpsc::UnboundedSender<Session>,
) -> impl Fn(Session) -> futures::future::Ready<()> + Send + Sync + 'static {
    move |session| {
        let _ = tx.send(session);
        futures::future::ready(())
    }
}

async fn next_session(rx: &mut mpsc::UnboundedReceiver<Session>) -> Session {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("identity handler was not invoked")
        .expect("handler channel closed")
}

#[tokio::test]
async fn connect_activates_first_granted_address() {
    let provider = Arc::new(MockIdentityProvider::new(vec![addr(0xaa), addr(0xbb)]));
    let manager = SessionManager::new(provider.clone());

    let address = manager.connect().await.expect("connect");

    assert_eq!(address, addr(0xaa));
    assert_eq!(
        manager.current(),
        Session {
            address: Some(addr(0xaa)),
            epoch: 1
        }
    );
    assert_eq!(provider.access_requests(), 1);
}

#[tokio::test]
async fn connect_without_provider_is_unavailable() {
    let manager = SessionManager::new(Arc::new(MissingIdentityProvider));

    assert_eq!(
        manager.connect().await,
        Err(LotteryError::ProviderUnavailable)
    );
    assert_eq!(
        manager.on_identity_change(|_| async {}).await,
        Err(LotteryError::ProviderUnavailable)
    );
    assert_eq!(manager.current(), Session::disconnected());
}

#[tokio::test]
async fn declined_or_empty_access_is_user_rejection() {
    let provider = Arc::new(MockIdentityProvider::new(vec![addr(0xaa)]));
    provider.reject_access();
    let manager = SessionManager::new(provider);
    assert_eq!(manager.connect().await, Err(LotteryError::UserRejected));

    let manager = SessionManager::new(Arc::new(MockIdentityProvider::new(Vec::new())));
    assert_eq!(manager.connect().await, Err(LotteryError::UserRejected));
    assert!(!manager.current().is_connected());
}

#[tokio::test]
async fn resume_adopts_authorized_account_without_prompting() {
    let provider = Arc::new(MockIdentityProvider::new(vec![addr(0xcc)]));
    let manager = SessionManager::new(provider.clone());

    assert_eq!(manager.resume().await, Ok(Some(addr(0xcc))));
    assert_eq!(provider.access_requests(), 0);
    assert_eq!(manager.current().epoch, 1);

    let idle = SessionManager::new(Arc::new(MockIdentityProvider::new(Vec::new())));
    assert_eq!(idle.resume().await, Ok(None));
    assert_eq!(idle.current().epoch, 0);
}

#[tokio::test]
async fn identity_changes_replace_the_session_and_reach_the_handler() {
    let provider = Arc::new(MockIdentityProvider::new(vec![addr(0xaa)]));
    let manager = SessionManager::new(provider.clone());
    manager.connect().await.expect("connect");

    let (tx, mut rx) = mpsc::unbounded_channel();
    manager
        .on_identity_change(collecting_handler(tx))
        .await
        .expect("subscribe");

    provider.switch_to(Some(addr(0xbb)));
    let switched = next_session(&mut rx).await;
    assert_eq!(switched.address, Some(addr(0xbb)));
    assert_eq!(switched.epoch, 2);
    assert_eq!(manager.current(), switched);

    provider.switch_to(None);
    let disconnected = next_session(&mut rx).await;
    assert_eq!(disconnected.address, None);
    assert_eq!(disconnected.epoch, 3);
}

#[tokio::test]
async fn re_registering_keeps_a_single_subscription() {
    let provider = Arc::new(MockIdentityProvider::new(vec![addr(0xaa)]));
    let manager = SessionManager::new(provider.clone());

    let (first_tx, mut first_rx) = mpsc::unbounded_channel();
    manager
        .on_identity_change(collecting_handler(first_tx))
        .await
        .expect("first");
    let (second_tx, mut second_rx) = mpsc::unbounded_channel();
    manager
        .on_identity_change(collecting_handler(second_tx))
        .await
        .expect("second");

    assert_eq!(provider.subscriber_count(), 1);
    assert!(manager.is_listening().await);

    provider.switch_to(Some(addr(0xbb)));
    assert_eq!(next_session(&mut second_rx).await.address, Some(addr(0xbb)));
    assert!(first_rx.try_recv().is_err());

    manager.stop().await;
    assert_eq!(provider.subscriber_count(), 0);
    assert!(!manager.is_listening().await);
}

#[tokio::test]
async fn disconnect_clears_the_active_address() {
    let manager = SessionManager::new(Arc::new(MockIdentityProvider::new(vec![addr(0xaa)])));
    manager.connect().await.expect("connect");
    let mut watcher = manager.watch();

    let session = manager.disconnect();

    assert_eq!(session.address, None);
    assert_eq!(session.epoch, 2);
    assert!(watcher.has_changed().expect("watch open"));
    assert_eq!(watcher.borrow_and_update().clone(), session);
}
