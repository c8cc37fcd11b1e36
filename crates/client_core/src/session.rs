//! Active identity tracking on top of the host identity provider.

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use shared::{
    domain::{Address, Session},
    error::LotteryError,
};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    /// New list of active addresses; empty on full disconnect.
    IdentityChanged(Vec<Address>),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn request_access(&self) -> Result<Vec<Address>, LotteryError>;
    async fn list_active_addresses(&self) -> Result<Vec<Address>, LotteryError>;
    fn subscribe(&self) -> Result<broadcast::Receiver<IdentityEvent>, LotteryError>;
}

pub struct MissingIdentityProvider;

#[async_trait]
impl IdentityProvider for MissingIdentityProvider {
    async fn request_access(&self) -> Result<Vec<Address>, LotteryError> {
        Err(LotteryError::ProviderUnavailable)
    }

    async fn list_active_addresses(&self) -> Result<Vec<Address>, LotteryError> {
        Err(LotteryError::ProviderUnavailable)
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<IdentityEvent>, LotteryError> {
        Err(LotteryError::ProviderUnavailable)
    }
}

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    session: Arc<watch::Sender<Session>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (session, _) = watch::channel(Session::disconnected());
        Self {
            provider,
            session: Arc::new(session),
            listener: Mutex::new(None),
        }
    }

    pub fn current(&self) -> Session {
        self.session.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    /// Prompts the provider for access and makes the first granted address active.
    pub async fn connect(&self) -> Result<Address, LotteryError> {
        let accounts = self.provider.request_access().await?;
        let Some(address) = accounts.into_iter().next() else {
            warn!("identity provider granted access to no accounts");
            return Err(LotteryError::UserRejected);
        };
        let session = replace_session(&self.session, Some(address.clone()));
        info!(address = %address, epoch = session.epoch, "session connected");
        Ok(address)
    }

    /// Adopts an already-authorized address without prompting, if there is one.
    pub async fn resume(&self) -> Result<Option<Address>, LotteryError> {
        let accounts = self.provider.list_active_addresses().await?;
        let Some(address) = accounts.into_iter().next() else {
            debug!("no previously authorized account to resume");
            return Ok(None);
        };
        let session = replace_session(&self.session, Some(address.clone()));
        info!(address = %address, epoch = session.epoch, "session resumed");
        Ok(Some(address))
    }

    pub fn disconnect(&self) -> Session {
        let session = replace_session(&self.session, None);
        info!(epoch = session.epoch, "session disconnected");
        session
    }

    /// Installs the single identity-change listener, releasing any previous one.
    pub async fn on_identity_change<F, Fut>(&self, handler: F) -> Result<(), LotteryError>
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut listener = self.listener.lock().await;
        release(listener.take()).await;

        let mut events = self.provider.subscribe()?;
        let session = Arc::clone(&self.session);
        *listener = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(IdentityEvent::IdentityChanged(accounts)) => {
                        let next = replace_session(&session, accounts.into_iter().next());
                        info!(
                            address = ?next.address.as_ref().map(Address::as_str),
                            epoch = next.epoch,
                            "identity changed"
                        );
                        handler(next).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "identity notifications lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!("identity provider closed its notification channel");
                        break;
                    }
                }
            }
        }));
        Ok(())
    }

    pub async fn stop(&self) {
        let mut listener = self.listener.lock().await;
        release(listener.take()).await;
    }

    pub async fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(task) = self.listener.get_mut().take() {
            task.abort();
        }
    }
}

fn replace_session(session: &watch::Sender<Session>, address: Option<Address>) -> Session {
    let mut replaced = Session::disconnected();
    session.send_modify(|current| {
        *current = current.succeed(address);
        replaced = current.clone();
    });
    replaced
}

async fn release(task: Option<JoinHandle<()>>) {
    if let Some(task) = task {
        task.abort();
        let _ = task.await;
        debug!("released identity subscription");
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
