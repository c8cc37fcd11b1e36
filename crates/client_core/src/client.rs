use std::sync::{Arc, Weak};

use shared::{
    domain::{Address, LotterySnapshot, Session},
    error::{ErrorKind, LotteryError},
};
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    contract::{ContractClient, ContractClientFactory, LotteryLedger},
    coordinator::{ActionCoordinator, ActionPhase, ActionReceipt},
    reader::StateReader,
    session::{IdentityProvider, SessionManager},
    store::{RefreshDisposition, SnapshotStore},
    view::{project, Perspective, Role, ViewState},
};

#[derive(Debug, Clone)]
pub enum ClientEvent {
    SessionChanged(Session),
    SnapshotUpdated(Option<Arc<LotterySnapshot>>),
    ActionPhaseChanged(ActionPhase),
    Error { kind: ErrorKind, message: String },
}

/// Keeps the local lottery view in step with the active identity and the ledger.
pub struct LotteryClient {
    sessions: SessionManager,
    factory: ContractClientFactory,
    reader: StateReader,
    store: Arc<SnapshotStore>,
    coordinator: ActionCoordinator,
    contract_client: RwLock<Option<ContractClient>>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
    /// Refresh started by the latest identity change; aborted when the next one arrives.
    identity_refresh: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl LotteryClient {
    pub fn new(
        settings: &Settings,
        provider: Arc<dyn IdentityProvider>,
        ledger: Arc<dyn LotteryLedger>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let store = Arc::new(SnapshotStore::new());
        let reader = StateReader::new();
        Arc::new(Self {
            sessions: SessionManager::new(provider),
            factory: ContractClientFactory::new(settings.contract_address.clone(), ledger),
            reader,
            coordinator: ActionCoordinator::new(
                Arc::clone(&store),
                reader,
                settings.action_policy(),
            ),
            store,
            contract_client: RwLock::new(None),
            forwarders: Mutex::new(Vec::new()),
            identity_refresh: Mutex::new(None),
            events,
        })
    }

    /// Connects the identity, reads the first snapshot and starts following identity changes.
    pub async fn start(self: &Arc<Self>) -> Result<Address, LotteryError> {
        self.spawn_event_forwarders().await;

        let client = Arc::downgrade(self);
        self.sessions
            .on_identity_change(move |session| {
                let client: Weak<Self> = client.clone();
                async move {
                    if let Some(client) = client.upgrade() {
                        client.handle_identity_change(session).await;
                    }
                }
            })
            .await?;

        let address = self.sessions.connect().await?;
        self.rebind(self.sessions.current()).await?;
        info!(address = %address, contract = %self.factory.contract(), "lottery client started");

        if let Err(err) = self.refresh().await {
            self.report(&err);
        }
        Ok(address)
    }

    pub async fn stop(&self) {
        self.sessions.stop().await;
        self.cancel_identity_refresh().await;
        for task in self.forwarders.lock().await.drain(..) {
            task.abort();
        }
        info!("lottery client stopped");
    }

    /// Drops the active identity; actions fail with a binding error until an identity returns.
    pub async fn disconnect(&self) -> Result<(), LotteryError> {
        let session = self.sessions.disconnect();
        let epoch = session.epoch;
        self.rebind(session).await?;
        if self.store.session().epoch == epoch {
            self.cancel_identity_refresh().await;
        }
        info!("lottery client disconnected");
        Ok(())
    }

    /// Re-reads the ledger for the active session.
    pub async fn refresh(&self) -> Result<RefreshDisposition, LotteryError> {
        let epoch = self.store.session().epoch;
        let client = self.current_client().await?;
        self.reader.refresh_into(&self.store, epoch, &client).await
    }

    pub async fn enter(&self) -> Result<ActionReceipt, LotteryError> {
        let client = self.current_client().await?;
        self.coordinator.enter(&client).await
    }

    pub async fn pick_winner(&self) -> Result<ActionReceipt, LotteryError> {
        let client = self.current_client().await?;
        self.coordinator.pick_winner(&client).await
    }

    pub async fn claim_prize(&self) -> Result<ActionReceipt, LotteryError> {
        let client = self.current_client().await?;
        self.coordinator.claim_prize(&client).await
    }

    pub async fn reset_lottery(&self) -> Result<ActionReceipt, LotteryError> {
        let client = self.current_client().await?;
        self.coordinator.reset_lottery(&client).await
    }

    pub fn session(&self) -> Session {
        self.store.session()
    }

    pub fn snapshot(&self) -> Option<Arc<LotterySnapshot>> {
        self.store.current()
    }

    pub fn players(&self) -> Vec<Address> {
        self.snapshot()
            .map(|snapshot| snapshot.players.clone())
            .unwrap_or_default()
    }

    pub fn action_phase(&self) -> ActionPhase {
        self.coordinator.phase()
    }

    pub fn view(&self, perspective: Perspective) -> Option<ViewState> {
        let snapshot = self.store.current()?;
        let role = Role {
            address: Some(snapshot.account.clone()),
            perspective,
        };
        Some(project(&snapshot, &role))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    async fn current_client(&self) -> Result<ContractClient, LotteryError> {
        self.contract_client
            .read()
            .await
            .clone()
            .ok_or_else(|| LotteryError::Binding("no active session".into()))
    }

    /// Installs `session` and its client. Returns the client when the session was
    /// adopted and is connected; a session older than the store's is ignored.
    async fn rebind(&self, session: Session) -> Result<Option<ContractClient>, LotteryError> {
        let client = match session.address.as_ref() {
            Some(address) => Some(self.factory.build(Some(address))?),
            None => None,
        };
        let epoch = session.epoch;
        let mut slot = self.contract_client.write().await;
        if !self.store.reset_session(session) {
            debug!(epoch, "session already superseded; keeping current binding");
            return Ok(None);
        }
        *slot = client.clone();
        Ok(client)
    }

    async fn handle_identity_change(&self, session: Session) {
        let epoch = session.epoch;
        let client = match self.rebind(session).await {
            Ok(Some(client)) => client,
            Ok(None) => {
                if self.store.session().epoch == epoch {
                    self.cancel_identity_refresh().await;
                }
                return;
            }
            Err(err) => {
                self.report(&err);
                return;
            }
        };

        let store = Arc::clone(&self.store);
        let reader = self.reader;
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            match reader.refresh_into(&store, epoch, &client).await {
                Ok(disposition) => debug!(epoch, ?disposition, "identity refresh finished"),
                Err(err) => publish_error(&events, &err),
            }
        });
        if let Some(previous) = self.identity_refresh.lock().await.replace(task) {
            previous.abort();
        }
    }

    async fn cancel_identity_refresh(&self) {
        if let Some(task) = self.identity_refresh.lock().await.take() {
            task.abort();
        }
    }

    fn report(&self, err: &LotteryError) {
        publish_error(&self.events, err);
    }

    async fn spawn_event_forwarders(&self) {
        let mut forwarders = self.forwarders.lock().await;
        if !forwarders.is_empty() {
            return;
        }

        let mut sessions = self.sessions.watch();
        let events = self.events.clone();
        forwarders.push(tokio::spawn(async move {
            while sessions.changed().await.is_ok() {
                let session = sessions.borrow_and_update().clone();
                let _ = events.send(ClientEvent::SessionChanged(session));
            }
        }));

        let mut state = self.store.watch();
        let events = self.events.clone();
        forwarders.push(tokio::spawn(async move {
            while state.changed().await.is_ok() {
                let snapshot = state.borrow_and_update().snapshot.clone();
                let _ = events.send(ClientEvent::SnapshotUpdated(snapshot));
            }
        }));

        let mut phase = self.coordinator.watch_phase();
        let events = self.events.clone();
        forwarders.push(tokio::spawn(async move {
            while phase.changed().await.is_ok() {
                let current = phase.borrow_and_update().clone();
                let _ = events.send(ClientEvent::ActionPhaseChanged(current));
            }
        }));
    }
}

fn publish_error(events: &broadcast::Sender<ClientEvent>, err: &LotteryError) {
    warn!(error = %err, "lottery client error");
    let _ = events.send(ClientEvent::Error {
        kind: err.kind(),
        message: err.to_string(),
    });
}

impl Drop for LotteryClient {
    fn drop(&mut self) {
        if let Some(task) = self.identity_refresh.get_mut().take() {
            task.abort();
        }
        for task in self.forwarders.get_mut().drain(..) {
            task.abort();
        }
    }
}
