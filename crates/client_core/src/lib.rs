//! Lottery ledger client: session tracking, snapshot synchronization and
//! single-flight actions against a remote lottery contract.

mod client;
pub mod config;
pub mod contract;
pub mod coordinator;
pub mod reader;
pub mod session;
pub mod store;
pub mod view;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use client::{ClientEvent, LotteryClient};
pub use config::{load_settings, load_settings_from, Settings};
pub use contract::{
    ContractClient, ContractClientFactory, LotteryLedger, PendingTransaction, LOTTERY_INTERFACE,
};
pub use coordinator::{ActionCoordinator, ActionPhase, ActionPolicy, ActionReceipt};
pub use reader::StateReader;
pub use session::{IdentityEvent, IdentityProvider, MissingIdentityProvider, SessionManager};
pub use store::{RefreshDisposition, SnapshotStore};
pub use view::{project, Perspective, Role, ViewState};
