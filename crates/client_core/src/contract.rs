//! Ledger seam and identity-scoped contract clients.

use std::{fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{Address, TxHash},
    error::{LedgerError, LotteryError},
    protocol::{ActionRequest, LedgerRead},
};

/// Method surface of the deployed lottery contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractInterface {
    pub name: &'static str,
    pub reads: &'static [&'static str],
    pub writes: &'static [&'static str],
}

pub const LOTTERY_INTERFACE: ContractInterface = ContractInterface {
    name: "Lottery",
    reads: &[
        "status",
        "getWinner",
        "getPlayers",
        "getManager",
        "claimed",
        "entered",
    ],
    writes: &["enter", "pickWinner", "claimPrize", "resetLottery"],
};

/// A submitted write whose block confirmation has not been observed yet.
#[async_trait]
pub trait PendingTransaction: Send {
    fn hash(&self) -> &TxHash;
    async fn wait(self: Box<Self>) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait LotteryLedger: Send + Sync {
    /// Returns the raw, dynamically shaped result of a read-only call.
    async fn call(&self, contract: &Address, from: &Address, read: LedgerRead) -> Result<Value>;

    async fn send(
        &self,
        contract: &Address,
        from: &Address,
        request: &ActionRequest,
    ) -> Result<Box<dyn PendingTransaction>, LedgerError>;
}

/// Contract binding for one signer. Rebuilt, never mutated, when the session changes.
#[derive(Clone)]
pub struct ContractClient {
    contract: Address,
    interface: &'static ContractInterface,
    signer: Address,
    ledger: Arc<dyn LotteryLedger>,
}

impl ContractClient {
    pub fn contract(&self) -> &Address {
        &self.contract
    }

    pub fn interface(&self) -> &'static ContractInterface {
        self.interface
    }

    pub fn signer(&self) -> &Address {
        &self.signer
    }

    pub async fn read(&self, read: LedgerRead) -> Result<Value> {
        self.ledger.call(&self.contract, &self.signer, read).await
    }

    pub async fn submit(
        &self,
        request: &ActionRequest,
    ) -> Result<Box<dyn PendingTransaction>, LedgerError> {
        self.ledger.send(&self.contract, &self.signer, request).await
    }
}

impl fmt::Debug for ContractClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractClient")
            .field("contract", &self.contract)
            .field("interface", &self.interface.name)
            .field("signer", &self.signer)
            .finish()
    }
}

pub struct ContractClientFactory {
    contract: Address,
    ledger: Arc<dyn LotteryLedger>,
}

impl ContractClientFactory {
    pub fn new(contract: Address, ledger: Arc<dyn LotteryLedger>) -> Self {
        Self { contract, ledger }
    }

    pub fn contract(&self) -> &Address {
        &self.contract
    }

    pub fn build(&self, address: Option<&Address>) -> Result<ContractClient, LotteryError> {
        let signer = match address {
            Some(address) if !address.is_zero() => address.clone(),
            Some(_) => {
                return Err(LotteryError::Binding(
                    "signer address is the zero address".into(),
                ))
            }
            None => return Err(LotteryError::Binding("no active identity".into())),
        };
        Ok(ContractClient {
            contract: self.contract.clone(),
            interface: &LOTTERY_INTERFACE,
            signer,
            ledger: Arc::clone(&self.ledger),
        })
    }
}

#[cfg(test)]
#[path = "tests/contract_tests.rs"]
mod tests;
