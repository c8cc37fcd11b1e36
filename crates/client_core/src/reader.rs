//! Consistent snapshot reads: six ledger calls, all-or-nothing.

use serde_json::Value;
use shared::{
    domain::{Address, LotterySnapshot},
    error::{AddressError, LotteryError},
    protocol::LedgerRead,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    contract::ContractClient,
    store::{RefreshDisposition, SnapshotStore},
};

#[derive(Debug, Error)]
enum DecodeError {
    #[error("{method}: expected {expected}, got {actual}")]
    Shape {
        method: &'static str,
        expected: &'static str,
        actual: Value,
    },
    #[error("{method}: {source}")]
    Address {
        method: &'static str,
        source: AddressError,
    },
    #[error("{method}: manager address is empty")]
    EmptyManager { method: &'static str },
}

impl From<DecodeError> for LotteryError {
    fn from(value: DecodeError) -> Self {
        LotteryError::Read(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StateReader;

impl StateReader {
    pub fn new() -> Self {
        Self
    }

    /// Reads every field for `address` and assembles one validated snapshot.
    pub async fn refresh(
        &self,
        client: &ContractClient,
        address: &Address,
    ) -> Result<LotterySnapshot, LotteryError> {
        let (status, winner, players, owner, claimed, entered) = futures::try_join!(
            read_field(client, LedgerRead::Status),
            read_field(client, LedgerRead::GetWinner),
            read_field(client, LedgerRead::GetPlayers),
            read_field(client, LedgerRead::GetManager),
            read_field(client, LedgerRead::Claimed),
            read_field(
                client,
                LedgerRead::Entered {
                    account: address.clone(),
                }
            ),
        )?;

        let snapshot = LotterySnapshot {
            account: address.clone(),
            status: decode_bool("status", status)?,
            winner: decode_optional_address("getWinner", winner)?,
            players: decode_address_list("getPlayers", players)?,
            owner: decode_manager("getManager", owner)?,
            claimed: decode_bool("claimed", claimed)?,
            entered_by_current: decode_bool("entered", entered)?,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Refreshes for the session `epoch` and publishes unless superseded.
    pub async fn refresh_into(
        &self,
        store: &SnapshotStore,
        epoch: u64,
        client: &ContractClient,
    ) -> Result<RefreshDisposition, LotteryError> {
        let Some(ticket) = store.begin_refresh(epoch) else {
            debug!(epoch, "skipping refresh for inactive session");
            return Ok(RefreshDisposition::StaleSession);
        };
        match self.refresh(client, client.signer()).await {
            Ok(snapshot) => Ok(store.apply(ticket, snapshot)),
            Err(err) => {
                warn!(epoch, signer = %client.signer(), error = %err, "refresh discarded");
                Err(err)
            }
        }
    }
}

async fn read_field(client: &ContractClient, read: LedgerRead) -> Result<Value, LotteryError> {
    let method = read.method();
    client
        .read(read)
        .await
        .map_err(|err| LotteryError::Read(format!("{method}: {err:#}")))
}

fn decode_bool(method: &'static str, value: Value) -> Result<bool, DecodeError> {
    match value {
        Value::Bool(flag) => Ok(flag),
        actual => Err(DecodeError::Shape {
            method,
            expected: "bool",
            actual,
        }),
    }
}

fn decode_address(method: &'static str, value: Value) -> Result<Address, DecodeError> {
    match value {
        Value::String(raw) => {
            Address::parse(&raw).map_err(|source| DecodeError::Address { method, source })
        }
        actual => Err(DecodeError::Shape {
            method,
            expected: "address string",
            actual,
        }),
    }
}

fn decode_optional_address(
    method: &'static str,
    value: Value,
) -> Result<Option<Address>, DecodeError> {
    let address = decode_address(method, value)?;
    Ok((!address.is_zero()).then_some(address))
}

fn decode_manager(method: &'static str, value: Value) -> Result<Address, DecodeError> {
    decode_optional_address(method, value)?.ok_or(DecodeError::EmptyManager { method })
}

fn decode_address_list(method: &'static str, value: Value) -> Result<Vec<Address>, DecodeError> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| decode_address(method, item))
            .collect(),
        actual => Err(DecodeError::Shape {
            method,
            expected: "address array",
            actual,
        }),
    }
}

#[cfg(test)]
#[path = "tests/reader_tests.rs"]
mod tests;
