use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{Address, TxHash, Wei},
    error::{ErrorKind, LotteryError},
};

/// Read-only calls exposed by the lottery contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "camelCase")]
pub enum LedgerRead {
    Status,
    GetWinner,
    GetPlayers,
    GetManager,
    Claimed,
    Entered { account: Address },
}

impl LedgerRead {
    pub fn method(&self) -> &'static str {
        match self {
            LedgerRead::Status => "status",
            LedgerRead::GetWinner => "getWinner",
            LedgerRead::GetPlayers => "getPlayers",
            LedgerRead::GetManager => "getManager",
            LedgerRead::Claimed => "claimed",
            LedgerRead::Entered { .. } => "entered",
        }
    }
}

/// State-changing calls exposed by the lottery contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Enter,
    PickWinner,
    ClaimPrize,
    ResetLottery,
}

impl ActionKind {
    pub fn method(self) -> &'static str {
        match self {
            ActionKind::Enter => "enter",
            ActionKind::PickWinner => "pickWinner",
            ActionKind::ClaimPrize => "claimPrize",
            ActionKind::ResetLottery => "resetLottery",
        }
    }

    pub fn is_payable(self) -> bool {
        matches!(self, ActionKind::Enter)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Enter => "enter",
            ActionKind::PickWinner => "pick_winner",
            ActionKind::ClaimPrize => "claim_prize",
            ActionKind::ResetLottery => "reset_lottery",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub kind: ActionKind,
    /// Attached value; zero for non-payable calls.
    pub value: Wei,
}

impl ActionRequest {
    pub fn enter(stake: Wei) -> Self {
        Self {
            kind: ActionKind::Enter,
            value: stake,
        }
    }

    pub fn plain(kind: ActionKind) -> Self {
        Self {
            kind,
            value: Wei::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl TransactionOutcome {
    pub fn confirmed(kind: ActionKind, tx_hash: TxHash) -> Self {
        Self {
            kind,
            tx_hash: Some(tx_hash),
            succeeded: true,
            error: None,
        }
    }

    pub fn failed(kind: ActionKind, tx_hash: Option<TxHash>, error: &LotteryError) -> Self {
        Self {
            kind,
            tx_hash,
            succeeded: false,
            error: Some(error.kind()),
        }
    }
}
