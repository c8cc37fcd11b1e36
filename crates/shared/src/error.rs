use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    domain::{Address, TxHash},
    protocol::ActionKind,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must have 40 hex digits, got {actual}")]
    InvalidLength { actual: usize },
    #[error("address contains non-hex characters")]
    InvalidHex,
}

/// Discriminant of [`LotteryError`], carried by outcomes and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderUnavailable,
    UserRejected,
    Binding,
    Read,
    NotOwner,
    NotWinner,
    AlreadyEntered,
    AlreadyClaimed,
    LotteryClosed,
    NotResettable,
    OwnerEntryDisabled,
    NotSynchronized,
    ContractRevert,
    InsufficientFunds,
    Rejected,
    TimedOut,
    Busy,
}

impl ErrorKind {
    /// Raised before any ledger call was issued.
    pub fn is_local_precondition(self) -> bool {
        matches!(
            self,
            ErrorKind::NotOwner
                | ErrorKind::NotWinner
                | ErrorKind::AlreadyEntered
                | ErrorKind::AlreadyClaimed
                | ErrorKind::LotteryClosed
                | ErrorKind::NotResettable
                | ErrorKind::OwnerEntryDisabled
                | ErrorKind::NotSynchronized
        )
    }

    /// Remote state may have diverged from the last snapshot; callers should refresh.
    pub fn suggests_refresh(self) -> bool {
        matches!(
            self,
            ErrorKind::ContractRevert
                | ErrorKind::InsufficientFunds
                | ErrorKind::Rejected
                | ErrorKind::TimedOut
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LotteryError {
    #[error("no identity provider is available")]
    ProviderUnavailable,
    #[error("request was declined by the user")]
    UserRejected,
    #[error("cannot bind contract client: {0}")]
    Binding(String),
    #[error("ledger read failed: {0}")]
    Read(String),
    #[error("{caller} is not the lottery manager")]
    NotOwner { caller: Address },
    #[error("{caller} is not the lottery winner")]
    NotWinner { caller: Address },
    #[error("{caller} has already entered this round")]
    AlreadyEntered { caller: Address },
    #[error("prize has already been claimed")]
    AlreadyClaimed,
    #[error("lottery is closed; a winner has already been drawn")]
    LotteryClosed,
    #[error("lottery cannot be reset (status={status}, claimed={claimed})")]
    NotResettable { status: bool, claimed: bool },
    #[error("the lottery manager may not enter as a player")]
    OwnerEntryDisabled,
    #[error("local snapshot is not usable: {0}")]
    NotSynchronized(String),
    #[error("contract reverted: {0}")]
    ContractRevert(String),
    #[error("insufficient funds for transaction")]
    InsufficientFunds,
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("transaction {tx_hash} not confirmed within {after:?}")]
    TimedOut { tx_hash: TxHash, after: Duration },
    #[error("{active} is still in flight")]
    Busy { active: ActionKind },
}

impl LotteryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LotteryError::ProviderUnavailable => ErrorKind::ProviderUnavailable,
            LotteryError::UserRejected => ErrorKind::UserRejected,
            LotteryError::Binding(_) => ErrorKind::Binding,
            LotteryError::Read(_) => ErrorKind::Read,
            LotteryError::NotOwner { .. } => ErrorKind::NotOwner,
            LotteryError::NotWinner { .. } => ErrorKind::NotWinner,
            LotteryError::AlreadyEntered { .. } => ErrorKind::AlreadyEntered,
            LotteryError::AlreadyClaimed => ErrorKind::AlreadyClaimed,
            LotteryError::LotteryClosed => ErrorKind::LotteryClosed,
            LotteryError::NotResettable { .. } => ErrorKind::NotResettable,
            LotteryError::OwnerEntryDisabled => ErrorKind::OwnerEntryDisabled,
            LotteryError::NotSynchronized(_) => ErrorKind::NotSynchronized,
            LotteryError::ContractRevert(_) => ErrorKind::ContractRevert,
            LotteryError::InsufficientFunds => ErrorKind::InsufficientFunds,
            LotteryError::Rejected(_) => ErrorKind::Rejected,
            LotteryError::TimedOut { .. } => ErrorKind::TimedOut,
            LotteryError::Busy { .. } => ErrorKind::Busy,
        }
    }
}

/// Failure reported by the ledger for a submitted write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("user declined the transaction prompt")]
    UserRejected,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("reverted: {0}")]
    Revert(String),
    #[error("rejected by node: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<LedgerError> for LotteryError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::UserRejected => LotteryError::UserRejected,
            LedgerError::InsufficientFunds => LotteryError::InsufficientFunds,
            LedgerError::Revert(reason) => LotteryError::ContractRevert(reason),
            LedgerError::Rejected(reason) => LotteryError::Rejected(reason),
            LedgerError::Transport(message) => LotteryError::Rejected(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_map_into_remote_taxonomy() {
        assert_eq!(
            LotteryError::from(LedgerError::Revert("already entered".into())).kind(),
            ErrorKind::ContractRevert
        );
        assert_eq!(
            LotteryError::from(LedgerError::InsufficientFunds).kind(),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(
            LotteryError::from(LedgerError::UserRejected).kind(),
            ErrorKind::UserRejected
        );
        assert_eq!(
            LotteryError::from(LedgerError::Transport("connection reset".into())).kind(),
            ErrorKind::Rejected
        );
    }

    #[test]
    fn precondition_kinds_never_suggest_refresh() {
        let caller = Address::from_low_u64(3);
        for err in [
            LotteryError::NotOwner {
                caller: caller.clone(),
            },
            LotteryError::NotWinner {
                caller: caller.clone(),
            },
            LotteryError::AlreadyEntered { caller },
            LotteryError::AlreadyClaimed,
            LotteryError::LotteryClosed,
            LotteryError::NotResettable {
                status: true,
                claimed: false,
            },
        ] {
            assert!(err.kind().is_local_precondition(), "{err}");
            assert!(!err.kind().suggests_refresh(), "{err}");
        }
        assert!(!ErrorKind::Busy.is_local_precondition());
        assert!(ErrorKind::ContractRevert.suggests_refresh());
    }

    #[test]
    fn busy_message_names_the_active_action() {
        let err = LotteryError::Busy {
            active: ActionKind::Enter,
        };
        assert_eq!(err.to_string(), "enter is still in flight");
    }
}
