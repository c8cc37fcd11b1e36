//! Vocabulary shared by the lottery client: identities, ledger calls, snapshots and errors.

pub mod domain;
pub mod error;
pub mod protocol;
