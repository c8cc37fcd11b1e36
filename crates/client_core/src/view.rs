//! Projection of a snapshot onto the discrete states a UI offers.

use serde::{Deserialize, Serialize};
use shared::domain::{Address, LotterySnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewState {
    EnterAvailable,
    AlreadyEntered,
    /// Round settled and prize claimed; nothing to do until the next draw opens.
    AwaitingDraw,
    WinnerCanClaim,
    NotWinner,
    OwnerCanDraw,
    OwnerAwaitClaimThenReset,
    NotOwner,
}

impl ViewState {
    pub const ALL: [ViewState; 8] = [
        ViewState::EnterAvailable,
        ViewState::AlreadyEntered,
        ViewState::AwaitingDraw,
        ViewState::WinnerCanClaim,
        ViewState::NotWinner,
        ViewState::OwnerCanDraw,
        ViewState::OwnerAwaitClaimThenReset,
        ViewState::NotOwner,
    ];
}

/// Which page the viewer is looking at: the player's entry page or the manager's draw page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    Player,
    Manager,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub address: Option<Address>,
    pub perspective: Perspective,
}

impl Role {
    pub fn player(address: Option<Address>) -> Self {
        Self {
            address,
            perspective: Perspective::Player,
        }
    }

    pub fn manager(address: Option<Address>) -> Self {
        Self {
            address,
            perspective: Perspective::Manager,
        }
    }
}

pub fn project(snapshot: &LotterySnapshot, role: &Role) -> ViewState {
    let is_owner = role
        .address
        .as_ref()
        .is_some_and(|address| snapshot.is_owner(address));
    let is_winner = role
        .address
        .as_ref()
        .is_some_and(|address| snapshot.is_winner(address));

    match role.perspective {
        Perspective::Player => match (snapshot.status, snapshot.claimed) {
            (false, _) if snapshot.entered_by_current => ViewState::AlreadyEntered,
            (false, _) => ViewState::EnterAvailable,
            (true, true) => ViewState::AwaitingDraw,
            (true, false) if is_winner => ViewState::WinnerCanClaim,
            (true, false) => ViewState::NotWinner,
        },
        Perspective::Manager => match (is_owner, snapshot.status) {
            (false, _) => ViewState::NotOwner,
            (true, false) => ViewState::OwnerCanDraw,
            (true, true) => ViewState::OwnerAwaitClaimThenReset,
        },
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
