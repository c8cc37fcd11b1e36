use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{AddressError, LotteryError};

/// Lowercased `0x`-prefixed 20-byte account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub const BYTES: usize = 20;

    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;
        if digits.len() != Self::BYTES * 2 {
            return Err(AddressError::InvalidLength {
                actual: digits.len(),
            });
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidHex);
        }
        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    /// The ledger's "empty" address.
    pub fn zero() -> Self {
        Self::from_low_u64(0)
    }

    /// Address whose low 8 bytes hold `value`; used for fixtures and simulators.
    pub fn from_low_u64(value: u64) -> Self {
        Self(format!("0x{value:040x}"))
    }

    pub fn is_zero(&self) -> bool {
        self.0[2..].bytes().all(|b| b == b'0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Wei(pub u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);
    const PER_ETHER: u128 = 1_000_000_000_000_000_000;

    pub const fn from_milli_ether(milli: u128) -> Self {
        Self(milli * (Self::PER_ETHER / 1_000))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} wei", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Locally active identity. Replaced wholesale; `epoch` grows on every replacement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Session {
    pub address: Option<Address>,
    pub epoch: u64,
}

impl Session {
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.address.is_some()
    }

    pub fn succeed(&self, address: Option<Address>) -> Self {
        Self {
            address,
            epoch: self.epoch + 1,
        }
    }
}

/// Ledger-side lottery fields as seen by `account`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotterySnapshot {
    pub account: Address,
    pub status: bool,
    pub winner: Option<Address>,
    pub players: Vec<Address>,
    pub owner: Address,
    pub claimed: bool,
    pub entered_by_current: bool,
}

impl LotterySnapshot {
    pub fn is_owner(&self, address: &Address) -> bool {
        self.owner == *address
    }

    pub fn is_winner(&self, address: &Address) -> bool {
        self.winner.as_ref() == Some(address)
    }

    pub fn has_player(&self, address: &Address) -> bool {
        self.players.contains(address)
    }

    /// Rejects field combinations the ledger can never produce together.
    pub fn validate(&self) -> Result<(), LotteryError> {
        if self.claimed && !self.status {
            return Err(LotteryError::Read(
                "inconsistent snapshot: prize claimed before a winner was drawn".into(),
            ));
        }
        if self.winner.is_some() && !self.status {
            return Err(LotteryError::Read(
                "inconsistent snapshot: winner set while the lottery is open".into(),
            ));
        }
        if self.entered_by_current && !self.has_player(&self.account) {
            return Err(LotteryError::Read(format!(
                "inconsistent snapshot: {} marked as entered but missing from players",
                self.account
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(account: Address) -> LotterySnapshot {
        LotterySnapshot {
            account,
            status: false,
            winner: None,
            players: Vec::new(),
            owner: Address::from_low_u64(1),
            claimed: false,
            entered_by_current: false,
        }
    }

    #[test]
    fn parses_and_lowercases_checksummed_address() {
        let parsed = Address::parse("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").expect("address");
        assert_eq!(parsed.as_str(), "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
        assert_eq!(
            parsed,
            "0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED"
                .parse::<Address>()
                .expect("upper")
        );
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert_eq!(Address::parse("5aaeb6"), Err(AddressError::MissingPrefix));
        assert_eq!(
            Address::parse("0xabc"),
            Err(AddressError::InvalidLength { actual: 3 })
        );
        assert_eq!(
            Address::parse(&format!("0x{}", "g".repeat(40))),
            Err(AddressError::InvalidHex)
        );
    }

    #[test]
    fn zero_address_is_detected() {
        assert!(Address::zero().is_zero());
        assert!(Address::parse(&format!("0x{}", "0".repeat(40)))
            .expect("zero")
            .is_zero());
        assert!(!Address::from_low_u64(0xaa).is_zero());
    }

    #[test]
    fn default_stake_is_one_milli_ether() {
        assert_eq!(Wei::from_milli_ether(1), Wei(1_000_000_000_000_000));
    }

    #[test]
    fn session_epoch_advances_on_every_replacement() {
        let first = Session::disconnected().succeed(Some(Address::from_low_u64(7)));
        let second = first.succeed(None);
        assert_eq!(first.epoch, 1);
        assert_eq!(second.epoch, 2);
        assert!(first.is_connected());
        assert!(!second.is_connected());
    }

    #[test]
    fn validate_rejects_claim_without_draw() {
        let mut snap = snapshot(Address::from_low_u64(2));
        snap.claimed = true;
        assert!(matches!(snap.validate(), Err(LotteryError::Read(_))));
    }

    #[test]
    fn validate_rejects_entered_flag_without_membership() {
        let mut snap = snapshot(Address::from_low_u64(2));
        snap.entered_by_current = true;
        assert!(matches!(snap.validate(), Err(LotteryError::Read(_))));

        snap.players.push(Address::from_low_u64(2));
        assert!(snap.validate().is_ok());
    }

    #[test]
    fn validate_rejects_winner_while_open() {
        let mut snap = snapshot(Address::from_low_u64(2));
        snap.winner = Some(Address::from_low_u64(2));
        assert!(snap.validate().is_err());

        snap.status = true;
        assert!(snap.validate().is_ok());
    }
}
