use std::{fs, io, path::Path, time::Duration};

use anyhow::{anyhow, Context};
use serde::{de, Deserialize, Deserializer};
use shared::domain::{Address, Wei};

use crate::coordinator::ActionPolicy;

pub const SETTINGS_FILE: &str = "lottery.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub contract_address: Address,
    pub entry_stake: Wei,
    pub allow_owner_entry: bool,
    pub confirmation_timeout: Option<Duration>,
}

impl Settings {
    pub fn new(contract_address: Address) -> Self {
        Self {
            contract_address,
            entry_stake: Wei::from_milli_ether(1),
            allow_owner_entry: true,
            confirmation_timeout: None,
        }
    }

    pub fn action_policy(&self) -> ActionPolicy {
        ActionPolicy {
            entry_stake: self.entry_stake,
            allow_owner_entry: self.allow_owner_entry,
            confirmation_timeout: self.confirmation_timeout,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    contract_address: Option<String>,
    #[serde(deserialize_with = "stake_wei")]
    entry_stake_wei: Option<u128>,
    allow_owner_entry: Option<bool>,
    confirmation_timeout_secs: Option<u64>,
}

pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Reads `path` (optional) and applies `LOTTERY_*` / `APP__*` overrides from `env`.
pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut file_cfg = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<FileSettings>(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => FileSettings::default(),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))
        }
    };

    if let Some(v) = lookup(&env, "CONTRACT_ADDRESS") {
        file_cfg.contract_address = Some(v);
    }
    if let Some(v) = lookup(&env, "ENTRY_STAKE_WEI") {
        file_cfg.entry_stake_wei =
            Some(v.parse().with_context(|| format!("invalid entry stake '{v}'"))?);
    }
    if let Some(v) = lookup(&env, "ALLOW_OWNER_ENTRY") {
        file_cfg.allow_owner_entry =
            Some(v.parse().with_context(|| format!("invalid allow_owner_entry '{v}'"))?);
    }
    if let Some(v) = lookup(&env, "CONFIRMATION_TIMEOUT_SECS") {
        file_cfg.confirmation_timeout_secs = Some(
            v.parse()
                .with_context(|| format!("invalid confirmation timeout '{v}'"))?,
        );
    }

    let raw_address = file_cfg
        .contract_address
        .ok_or_else(|| anyhow!("lottery contract address is not configured"))?;
    let contract_address = Address::parse(&raw_address)
        .with_context(|| format!("invalid contract address '{raw_address}'"))?;
    if contract_address.is_zero() {
        return Err(anyhow!("lottery contract address must not be the zero address"));
    }

    let mut settings = Settings::new(contract_address);
    if let Some(stake) = file_cfg.entry_stake_wei {
        settings.entry_stake = Wei(stake);
    }
    if let Some(allow) = file_cfg.allow_owner_entry {
        settings.allow_owner_entry = allow;
    }
    settings.confirmation_timeout = file_cfg
        .confirmation_timeout_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);
    Ok(settings)
}

/// TOML integers stop at `i64::MAX`, so larger stakes may be written as strings.
fn stake_wei<'de, D>(deserializer: D) -> Result<Option<u128>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawStake {
        Number(u64),
        Text(String),
    }

    match Option::<RawStake>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawStake::Number(wei)) => Ok(Some(u128::from(wei))),
        Some(RawStake::Text(raw)) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| de::Error::custom(format!("invalid entry_stake_wei '{raw}': {err}"))),
    }
}

fn lookup(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    env(&format!("APP__{key}")).or_else(|| env(&format!("LOTTERY_{key}")))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
