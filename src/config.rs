//! Wallet configuration
//!
//! Loaded from a JSON file, overridden by `SPV_WALLET_*` environment
//! variables, then validated. Every section has defaults so an empty `{}` is
//! a valid file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{WalletError, WalletResult};
use crate::fee::{FeeUnit, ESTIMATED_CHANGE_OUTPUT_SIZE, ESTIMATED_P2PKH_INPUT_SIZE};

pub const ENV_PREFIX: &str = "SPV_WALLET_";

/// Named SQLite pragma preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabasePreset {
    Conservative,
    #[default]
    Production,
    Testing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// File path or `:memory:`
    pub path: String,
    pub preset: DatabasePreset,
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "spv-wallet.db".to_string(),
            preset: DatabasePreset::Production,
            busy_timeout_ms: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Seed rate; when absent the rate is resolved from the broadcaster policy
    pub unit: Option<FeeUnit>,
    pub refresh_interval_secs: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            unit: None,
            refresh_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CallbackConfig {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcConfig {
    pub url: String,
    pub token: String,
    pub deployment_id: String,
    pub callback: Option<CallbackConfig>,
    pub timeout_secs: u64,
}

impl Default for ArcConfig {
    fn default() -> Self {
        Self {
            url: "https://arc.taal.com".to_string(),
            token: String::new(),
            deployment_id: "spv-wallet-core".to_string(),
            callback: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BhsConfig {
    pub url: String,
    pub auth_token: String,
    pub timeout_secs: u64,
    /// Skip merkle root verification entirely
    pub disabled: bool,
}

impl Default for BhsConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            auth_token: String::new(),
            timeout_secs: 10,
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymailConfig {
    /// Domains this wallet serves paymails for
    pub domains: Vec<String>,
    pub capability_cache_ttl_secs: u64,
    pub capability_cache_max_entries: usize,
    pub timeout_secs: u64,
    /// Fall back to the user's first paymail when a spec names no sender
    pub default_from_paymail: bool,
}

impl Default for PaymailConfig {
    fn default() -> Self {
        Self {
            domains: vec!["example.com".to_string()],
            capability_cache_ttl_secs: 3600,
            capability_cache_max_entries: 1000,
            timeout_secs: 15,
            default_from_paymail: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Maximum recursion depth of the ancestor walk
    pub ancestor_level_bound: usize,
    pub estimated_input_size: u64,
    pub change_output_size: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            ancestor_level_bound: 16,
            estimated_input_size: ESTIMATED_P2PKH_INPUT_SIZE,
            change_output_size: ESTIMATED_CHANGE_OUTPUT_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WalletConfig {
    pub database: DatabaseConfig,
    pub fee: FeeConfig,
    pub arc: ArcConfig,
    pub bhs: BhsConfig,
    pub paymail: PaymailConfig,
    pub selector: SelectorConfig,
}

impl WalletConfig {
    pub fn from_json(json: &str) -> WalletResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| WalletError::ConfigurationError(format!("Invalid configuration: {e}")))
    }

    /// Read a JSON file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> WalletResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            WalletError::ConfigurationError(format!(
                "Failed to read configuration {}: {e}",
                path.display()
            ))
        })?;
        let mut config = Self::from_json(&json)?;
        config.apply_env_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> WalletResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SPV_WALLET_*` variables; unknown names are ignored
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> WalletResult<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match key {
                "DATABASE_PATH" => self.database.path = value,
                "DATABASE_PRESET" => {
                    self.database.preset = serde_json::from_value(serde_json::Value::String(
                        value.to_lowercase(),
                    ))
                    .map_err(|e| invalid_env(&name, e))?
                }
                "DATABASE_BUSY_TIMEOUT_MS" => {
                    self.database.busy_timeout_ms = parse_env(&name, &value)?
                }
                "FEE_SATOSHIS" => {
                    let unit = self.fee.unit.get_or_insert_with(FeeUnit::default);
                    unit.satoshis = parse_env(&name, &value)?;
                }
                "FEE_BYTES" => {
                    let unit = self.fee.unit.get_or_insert_with(FeeUnit::default);
                    unit.bytes = parse_env(&name, &value)?;
                }
                "ARC_URL" => self.arc.url = value,
                "ARC_TOKEN" => self.arc.token = value,
                "ARC_DEPLOYMENT_ID" => self.arc.deployment_id = value,
                "ARC_CALLBACK_URL" => {
                    self.arc.callback.get_or_insert_with(CallbackConfig::default).url = value
                }
                "ARC_CALLBACK_TOKEN" => {
                    self.arc.callback.get_or_insert_with(CallbackConfig::default).token = value
                }
                "BHS_URL" => self.bhs.url = value,
                "BHS_AUTH_TOKEN" => self.bhs.auth_token = value,
                "PAYMAIL_DOMAINS" => {
                    self.paymail.domains = value
                        .split(',')
                        .map(|d| d.trim().to_lowercase())
                        .filter(|d| !d.is_empty())
                        .collect()
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> WalletResult<()> {
        if self.database.path.trim().is_empty() {
            return Err(WalletError::ConfigurationError(
                "database.path must not be empty".to_string(),
            ));
        }
        if let Some(unit) = &self.fee.unit {
            unit.validate().map_err(|e| {
                WalletError::ConfigurationError(format!("fee.unit is invalid: {e}"))
            })?;
        }
        if self.arc.url.trim().is_empty() {
            return Err(WalletError::ConfigurationError(
                "arc.url must not be empty".to_string(),
            ));
        }
        if let Some(callback) = &self.arc.callback {
            if !callback.url.is_empty() && !callback.url.starts_with("http") {
                return Err(WalletError::ConfigurationError(format!(
                    "arc.callback.url must be an http(s) URL, got {}",
                    callback.url
                )));
            }
        }
        if self.paymail.capability_cache_max_entries == 0 {
            return Err(WalletError::ConfigurationError(
                "paymail.capability_cache_max_entries must be positive".to_string(),
            ));
        }
        if self.selector.ancestor_level_bound == 0 {
            return Err(WalletError::ConfigurationError(
                "selector.ancestor_level_bound must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> WalletResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| invalid_env(name, e))
}

fn invalid_env(name: &str, error: impl std::fmt::Display) -> WalletError {
    WalletError::ConfigurationError(format!("Invalid value for {name}: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = WalletConfig::from_json("{}").unwrap();
        assert_eq!(config, WalletConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.selector.ancestor_level_bound, 16);
        assert!(config.fee.unit.is_none());
    }

    #[test]
    fn test_nested_sections_parse() {
        let config = WalletConfig::from_json(
            r#"{
                "database": {"path": ":memory:", "preset": "testing"},
                "fee": {"unit": {"satoshis": 1, "bytes": 1000}},
                "arc": {"url": "https://arc.example", "callback": {"url": "https://wallet.example/cb", "token": "t"}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.database.preset, DatabasePreset::Testing);
        assert_eq!(config.fee.unit, Some(FeeUnit::new(1, 1000)));
        assert_eq!(config.arc.callback.unwrap().token, "t");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = WalletConfig::default();
        config
            .apply_env_overrides(vec![
                ("SPV_WALLET_ARC_URL".to_string(), "https://arc.other".to_string()),
                ("SPV_WALLET_FEE_SATOSHIS".to_string(), "5".to_string()),
                ("SPV_WALLET_DATABASE_PRESET".to_string(), "Conservative".to_string()),
                ("SPV_WALLET_PAYMAIL_DOMAINS".to_string(), "A.com, b.com".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ])
            .unwrap();
        assert_eq!(config.arc.url, "https://arc.other");
        assert_eq!(config.fee.unit, Some(FeeUnit::new(5, 1000)));
        assert_eq!(config.database.preset, DatabasePreset::Conservative);
        assert_eq!(config.paymail.domains, vec!["a.com", "b.com"]);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = WalletConfig::default();
        let err = config
            .apply_env_overrides(vec![("SPV_WALLET_FEE_BYTES".to_string(), "lots".to_string())])
            .unwrap_err();
        assert!(matches!(err, WalletError::ConfigurationError(_)));

        config.fee.unit = Some(FeeUnit::new(1, 0));
        assert!(config.validate().is_err());
    }
}
