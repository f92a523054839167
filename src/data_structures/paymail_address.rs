use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{WalletError, WalletResult};

/// Sanitised `alias@domain` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaymailAddress {
    alias: String,
    domain: String,
}

impl PaymailAddress {
    /// Trim, lower-case and validate
    pub fn parse(raw: &str) -> WalletResult<Self> {
        let sanitized = raw.trim().to_lowercase();
        let (alias, domain) = sanitized.split_once('@').ok_or_else(|| {
            WalletError::ValidationRequired(format!("invalid paymail address: {raw}"))
        })?;

        let alias_ok = !alias.is_empty()
            && alias
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'));
        let domain_ok = domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && domain
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'));

        if !alias_ok || !domain_ok {
            return Err(WalletError::ValidationRequired(format!(
                "invalid paymail address: {raw}"
            )));
        }

        Ok(Self {
            alias: alias.to_string(),
            domain: domain.to_string(),
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl fmt::Display for PaymailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.alias, self.domain)
    }
}

impl FromStr for PaymailAddress {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PaymailAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PaymailAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PaymailAddress::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitizes() {
        let paymail = PaymailAddress::parse("  Bob@Example.COM ").unwrap();
        assert_eq!(paymail.alias(), "bob");
        assert_eq!(paymail.domain(), "example.com");
        assert_eq!(paymail.to_string(), "bob@example.com");
    }

    #[test]
    fn test_rejects_malformed() {
        for raw in ["bob", "@example.com", "bob@", "bob@localhost", "b b@example.com", "bob@.com"] {
            let err = PaymailAddress::parse(raw).unwrap_err();
            assert!(matches!(err, WalletError::ValidationRequired(_)), "{raw}");
        }
    }
}
