//! Paymail capability documents and their process-wide cache

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub const BRFC_P2P_PAYMENT_DESTINATION: &str = "2a40af698840";
pub const BRFC_P2P_TRANSACTIONS: &str = "5f1323cddf31";
pub const BRFC_BEEF_TRANSACTION: &str = "5c55a7fdb7bb";
pub const BRFC_PKI: &str = "pki";
pub const BRFC_PKI_ALTERNATE: &str = "0c4339ef99c2";

/// How a host wants signed transactions delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Basic,
    Beef,
}

/// Endpoints of a host supporting P2P payments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2pEndpoints {
    pub destination_url: String,
    pub submit_url: String,
    pub format: PayloadFormat,
}

/// `/.well-known/bsvalias` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Capabilities {
    #[serde(default)]
    pub bsvalias: String,
    #[serde(default)]
    pub capabilities: HashMap<String, serde_json::Value>,
}

impl Capabilities {
    /// URL-valued capability under `brfc`, falling back to `alternate`
    pub fn get_string(&self, brfc: &str, alternate: &str) -> Option<&str> {
        [brfc, alternate]
            .into_iter()
            .filter(|key| !key.is_empty())
            .find_map(|key| self.capabilities.get(key).and_then(|v| v.as_str()))
            .filter(|url| !url.is_empty())
    }

    pub fn has(&self, brfc: &str, alternate: &str) -> bool {
        [brfc, alternate]
            .into_iter()
            .any(|key| !key.is_empty() && self.capabilities.contains_key(key))
    }

    /// Destination and submit endpoints; BEEF submission wins when offered
    pub fn p2p(&self) -> Option<P2pEndpoints> {
        let destination_url = self.get_string(BRFC_P2P_PAYMENT_DESTINATION, "")?;
        let (submit_url, format) = match self.get_string(BRFC_BEEF_TRANSACTION, "") {
            Some(beef) => (beef, PayloadFormat::Beef),
            None => (
                self.get_string(BRFC_P2P_TRANSACTIONS, "")?,
                PayloadFormat::Basic,
            ),
        };
        Some(P2pEndpoints {
            destination_url: destination_url.to_string(),
            submit_url: submit_url.to_string(),
            format,
        })
    }
}

/// Fill `{alias}` and `{domain.tld}` in a capability URL template
pub fn expand_template(template: &str, alias: &str, domain: &str) -> String {
    template
        .replace("{alias}", alias)
        .replace("{domain.tld}", domain)
}

struct CachedCapabilities {
    capabilities: Capabilities,
    stored_at: Instant,
}

/// Bounded, TTL-expiring cache keyed by domain
pub struct CapabilityCache {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, CachedCapabilities>>,
}

impl CapabilityCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, domain: &str) -> Option<Capabilities> {
        let entries = self.entries.read().await;
        entries
            .get(domain)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.capabilities.clone())
    }

    pub async fn insert(&self, domain: &str, capabilities: Capabilities) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);

        if entries.len() >= self.max_entries && !entries.contains_key(domain) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            domain.to_string(),
            CachedCapabilities {
                capabilities,
                stored_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(pairs: &[(&str, &str)]) -> Capabilities {
        Capabilities {
            bsvalias: "1.0".to_string(),
            capabilities: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                .collect(),
        }
    }

    #[test]
    fn test_p2p_prefers_beef_submission() {
        let caps = capabilities(&[
            (BRFC_P2P_PAYMENT_DESTINATION, "https://h/dest/{alias}@{domain.tld}"),
            (BRFC_P2P_TRANSACTIONS, "https://h/tx/{alias}@{domain.tld}"),
            (BRFC_BEEF_TRANSACTION, "https://h/beef/{alias}@{domain.tld}"),
        ]);
        let p2p = caps.p2p().unwrap();
        assert_eq!(p2p.format, PayloadFormat::Beef);
        assert_eq!(
            expand_template(&p2p.submit_url, "bob", "host.com"),
            "https://h/beef/bob@host.com"
        );

        let only_destination = capabilities(&[(BRFC_P2P_PAYMENT_DESTINATION, "https://h/d")]);
        assert!(only_destination.p2p().is_none());
    }

    #[test]
    fn test_pki_alternate_key() {
        let caps = capabilities(&[(BRFC_PKI_ALTERNATE, "https://h/id/{alias}@{domain.tld}")]);
        assert!(caps.has(BRFC_PKI, BRFC_PKI_ALTERNATE));
        assert!(caps.get_string(BRFC_PKI, BRFC_PKI_ALTERNATE).is_some());
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let cache = CapabilityCache::new(Duration::from_secs(60), 2);
        cache.insert("a.com", Capabilities::default()).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert("b.com", Capabilities::default()).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert("c.com", Capabilities::default()).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("a.com").await.is_none());
        assert!(cache.get("c.com").await.is_some());
    }

    #[tokio::test]
    async fn test_cache_entries_expire() {
        let cache = CapabilityCache::new(Duration::from_millis(0), 10);
        cache.insert("a.com", Capabilities::default()).await;
        assert!(cache.get("a.com").await.is_none());
    }
}
