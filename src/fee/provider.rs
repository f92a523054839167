//! Fee rate providers
//!
//! The rate is process-wide and read-mostly. [`CachedFeeProvider`] seeds from
//! configuration when available and otherwise resolves lazily from the
//! broadcaster's policy endpoint; a single mutex guards refreshes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cancellation::{CancellationToken, TokioCancellationToken};
use crate::errors::WalletResult;
use crate::fee::FeeUnit;

#[async_trait]
pub trait FeeProvider: Send + Sync {
    async fn fee_unit(&self, token: &TokioCancellationToken) -> WalletResult<FeeUnit>;
}

/// Remote source of the current mining fee
#[async_trait]
pub trait FeePolicySource: Send + Sync {
    async fn mining_fee(&self, token: &TokioCancellationToken) -> WalletResult<FeeUnit>;
}

/// Fixed rate, typically from configuration
#[derive(Debug, Clone, Copy)]
pub struct StaticFeeProvider {
    unit: FeeUnit,
}

impl StaticFeeProvider {
    pub fn new(unit: FeeUnit) -> Self {
        Self { unit }
    }
}

#[async_trait]
impl FeeProvider for StaticFeeProvider {
    async fn fee_unit(&self, token: &TokioCancellationToken) -> WalletResult<FeeUnit> {
        token.check()?;
        Ok(self.unit)
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedUnit {
    unit: FeeUnit,
    fetched_at: Instant,
}

/// Fee rate cached from a [`FeePolicySource`]
pub struct CachedFeeProvider {
    source: Arc<dyn FeePolicySource>,
    cached: RwLock<Option<CachedUnit>>,
    refresh_lock: Mutex<()>,
    max_age: Duration,
}

impl CachedFeeProvider {
    pub fn new(source: Arc<dyn FeePolicySource>, max_age: Duration) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            max_age,
        }
    }

    /// Start with a configured rate; the source is only asked once it ages out
    pub fn with_seed(source: Arc<dyn FeePolicySource>, max_age: Duration, seed: FeeUnit) -> Self {
        Self {
            source,
            cached: RwLock::new(Some(CachedUnit {
                unit: seed,
                fetched_at: Instant::now(),
            })),
            refresh_lock: Mutex::new(()),
            max_age,
        }
    }

    async fn fresh(&self) -> Option<FeeUnit> {
        let cached = *self.cached.read().await;
        cached
            .filter(|c| c.fetched_at.elapsed() < self.max_age)
            .map(|c| c.unit)
    }

    /// Fetch the rate from the source and replace the cached value
    pub async fn refresh(&self, token: &TokioCancellationToken) -> WalletResult<FeeUnit> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_store(token).await
    }

    async fn fetch_and_store(&self, token: &TokioCancellationToken) -> WalletResult<FeeUnit> {
        let unit = self.source.mining_fee(token).await?;
        unit.validate()?;
        *self.cached.write().await = Some(CachedUnit {
            unit,
            fetched_at: Instant::now(),
        });
        info!(satoshis = unit.satoshis, bytes = unit.bytes, "Fee unit refreshed");
        Ok(unit)
    }

    /// Refresh periodically until `token` is cancelled
    pub fn spawn_refresh_task(
        self: Arc<Self>,
        interval: Duration,
        token: TokioCancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Fee refresh task stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh(&token).await {
                            if token.is_cancelled() {
                                return;
                            }
                            warn!(error = %e, "Fee unit refresh failed, keeping previous value");
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl FeeProvider for CachedFeeProvider {
    async fn fee_unit(&self, token: &TokioCancellationToken) -> WalletResult<FeeUnit> {
        token.check()?;
        if let Some(unit) = self.fresh().await {
            return Ok(unit);
        }
        let stale = *self.cached.read().await;
        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(unit) = self.fresh().await {
            return Ok(unit);
        }
        match self.fetch_and_store(token).await {
            Ok(unit) => Ok(unit),
            Err(e) => match stale {
                Some(cached) => {
                    warn!(error = %e, "Using stale fee unit");
                    Ok(cached.unit)
                }
                None => Err(e),
            },
        }
    }
}
