//! Pool registry
//!
//! Maps (brand, platform) to its `Arc<AccountPool>`. The registry lock is
//! held only for the lookup; all dispatch-time coordination happens inside
//! the pool itself, so traffic against different pools proceeds fully in
//! parallel.

use std::collections::HashMap;
use std::sync::Arc;

use social_accounts::Platform;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{Error, Result};
use crate::pool::{AccountPool, PoolConfig};

/// Registry of all configured pools, keyed by (brand id, platform).
#[derive(Default)]
pub struct PoolRegistry {
    pools: RwLock<HashMap<(String, Platform), Arc<AccountPool>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the pool for a (brand, platform) pair.
    pub async fn get(&self, brand_id: &str, platform: Platform) -> Result<Arc<AccountPool>> {
        let pools = self.pools.read().await;
        pools
            .get(&(brand_id.to_string(), platform))
            .cloned()
            .ok_or_else(|| Error::PoolNotConfigured {
                brand_id: brand_id.to_string(),
                platform,
            })
    }

    /// Look up a pool by its id.
    pub async fn get_by_id(&self, pool_id: &str) -> Option<Arc<AccountPool>> {
        let pools = self.pools.read().await;
        pools.values().find(|p| p.config().id == pool_id).cloned()
    }

    /// Register a new pool. One pool per (brand, platform).
    pub async fn insert(&self, pool: AccountPool) -> Result<Arc<AccountPool>> {
        let key = (pool.config().brand_id.clone(), pool.config().platform);
        let mut pools = self.pools.write().await;
        if pools.contains_key(&key) {
            return Err(Error::PoolExists(format!("{}/{}", key.0, key.1)));
        }
        info!(pool_id = %pool.config().id, brand_id = %key.0, platform = %key.1, "pool registered");
        let pool = Arc::new(pool);
        pools.insert(key, pool.clone());
        Ok(pool)
    }

    /// Remove a pool by id. Returns the removed pool if it existed.
    pub async fn remove(&self, pool_id: &str) -> Option<Arc<AccountPool>> {
        let mut pools = self.pools.write().await;
        let key = pools
            .iter()
            .find(|(_, p)| p.config().id == pool_id)
            .map(|(k, _)| k.clone())?;
        let removed = pools.remove(&key);
        info!(pool_id, "pool removed");
        removed
    }

    /// Snapshot of all pools, for sweeps and rollup health.
    pub async fn pools(&self) -> Vec<Arc<AccountPool>> {
        let pools = self.pools.read().await;
        pools.values().cloned().collect()
    }

    /// Number of registered pools.
    pub async fn len(&self) -> usize {
        self.pools.read().await.len()
    }

    /// Whether the registry has no pools.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
