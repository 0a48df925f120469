//! Pool state persistence
//!
//! Pools and their memberships live in a single JSON file on disk. Writes
//! use atomic temp-file + rename to prevent corruption on crash. A tokio
//! Mutex serializes writers; the in-memory truth stays in the registry and
//! this store only snapshots it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::member::PoolMembership;
use crate::pool::{AccountPool, PoolConfig};
use crate::registry::PoolRegistry;

/// One pool as persisted: its configuration plus membership state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRecord {
    pub config: PoolConfig,
    pub members: Vec<PoolMembership>,
}

/// File-backed snapshot store for the pool registry.
pub struct PoolStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl PoolStore {
    /// Open the store, creating an empty file on cold start.
    pub async fn open(path: PathBuf) -> Result<Self> {
        if !tokio::fs::try_exists(&path).await.map_err(io_err)? {
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
            }
            write_atomic(&path, &Vec::new()).await?;
            info!(path = %path.display(), "created empty pool state file");
        }
        Ok(Self {
            path,
            writer: Mutex::new(()),
        })
    }

    /// Read all persisted pool records.
    pub async fn load(&self) -> Result<Vec<PoolRecord>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(io_err)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| Error::Store(e.to_string()))
    }

    /// Snapshot every pool in the registry to disk.
    pub async fn save_registry(&self, registry: &PoolRegistry) -> Result<()> {
        let mut records = Vec::new();
        for pool in registry.pools().await {
            records.push(PoolRecord {
                config: pool.config().clone(),
                members: pool.members().await,
            });
        }
        // stable order keeps diffs and test assertions deterministic
        records.sort_by(|a, b| a.config.id.cmp(&b.config.id));

        let _guard = self.writer.lock().await;
        write_atomic(&self.path, &records).await?;
        debug!(pools = records.len(), "pool state saved");
        Ok(())
    }

    /// Rebuild a registry from persisted state.
    ///
    /// Reservations never survive a restart; `AccountPool::with_members`
    /// clears in-flight flags while hydrating.
    pub async fn hydrate(&self) -> Result<Arc<PoolRegistry>> {
        let records = self.load().await?;
        let registry = Arc::new(PoolRegistry::new());
        for record in records {
            registry
                .insert(AccountPool::with_members(record.config, record.members))
                .await?;
        }
        info!(pools = registry.len().await, "pool registry hydrated");
        Ok(registry)
    }
}

fn io_err(e: std::io::Error) -> Error {
    Error::Store(e.to_string())
}

/// Writes to a temporary file in the same directory, then renames it over
/// the target. Either the old or new contents survive a crash, never a mix.
async fn write_atomic(path: &Path, records: &Vec<PoolRecord>) -> Result<()> {
    let json =
        serde_json::to_string_pretty(records).map_err(|e| Error::Store(e.to_string()))?;
    let dir = path
        .parent()
        .ok_or_else(|| Error::Store("state path has no parent directory".into()))?;
    let tmp_path = dir.join(format!(".pools.tmp.{}", std::process::id()));
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(io_err)?;
    }

    tokio::fs::rename(&tmp_path, path).await.map_err(io_err)
}
