//! Account file storage
//!
//! Manages a JSON file mapping account IDs to `SocialAccount` records. All
//! writes use atomic temp-file + rename to prevent corruption on crash. A
//! tokio Mutex serializes concurrent writers from the dispatch path and the
//! admin API.
//!
//! The account file is the single source of truth for account identity and
//! lifetime counters. Per-pool rotation state lives in the pool store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::account::{AccountHealth, Platform, SocialAccount};
use crate::error::{Error, Result};

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Thread-safe account file manager.
///
/// The Mutex serializes all writes. Reads acquire the lock briefly to clone
/// the in-memory state, so dispatch-time reads don't block on admin writes.
pub struct AccountStore {
    path: PathBuf,
    state: Mutex<HashMap<String, SocialAccount>>,
}

impl AccountStore {
    /// Load accounts from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start with zero
    /// accounts). Pools will report exhaustion until accounts are linked via
    /// the admin API.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading account file: {e}")))?;
            let accounts: HashMap<String, SocialAccount> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing account file: {e}")))?;
            info!(path = %path.display(), accounts = accounts.len(), "loaded accounts");
            accounts
        } else {
            info!(path = %path.display(), "account file not found, starting with empty store");
            let store = HashMap::new();
            write_atomic(&path, &store).await?;
            store
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Get a clone of a specific account.
    pub async fn get(&self, account_id: &str) -> Option<SocialAccount> {
        let state = self.state.lock().await;
        state.get(account_id).cloned()
    }

    /// List all accounts.
    pub async fn list(&self) -> Vec<SocialAccount> {
        let state = self.state.lock().await;
        let mut accounts: Vec<SocialAccount> = state.values().cloned().collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        accounts
    }

    /// List active accounts for one (brand, platform) pair.
    pub async fn list_for(&self, brand_id: &str, platform: Platform) -> Vec<SocialAccount> {
        let state = self.state.lock().await;
        let mut accounts: Vec<SocialAccount> = state
            .values()
            .filter(|a| a.active && a.brand_id == brand_id && a.platform == platform)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        accounts
    }

    /// Add a new account and persist to disk.
    ///
    /// Rejects duplicate IDs so an existing account's counters are never
    /// silently overwritten.
    pub async fn add(&self, account: SocialAccount) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.contains_key(&account.id) {
            return Err(Error::Duplicate(account.id));
        }
        debug!(account_id = %account.id, platform = %account.platform, "added account");
        state.insert(account.id.clone(), account);
        write_atomic(&self.path, &state).await
    }

    /// Soft-deactivate an account.
    ///
    /// The record is kept (history references it) but pools stop offering it.
    pub async fn deactivate(&self, account_id: &str) -> Result<SocialAccount> {
        let mut state = self.state.lock().await;
        let account = state
            .get_mut(account_id)
            .ok_or_else(|| Error::NotFound(account_id.to_string()))?;
        account.active = false;
        let snapshot = account.clone();
        debug!(account_id, "deactivated account");
        write_atomic(&self.path, &state).await?;
        Ok(snapshot)
    }

    /// Record a publish outcome against the account's lifetime counters.
    ///
    /// `health` is the pool engine's derived view; callers never invent it.
    /// On success the consecutive-failure count resets to zero.
    pub async fn record_outcome(
        &self,
        account_id: &str,
        success: bool,
        health: AccountHealth,
        error: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let account = state
            .get_mut(account_id)
            .ok_or_else(|| Error::NotFound(account_id.to_string()))?;
        account.last_used_at = Some(now_millis());
        account.health = health;
        if success {
            account.total_success += 1;
            account.posts_today += 1;
            account.consecutive_failures = 0;
            account.last_error = None;
        } else {
            account.total_failure += 1;
            account.consecutive_failures += 1;
            account.last_error = error;
        }
        write_atomic(&self.path, &state).await
    }

    /// Clear a Suspended/Banned/Error account back to Active.
    ///
    /// Administrative override, used after a human resolves the underlying
    /// platform issue.
    pub async fn reset_health(&self, account_id: &str) -> Result<SocialAccount> {
        let mut state = self.state.lock().await;
        let account = state
            .get_mut(account_id)
            .ok_or_else(|| Error::NotFound(account_id.to_string()))?;
        account.health = AccountHealth::Active;
        account.consecutive_failures = 0;
        account.last_error = None;
        let snapshot = account.clone();
        info!(account_id, "account health reset to active");
        write_atomic(&self.path, &state).await?;
        Ok(snapshot)
    }

    /// Zero `posts_today` for every account. Idempotent.
    pub async fn reset_daily(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut touched = 0usize;
        for account in state.values_mut() {
            if account.posts_today != 0 {
                account.posts_today = 0;
                touched += 1;
            }
        }
        info!(accounts = touched, "daily account counters reset");
        write_atomic(&self.path, &state).await?;
        Ok(touched)
    }

    /// Number of stored accounts.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Write accounts to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. This prevents corruption if the process crashes mid-write.
/// Sets file permissions to 0600 (owner read/write only) since the file
/// contains platform access tokens.
async fn write_atomic(path: &Path, data: &HashMap<String, SocialAccount>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Parse(format!("serializing accounts: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("account path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".accounts.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp account file: {e}")))?;

    // Set 0600 permissions (unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting account file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp account file: {e}")))?;

    debug!(path = %path.display(), "persisted accounts");
    Ok(())
}
