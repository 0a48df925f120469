//! Append-only dispatch outcome log
//!
//! One JSON line per publish attempt, for auditing and dashboards. The log is
//! observability, not correctness: membership state mutated by `record` is
//! the durable record of what happened, so append failures are reported to
//! the caller to log and move on.

use std::path::PathBuf;

use serde::Serialize;
use social_accounts::Platform;
use social_accounts::store::now_millis;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use publisher::ErrorKind;

use crate::error::{Error, Result};

/// One publish attempt, as logged.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeRecord {
    pub timestamp_ms: u64,
    pub request_id: String,
    pub pool_id: String,
    pub membership_id: String,
    pub account_id: String,
    pub platform: Platform,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub latency_ms: u64,
}

impl OutcomeRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_id: &str,
        pool_id: &str,
        membership_id: &str,
        account_id: &str,
        platform: Platform,
        error_kind: Option<ErrorKind>,
        latency_ms: u64,
    ) -> Self {
        Self {
            timestamp_ms: now_millis(),
            request_id: request_id.to_string(),
            pool_id: pool_id.to_string(),
            membership_id: membership_id.to_string(),
            account_id: account_id.to_string(),
            platform,
            success: error_kind.is_none(),
            error_kind,
            latency_ms,
        }
    }
}

/// JSON-lines audit log. A `None` path makes every append a no-op, for
/// deployments that rely on tracing output alone.
pub struct AuditLog {
    path: Option<PathBuf>,
    writer: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            writer: Mutex::new(()),
        }
    }

    /// Disabled log: appends are no-ops.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Append one record as a JSON line.
    pub async fn append(&self, record: &OutcomeRecord) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut line = serde_json::to_string(record)
            .map_err(|e| Error::Store(format!("serializing outcome record: {e}")))?;
        line.push('\n');

        let _guard = self.writer.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| Error::Store(format!("opening audit log: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Store(format!("appending audit log: {e}")))?;
        Ok(())
    }
}
