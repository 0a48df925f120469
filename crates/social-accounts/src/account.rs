//! Account records and platform identifiers

use serde::{Deserialize, Serialize};

/// Supported social platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
    X,
    LinkedIn,
    TikTok,
    YouTube,
    Pinterest,
    Threads,
    Bluesky,
}

impl Platform {
    /// All platforms, in declaration order.
    pub const ALL: [Platform; 9] = [
        Platform::Facebook,
        Platform::Instagram,
        Platform::X,
        Platform::LinkedIn,
        Platform::TikTok,
        Platform::YouTube,
        Platform::Pinterest,
        Platform::Threads,
        Platform::Bluesky,
    ];

    /// Lowercase label for logs, metrics, and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::X => "x",
            Platform::LinkedIn => "linkedin",
            Platform::TikTok => "tiktok",
            Platform::YouTube => "youtube",
            Platform::Pinterest => "pinterest",
            Platform::Threads => "threads",
            Platform::Bluesky => "bluesky",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Platform::ALL
            .iter()
            .find(|p| p.as_str() == s.to_lowercase())
            .copied()
            .ok_or_else(|| format!("unknown platform: {s}"))
    }
}

/// Account-level health, mirrored from the pool engine after each attempt.
///
/// Callers never set this directly; it is derived from publish outcomes and
/// explicit suspension/ban signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountHealth {
    Active,
    Cooldown,
    Suspended,
    Banned,
    Error,
}

impl AccountHealth {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            AccountHealth::Active => "active",
            AccountHealth::Cooldown => "cooldown",
            AccountHealth::Suspended => "suspended",
            AccountHealth::Banned => "banned",
            AccountHealth::Error => "error",
        }
    }
}

/// One concrete credential/session for a platform.
///
/// `access_token` is stored verbatim in the account file (the file itself is
/// the protected artifact); anything handed to adapters or logs wraps it in
/// `common::Secret` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialAccount {
    pub id: String,
    pub platform: Platform,
    pub brand_id: String,
    /// Display identity on the platform (handle or page name).
    pub handle: String,
    pub access_token: String,
    pub health: AccountHealth,
    /// Unix timestamp in milliseconds of the last publish attempt.
    pub last_used_at: Option<u64>,
    pub posts_today: u32,
    pub total_success: u64,
    pub total_failure: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    /// Soft-deactivation flag; inactive accounts are skipped by pools but the
    /// record is kept for history.
    pub active: bool,
}

impl SocialAccount {
    /// Create a fresh account record, `Active` with zeroed counters.
    pub fn new(id: String, platform: Platform, brand_id: String, handle: String, access_token: String) -> Self {
        Self {
            id,
            platform,
            brand_id,
            handle,
            access_token,
            health: AccountHealth::Active,
            last_used_at: None,
            posts_today: 0,
            total_success: 0,
            total_failure: 0,
            consecutive_failures: 0,
            last_error: None,
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn platform_round_trips_through_str() {
        for p in Platform::ALL {
            assert_eq!(Platform::from_str(p.as_str()).unwrap(), p);
        }
    }

    #[test]
    fn platform_from_str_is_case_insensitive() {
        assert_eq!(Platform::from_str("LinkedIn").unwrap(), Platform::LinkedIn);
        assert_eq!(Platform::from_str("TIKTOK").unwrap(), Platform::TikTok);
    }

    #[test]
    fn platform_from_str_rejects_unknown() {
        assert!(Platform::from_str("myspace").is_err());
    }

    #[test]
    fn platform_serde_uses_lowercase() {
        let json = serde_json::to_string(&Platform::YouTube).unwrap();
        assert_eq!(json, "\"youtube\"");
        let back: Platform = serde_json::from_str("\"bluesky\"").unwrap();
        assert_eq!(back, Platform::Bluesky);
    }

    #[test]
    fn new_account_starts_active_with_zero_counters() {
        let acct = SocialAccount::new(
            "acct-1".into(),
            Platform::Instagram,
            "brand-1".into(),
            "@demo".into(),
            "tok".into(),
        );
        assert_eq!(acct.health, AccountHealth::Active);
        assert_eq!(acct.posts_today, 0);
        assert_eq!(acct.consecutive_failures, 0);
        assert!(acct.active);
        assert!(acct.last_used_at.is_none());
    }
}
