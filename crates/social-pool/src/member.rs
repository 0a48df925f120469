//! Per-pool membership state
//!
//! A `PoolMembership` carries one account's rotation state inside one pool.
//! An account in several pools has fully independent state in each: a rate
//! limit hit through pool A does not cool the same account down in pool B.
//!
//! Transitions:
//! - Active → Cooldown (rate limited, or too many consecutive transient failures)
//! - Active → Banned / Suspended (platform signal; manual reset required)
//! - Active → Error (auth failure / expired token)
//! - Error → Suspended (auth failures keep accumulating)
//! - Cooldown → Active (expiry, evaluated lazily at selection time)

use serde::{Deserialize, Serialize};

/// Runtime status of a pool membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Cooldown { until: u64 },
    Suspended,
    Banned,
    Error,
}

impl MemberStatus {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            MemberStatus::Active => "active",
            MemberStatus::Cooldown { .. } => "cooldown",
            MemberStatus::Suspended => "suspended",
            MemberStatus::Banned => "banned",
            MemberStatus::Error => "error",
        }
    }

    /// Terminal states need a manual administrative reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MemberStatus::Suspended | MemberStatus::Banned)
    }
}

/// One account's rotation state within one pool.
///
/// Timestamps are unix milliseconds. `in_flight`/`reserved_at` mark a live
/// reservation between selection and outcome recording; they are transient
/// and reset when pool state is loaded from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolMembership {
    pub id: String,
    pub account_id: String,
    /// Lower values are tried first under the Priority strategy.
    pub priority: u32,
    /// Reserved for weighted strategies.
    pub weight: u32,
    pub status: MemberStatus,
    pub cooldown_until: Option<u64>,
    pub last_used_at: Option<u64>,
    pub posts_today: u32,
    pub total_posts: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    /// Consecutive rate-limit hits, for cooldown escalation. Reset by any
    /// success or any non-rate-limit failure.
    pub consecutive_rate_limits: u32,
    pub last_error: Option<String>,
    #[serde(default)]
    pub in_flight: bool,
    #[serde(default)]
    pub reserved_at: Option<u64>,
}

impl PoolMembership {
    /// Create a fresh membership, `Active` with zeroed counters.
    pub fn new(account_id: String, priority: u32, weight: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id,
            priority,
            weight,
            status: MemberStatus::Active,
            cooldown_until: None,
            last_used_at: None,
            posts_today: 0,
            total_posts: 0,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            consecutive_rate_limits: 0,
            last_error: None,
            in_flight: false,
            reserved_at: None,
        }
    }

    /// Whether a stored cooldown is still in force at `now_ms`.
    pub fn cooling_down(&self, now_ms: u64) -> bool {
        match self.status {
            MemberStatus::Cooldown { until } => now_ms < until,
            _ => false,
        }
    }

    /// Milliseconds of cooldown remaining, if any.
    pub fn cooldown_remaining(&self, now_ms: u64) -> Option<u64> {
        match self.status {
            MemberStatus::Cooldown { until } if now_ms < until => Some(until - now_ms),
            _ => None,
        }
    }

    /// Effective status label with lazy cooldown expiry applied.
    pub fn effective_label(&self, now_ms: u64) -> &'static str {
        match self.status {
            MemberStatus::Cooldown { until } if now_ms >= until => "active",
            other => other.label(),
        }
    }

    /// Eligibility for selection at `now_ms`.
    ///
    /// Excludes terminal states, live cooldowns (expired cooldowns pass,
    /// the lazy transition), in-flight reservations, and members at their
    /// daily cap. `Error` members stay selectable: retrying them is what
    /// accumulates the consecutive auth failures that escalate to
    /// `Suspended`.
    pub fn is_eligible(&self, now_ms: u64, max_posts_per_day: u32) -> bool {
        if self.in_flight || self.posts_today >= max_posts_per_day {
            return false;
        }
        match self.status {
            MemberStatus::Active | MemberStatus::Error => true,
            MemberStatus::Cooldown { until } => now_ms >= until,
            MemberStatus::Suspended | MemberStatus::Banned => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_membership_is_eligible() {
        let m = PoolMembership::new("acct-1".into(), 0, 1);
        assert!(m.is_eligible(1_000, 10));
        assert_eq!(m.status, MemberStatus::Active);
    }

    #[test]
    fn daily_cap_blocks_eligibility() {
        let mut m = PoolMembership::new("acct-1".into(), 0, 1);
        m.posts_today = 10;
        assert!(!m.is_eligible(1_000, 10));
        assert!(m.is_eligible(1_000, 11));
    }

    #[test]
    fn live_cooldown_blocks_expired_cooldown_passes() {
        let mut m = PoolMembership::new("acct-1".into(), 0, 1);
        m.status = MemberStatus::Cooldown { until: 5_000 };
        m.cooldown_until = Some(5_000);
        assert!(!m.is_eligible(4_999, 10));
        assert!(m.is_eligible(5_000, 10), "lazy expiry at selection time");
        assert_eq!(m.effective_label(5_000), "active");
        assert_eq!(m.effective_label(4_999), "cooldown");
    }

    #[test]
    fn terminal_states_block() {
        for status in [MemberStatus::Suspended, MemberStatus::Banned] {
            let mut m = PoolMembership::new("acct-1".into(), 0, 1);
            m.status = status;
            assert!(!m.is_eligible(1_000, 10), "{} must block", status.label());
        }
    }

    #[test]
    fn error_state_stays_selectable() {
        let mut m = PoolMembership::new("acct-1".into(), 0, 1);
        m.status = MemberStatus::Error;
        m.consecutive_failures = 1;
        assert!(
            m.is_eligible(1_000, 10),
            "one auth failure must not sideline the member"
        );
    }

    #[test]
    fn in_flight_blocks_eligibility() {
        let mut m = PoolMembership::new("acct-1".into(), 0, 1);
        m.in_flight = true;
        assert!(!m.is_eligible(1_000, 10));
    }

    #[test]
    fn terminal_states_are_flagged() {
        assert!(MemberStatus::Banned.is_terminal());
        assert!(MemberStatus::Suspended.is_terminal());
        assert!(!MemberStatus::Error.is_terminal());
        assert!(!MemberStatus::Active.is_terminal());
    }

    #[test]
    fn cooldown_remaining_counts_down() {
        let mut m = PoolMembership::new("acct-1".into(), 0, 1);
        m.status = MemberStatus::Cooldown { until: 10_000 };
        assert_eq!(m.cooldown_remaining(7_000), Some(3_000));
        assert_eq!(m.cooldown_remaining(10_000), None);
    }

    #[test]
    fn status_serde_round_trip() {
        let status = MemberStatus::Cooldown { until: 42 };
        let json = serde_json::to_string(&status).unwrap();
        let back: MemberStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
