//! Health and cooldown policy
//!
//! `apply_outcome` is the single place membership state transitions happen.
//! It is a pure function of (membership, outcome, policy, now) so every
//! escalation rule can be tested without a pool or a clock.
//!
//! Thresholds are policy, not constants: the escalation curve (cooldown
//! doubling, suspend-after-N auth failures, cooldown-after-N transient
//! failures) is configurable per deployment.

use publisher::ErrorKind;
use serde::{Deserialize, Serialize};

use crate::member::{MemberStatus, PoolMembership};

/// Default base cooldown: 30 minutes.
pub const DEFAULT_BASE_COOLDOWN_MS: u64 = 30 * 60 * 1000;

/// Default escalation cap: 24 hours.
pub const DEFAULT_MAX_COOLDOWN_MS: u64 = 24 * 60 * 60 * 1000;

/// Thresholds driving membership state transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthPolicy {
    /// Cooldown applied on the first rate limit, and for transient-failure
    /// cooldowns. Overridden per pool by `PoolConfig::cooldown_ms`.
    pub base_cooldown_ms: u64,
    /// Upper bound for escalated cooldowns.
    pub max_cooldown_ms: u64,
    /// Consecutive failures at which an auth error escalates to Suspended,
    /// protecting against repeatedly retrying a broken credential.
    pub suspend_after_auth_failures: u32,
    /// Consecutive failures at which a transient error forces a cooldown.
    pub cooldown_after_transient_failures: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            base_cooldown_ms: DEFAULT_BASE_COOLDOWN_MS,
            max_cooldown_ms: DEFAULT_MAX_COOLDOWN_MS,
            suspend_after_auth_failures: 3,
            cooldown_after_transient_failures: 5,
        }
    }
}

impl HealthPolicy {
    /// Same thresholds with a different base cooldown (the pool's own).
    pub fn with_base_cooldown(&self, base_cooldown_ms: u64) -> Self {
        Self {
            base_cooldown_ms,
            ..*self
        }
    }

    /// Escalated cooldown duration for the nth consecutive rate limit
    /// (1-based): base doubled for each hit beyond the first, capped.
    pub fn escalated_cooldown_ms(&self, consecutive_rate_limits: u32) -> u64 {
        let exponent = consecutive_rate_limits.saturating_sub(1).min(16);
        self.base_cooldown_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_cooldown_ms)
    }
}

/// Result of one publish attempt, as seen by the health engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(ErrorKind),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Success => None,
            Outcome::Failure(kind) => Some(*kind),
        }
    }
}

/// Apply one outcome to a membership, in place.
///
/// Counters first, then the status transition keyed on the error kind.
/// `posts_today` is deliberately untouched: the reservation path counts it
/// at selection time and rolls it back on failure (see `AccountPool`).
pub fn apply_outcome(
    member: &mut PoolMembership,
    outcome: &Outcome,
    policy: &HealthPolicy,
    now_ms: u64,
) {
    member.last_used_at = Some(now_ms);

    match outcome {
        Outcome::Success => {
            member.success_count += 1;
            member.total_posts += 1;
            member.consecutive_failures = 0;
            member.consecutive_rate_limits = 0;
            member.status = MemberStatus::Active;
            member.cooldown_until = None;
            member.last_error = None;
        }
        Outcome::Failure(kind) => {
            member.failure_count += 1;
            member.consecutive_failures += 1;
            member.last_error = Some(kind.as_str().to_string());

            match kind {
                ErrorKind::RateLimited => {
                    member.consecutive_rate_limits += 1;
                    let duration = policy.escalated_cooldown_ms(member.consecutive_rate_limits);
                    let until = now_ms + duration;
                    member.status = MemberStatus::Cooldown { until };
                    member.cooldown_until = Some(until);
                }
                ErrorKind::AccountBanned => {
                    member.consecutive_rate_limits = 0;
                    member.status = MemberStatus::Banned;
                    member.cooldown_until = None;
                }
                ErrorKind::AccountSuspended => {
                    member.consecutive_rate_limits = 0;
                    member.status = MemberStatus::Suspended;
                    member.cooldown_until = None;
                }
                ErrorKind::AuthenticationError | ErrorKind::TokenExpired => {
                    member.consecutive_rate_limits = 0;
                    member.cooldown_until = None;
                    member.status = if member.consecutive_failures
                        >= policy.suspend_after_auth_failures
                    {
                        MemberStatus::Suspended
                    } else {
                        MemberStatus::Error
                    };
                }
                // Transient kinds: stay available for an immediate retry on a
                // different member unless the failures keep piling up.
                ErrorKind::NetworkError
                | ErrorKind::PlatformError
                | ErrorKind::ValidationError
                | ErrorKind::ContentRejected
                | ErrorKind::Unknown => {
                    member.consecutive_rate_limits = 0;
                    if member.consecutive_failures >= policy.cooldown_after_transient_failures {
                        let until = now_ms + policy.base_cooldown_ms;
                        member.status = MemberStatus::Cooldown { until };
                        member.cooldown_until = Some(until);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> PoolMembership {
        PoolMembership::new("acct-1".into(), 0, 1)
    }

    fn policy() -> HealthPolicy {
        HealthPolicy::default()
    }

    #[test]
    fn success_resets_failures_and_clears_error() {
        let mut m = member();
        m.consecutive_failures = 4;
        m.consecutive_rate_limits = 2;
        m.last_error = Some("rate_limited".into());
        m.status = MemberStatus::Error;

        apply_outcome(&mut m, &Outcome::Success, &policy(), 1_000);

        assert_eq!(m.consecutive_failures, 0);
        assert_eq!(m.consecutive_rate_limits, 0);
        assert_eq!(m.status, MemberStatus::Active);
        assert_eq!(m.success_count, 1);
        assert_eq!(m.total_posts, 1);
        assert!(m.last_error.is_none());
        assert_eq!(m.last_used_at, Some(1_000));
    }

    #[test]
    fn rate_limit_applies_base_cooldown_first() {
        let mut m = member();
        apply_outcome(
            &mut m,
            &Outcome::Failure(ErrorKind::RateLimited),
            &policy(),
            1_000,
        );
        assert_eq!(
            m.status,
            MemberStatus::Cooldown {
                until: 1_000 + DEFAULT_BASE_COOLDOWN_MS
            }
        );
        assert_eq!(m.cooldown_until, Some(1_000 + DEFAULT_BASE_COOLDOWN_MS));
        assert_eq!(m.last_error.as_deref(), Some("rate_limited"));
    }

    #[test]
    fn consecutive_rate_limits_double_the_cooldown() {
        let mut m = member();
        // consecutive_failures = 2 beforehand, per the scenario: unrelated
        // counters must not affect the escalation curve
        m.consecutive_failures = 2;

        apply_outcome(&mut m, &Outcome::Failure(ErrorKind::RateLimited), &policy(), 0);
        assert_eq!(m.cooldown_until, Some(DEFAULT_BASE_COOLDOWN_MS));

        // second consecutive rate limit, after the first cooldown expired
        let now = DEFAULT_BASE_COOLDOWN_MS;
        apply_outcome(&mut m, &Outcome::Failure(ErrorKind::RateLimited), &policy(), now);
        assert_eq!(m.cooldown_until, Some(now + 2 * DEFAULT_BASE_COOLDOWN_MS));

        let now = 3 * DEFAULT_BASE_COOLDOWN_MS;
        apply_outcome(&mut m, &Outcome::Failure(ErrorKind::RateLimited), &policy(), now);
        assert_eq!(m.cooldown_until, Some(now + 4 * DEFAULT_BASE_COOLDOWN_MS));
    }

    #[test]
    fn escalation_caps_at_max_cooldown() {
        let p = policy();
        assert_eq!(p.escalated_cooldown_ms(1), DEFAULT_BASE_COOLDOWN_MS);
        assert_eq!(p.escalated_cooldown_ms(2), 2 * DEFAULT_BASE_COOLDOWN_MS);
        // 30min * 2^6 = 32h > 24h cap
        assert_eq!(p.escalated_cooldown_ms(7), DEFAULT_MAX_COOLDOWN_MS);
        assert_eq!(p.escalated_cooldown_ms(u32::MAX), DEFAULT_MAX_COOLDOWN_MS);
    }

    #[test]
    fn intervening_failure_resets_rate_limit_escalation() {
        let mut m = member();
        apply_outcome(&mut m, &Outcome::Failure(ErrorKind::RateLimited), &policy(), 0);
        apply_outcome(&mut m, &Outcome::Failure(ErrorKind::NetworkError), &policy(), 1);
        assert_eq!(m.consecutive_rate_limits, 0);

        // Next rate limit is treated as the first again
        apply_outcome(&mut m, &Outcome::Failure(ErrorKind::RateLimited), &policy(), 2);
        assert_eq!(m.cooldown_until, Some(2 + DEFAULT_BASE_COOLDOWN_MS));
    }

    #[test]
    fn ban_and_suspension_are_terminal() {
        let mut m = member();
        apply_outcome(&mut m, &Outcome::Failure(ErrorKind::AccountBanned), &policy(), 0);
        assert_eq!(m.status, MemberStatus::Banned);

        let mut m = member();
        apply_outcome(
            &mut m,
            &Outcome::Failure(ErrorKind::AccountSuspended),
            &policy(),
            0,
        );
        assert_eq!(m.status, MemberStatus::Suspended);
    }

    #[test]
    fn auth_errors_escalate_to_suspended_at_threshold() {
        let mut m = member();
        apply_outcome(
            &mut m,
            &Outcome::Failure(ErrorKind::AuthenticationError),
            &policy(),
            0,
        );
        assert_eq!(m.status, MemberStatus::Error);

        apply_outcome(&mut m, &Outcome::Failure(ErrorKind::TokenExpired), &policy(), 1);
        assert_eq!(m.status, MemberStatus::Error);

        // third consecutive auth failure hits the default threshold
        apply_outcome(
            &mut m,
            &Outcome::Failure(ErrorKind::AuthenticationError),
            &policy(),
            2,
        );
        assert_eq!(m.status, MemberStatus::Suspended);
    }

    #[test]
    fn transient_failures_leave_status_until_threshold() {
        let mut m = member();
        for i in 0..4 {
            apply_outcome(&mut m, &Outcome::Failure(ErrorKind::NetworkError), &policy(), i);
            assert_eq!(m.status, MemberStatus::Active, "failure {i} must not cool down");
        }
        // fifth consecutive transient failure forces a base-duration cooldown
        apply_outcome(&mut m, &Outcome::Failure(ErrorKind::PlatformError), &policy(), 100);
        assert_eq!(
            m.status,
            MemberStatus::Cooldown {
                until: 100 + DEFAULT_BASE_COOLDOWN_MS
            }
        );
    }

    #[test]
    fn custom_thresholds_are_respected() {
        let p = HealthPolicy {
            base_cooldown_ms: 1_000,
            max_cooldown_ms: 3_000,
            suspend_after_auth_failures: 1,
            cooldown_after_transient_failures: 1,
        };

        let mut m = member();
        apply_outcome(&mut m, &Outcome::Failure(ErrorKind::TokenExpired), &p, 0);
        assert_eq!(m.status, MemberStatus::Suspended);

        let mut m = member();
        apply_outcome(&mut m, &Outcome::Failure(ErrorKind::NetworkError), &p, 0);
        assert_eq!(m.status, MemberStatus::Cooldown { until: 1_000 });

        // cap binds the escalation
        assert_eq!(p.escalated_cooldown_ms(3), 3_000);
    }
}
