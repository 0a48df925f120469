//! Pool state and reservation machinery
//!
//! An `AccountPool` holds the per-(brand, platform) membership list behind a
//! single pool-scoped `RwLock`. Selection and reservation happen in one
//! write-lock critical section: the chosen member is marked in-flight and its
//! `posts_today` counter is incremented before the lock drops, so two
//! concurrent dispatches can never both book the last slot under a daily cap.
//!
//! The lock is never held across the external publish call. `record`
//! finalizes the reservation whatever the outcome — including timeouts — and
//! a background sweep force-releases anything left behind.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use social_accounts::Platform;
use social_accounts::store::now_millis;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::member::{MemberStatus, PoolMembership};
use crate::policy::{DEFAULT_BASE_COOLDOWN_MS, HealthPolicy, Outcome, apply_outcome};
use crate::select::{RotationStrategy, select_next};

fn default_cooldown_ms() -> u64 {
    DEFAULT_BASE_COOLDOWN_MS
}

fn default_max_posts_per_day() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

/// Pool configuration for one (brand, platform) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub id: String,
    pub brand_id: String,
    pub platform: Platform,
    #[serde(default)]
    pub strategy: RotationStrategy,
    /// Base cooldown applied when a member is rate limited.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Daily post cap per member.
    #[serde(default = "default_max_posts_per_day")]
    pub max_posts_per_day: u32,
    /// When false, dispatch stops after the first failed member instead of
    /// trying alternates.
    #[serde(default = "default_true")]
    pub auto_failover: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl PoolConfig {
    pub fn new(brand_id: impl Into<String>, platform: Platform) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            brand_id: brand_id.into(),
            platform,
            strategy: RotationStrategy::default(),
            cooldown_ms: default_cooldown_ms(),
            max_posts_per_day: default_max_posts_per_day(),
            auto_failover: true,
            active: true,
        }
    }
}

/// A live reservation handed to the dispatcher: exactly one membership is
/// held in-flight until `record` runs.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub membership_id: String,
    pub account_id: String,
}

/// Per-status member counts for dashboards and exhaustion reporting.
///
/// Computed with lazy cooldown expiry applied: an expired cooldown counts as
/// active even if the stored status hasn't been normalized yet.
#[derive(Debug, Clone, Serialize)]
pub struct PoolHealth {
    pub member_count: usize,
    pub active: usize,
    pub cooldown: usize,
    pub suspended: usize,
    pub banned: usize,
    pub error: usize,
    pub in_flight: usize,
}

/// One rotating account pool.
#[derive(Debug)]
pub struct AccountPool {
    config: PoolConfig,
    members: RwLock<Vec<PoolMembership>>,
}

impl AccountPool {
    pub fn new(config: PoolConfig) -> Self {
        Self::with_members(config, Vec::new())
    }

    /// Rebuild a pool from persisted state. Reservations do not survive a
    /// restart: in-flight flags are cleared and the cap slot each one held
    /// (`posts_today` is counted at reservation time) is given back, the
    /// same rollback `record` and `release_stale` perform.
    pub fn with_members(config: PoolConfig, mut members: Vec<PoolMembership>) -> Self {
        for m in &mut members {
            if m.in_flight {
                m.posts_today = m.posts_today.saturating_sub(1);
            }
            m.in_flight = false;
            m.reserved_at = None;
        }
        Self {
            config,
            members: RwLock::new(members),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Select an eligible member and reserve it in one atomic step.
    ///
    /// The member is marked in-flight and its `posts_today` incremented under
    /// the write lock, so a concurrent reserve observes the updated counter.
    /// Returns `None` when no member is eligible (pool exhausted).
    pub async fn reserve(&self, excluded: &HashSet<String>) -> Option<Reservation> {
        let mut members = self.members.write().await;
        let now = now_millis();
        let idx = select_next(
            self.config.strategy,
            &members,
            excluded,
            self.config.max_posts_per_day,
            now,
        )?;
        let member = &mut members[idx];
        member.in_flight = true;
        member.reserved_at = Some(now);
        member.posts_today += 1;
        Some(Reservation {
            membership_id: member.id.clone(),
            account_id: member.account_id.clone(),
        })
    }

    /// Record a publish outcome, releasing the reservation.
    ///
    /// On failure the reservation's `posts_today` increment is rolled back —
    /// only delivered posts count toward the daily cap. Returns the updated
    /// membership snapshot.
    pub async fn record(
        &self,
        membership_id: &str,
        outcome: &Outcome,
        policy: &HealthPolicy,
    ) -> Result<PoolMembership> {
        let mut members = self.members.write().await;
        let member = members
            .iter_mut()
            .find(|m| m.id == membership_id)
            .ok_or_else(|| Error::MembershipNotFound(membership_id.to_string()))?;

        let was_reserved = member.in_flight;
        member.in_flight = false;
        member.reserved_at = None;

        match outcome {
            Outcome::Success if !was_reserved => {
                // Direct recording path (no reservation): count the post here.
                member.posts_today += 1;
            }
            Outcome::Failure(_) if was_reserved => {
                member.posts_today = member.posts_today.saturating_sub(1);
            }
            _ => {}
        }

        let pool_policy = policy.with_base_cooldown(self.config.cooldown_ms);
        apply_outcome(member, outcome, &pool_policy, now_millis());

        if let Some(kind) = outcome.error_kind() {
            info!(
                pool_id = %self.config.id,
                membership_id,
                account_id = %member.account_id,
                error_kind = kind.as_str(),
                status = member.status.label(),
                "publish failure recorded"
            );
        }
        Ok(member.clone())
    }

    /// Force-release reservations older than `max_age_ms`.
    ///
    /// Safety net for publish paths that never reached `record` (task
    /// cancelled, process hiccup). Rolled-back like a failure.
    pub async fn release_stale(&self, max_age_ms: u64) -> usize {
        let mut members = self.members.write().await;
        let now = now_millis();
        let mut released = 0usize;
        for member in members.iter_mut() {
            if member.in_flight
                && member
                    .reserved_at
                    .is_some_and(|at| now.saturating_sub(at) > max_age_ms)
            {
                warn!(
                    pool_id = %self.config.id,
                    membership_id = %member.id,
                    "force-releasing stale reservation"
                );
                member.in_flight = false;
                member.reserved_at = None;
                member.posts_today = member.posts_today.saturating_sub(1);
                released += 1;
            }
        }
        released
    }

    /// Flip expired cooldowns back to Active in stored state.
    ///
    /// Pure cleanliness: eligibility already treats expired cooldowns as
    /// active, so correctness never depends on this running.
    pub async fn normalize_cooldowns(&self) -> usize {
        let mut members = self.members.write().await;
        let now = now_millis();
        let mut normalized = 0usize;
        for member in members.iter_mut() {
            if let MemberStatus::Cooldown { until } = member.status
                && now >= until
            {
                member.status = MemberStatus::Active;
                member.cooldown_until = None;
                normalized += 1;
            }
        }
        if normalized > 0 {
            info!(pool_id = %self.config.id, members = normalized, "cooldowns expired, members active again");
        }
        normalized
    }

    /// Per-status counts with lazy cooldown expiry applied.
    pub async fn health(&self) -> PoolHealth {
        let members = self.members.read().await;
        let now = now_millis();
        let mut health = PoolHealth {
            member_count: members.len(),
            active: 0,
            cooldown: 0,
            suspended: 0,
            banned: 0,
            error: 0,
            in_flight: 0,
        };
        for m in members.iter() {
            if m.in_flight {
                health.in_flight += 1;
            }
            match m.effective_label(now) {
                "active" => health.active += 1,
                "cooldown" => health.cooldown += 1,
                "suspended" => health.suspended += 1,
                "banned" => health.banned += 1,
                _ => health.error += 1,
            }
        }
        health
    }

    /// Build the exhausted error message JSON with pool counts.
    pub async fn exhausted_message(&self) -> String {
        let health = self.health().await;
        serde_json::json!({
            "error": {
                "type": "pool_exhausted",
                "message": "no eligible account in pool",
                "pool": {
                    "id": self.config.id,
                    "members_total": health.member_count,
                    "members_active": health.active,
                    "members_cooldown": health.cooldown,
                    "members_suspended": health.suspended,
                    "members_banned": health.banned,
                    "members_error": health.error,
                }
            }
        })
        .to_string()
    }

    /// Add an account to the pool. Administrative, off the hot path.
    pub async fn add_member(
        &self,
        account_id: &str,
        priority: u32,
        weight: u32,
    ) -> Result<PoolMembership> {
        let mut members = self.members.write().await;
        if members.iter().any(|m| m.account_id == account_id) {
            return Err(Error::DuplicateMember(account_id.to_string()));
        }
        let member = PoolMembership::new(account_id.to_string(), priority, weight);
        info!(pool_id = %self.config.id, account_id, membership_id = %member.id, "member added to pool");
        members.push(member.clone());
        Ok(member)
    }

    /// Remove a membership from the pool.
    pub async fn remove_member(&self, membership_id: &str) -> Result<PoolMembership> {
        let mut members = self.members.write().await;
        let idx = members
            .iter()
            .position(|m| m.id == membership_id)
            .ok_or_else(|| Error::MembershipNotFound(membership_id.to_string()))?;
        let removed = members.remove(idx);
        info!(pool_id = %self.config.id, membership_id, account_id = %removed.account_id, "member removed from pool");
        Ok(removed)
    }

    /// Administrative override: clear Suspended/Banned/Error back to Active.
    pub async fn reset_membership(&self, membership_id: &str) -> Result<PoolMembership> {
        let mut members = self.members.write().await;
        let member = members
            .iter_mut()
            .find(|m| m.id == membership_id)
            .ok_or_else(|| Error::MembershipNotFound(membership_id.to_string()))?;
        member.status = MemberStatus::Active;
        member.cooldown_until = None;
        member.consecutive_failures = 0;
        member.consecutive_rate_limits = 0;
        member.last_error = None;
        info!(pool_id = %self.config.id, membership_id, "membership reset to active");
        Ok(member.clone())
    }

    /// Zero every member's `posts_today`. Idempotent.
    pub async fn reset_daily(&self) -> usize {
        let mut members = self.members.write().await;
        let mut touched = 0usize;
        for member in members.iter_mut() {
            if member.posts_today != 0 {
                member.posts_today = 0;
                touched += 1;
            }
        }
        touched
    }

    /// Snapshot of all memberships.
    pub async fn members(&self) -> Vec<PoolMembership> {
        self.members.read().await.clone()
    }

    /// Number of members.
    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    /// Look up one membership by id.
    pub async fn get_member(&self, membership_id: &str) -> Option<PoolMembership> {
        self.members
            .read()
            .await
            .iter()
            .find(|m| m.id == membership_id)
            .cloned()
    }
}
