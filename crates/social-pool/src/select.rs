//! Rotation strategies and candidate selection
//!
//! Pure decision logic: given a pool's members, an exclusion set, and the
//! clock, pick the next member to try. No interior state — round-robin is
//! expressed through persisted `last_used_at` ordering rather than an
//! in-process cursor, so multiple service instances sharing one pool rotate
//! correctly.

use std::collections::HashSet;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::member::PoolMembership;

/// How a pool orders its members for selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    /// Oldest `last_used_at` first (never-used members before all others);
    /// ties broken by lowest account id for determinism.
    #[default]
    RoundRobin,
    /// Uniform random pick among eligible members.
    Random,
    /// Lowest `total_posts` first; ties by the round-robin rule.
    LeastUsed,
    /// Lowest `priority` value first; ties by the least-used rule.
    Priority,
}

impl RotationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationStrategy::RoundRobin => "round_robin",
            RotationStrategy::Random => "random",
            RotationStrategy::LeastUsed => "least_used",
            RotationStrategy::Priority => "priority",
        }
    }
}

/// Select the next eligible member, returning its index into `members`.
///
/// Never returns a member whose account id is in `excluded`, one that is
/// in-flight, cooling down (at `now_ms`), Suspended, Banned, or at its
/// daily cap. `None` means pool-exhausted, a normal outcome the dispatcher
/// handles, not an error here.
pub fn select_next(
    strategy: RotationStrategy,
    members: &[PoolMembership],
    excluded: &HashSet<String>,
    max_posts_per_day: u32,
    now_ms: u64,
) -> Option<usize> {
    let eligible: Vec<usize> = members
        .iter()
        .enumerate()
        .filter(|(_, m)| !excluded.contains(&m.account_id) && m.is_eligible(now_ms, max_posts_per_day))
        .map(|(i, _)| i)
        .collect();

    if eligible.is_empty() {
        return None;
    }

    match strategy {
        RotationStrategy::RoundRobin => eligible
            .into_iter()
            .min_by_key(|&i| round_robin_key(&members[i])),
        RotationStrategy::Random => eligible.choose(&mut rand::rng()).copied(),
        RotationStrategy::LeastUsed => eligible
            .into_iter()
            .min_by_key(|&i| least_used_key(&members[i])),
        RotationStrategy::Priority => eligible
            .into_iter()
            .min_by_key(|&i| (members[i].priority, least_used_key(&members[i]))),
    }
}

// Option<u64> orders None first, which is exactly the "never used wins" rule.
fn round_robin_key(m: &PoolMembership) -> (Option<u64>, &str) {
    (m.last_used_at, m.account_id.as_str())
}

fn least_used_key(m: &PoolMembership) -> (u64, Option<u64>, &str) {
    (m.total_posts, m.last_used_at, m.account_id.as_str())
}
