//! Periodic pool maintenance
//!
//! Spawns a background task that sweeps every registered pool: stale
//! reservations are force-released and expired cooldowns are normalized back
//! to Active. The sweep runs independently of the dispatch path, which
//! already handles expired cooldowns lazily; the task keeps health snapshots
//! honest between dispatches and cleans up after crashed publish attempts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::registry::PoolRegistry;

/// Spawn a background task that sweeps all pools every `interval`.
///
/// Reservations older than `max_reservation_age` are released and their
/// daily-cap increment rolled back. Cooldowns whose deadline passed are
/// flipped to Active so health reads reflect reality.
///
/// Returns a `JoinHandle` for the spawned task.
pub fn spawn_sweep_task(
    registry: Arc<PoolRegistry>,
    interval: Duration,
    max_reservation_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick — pools were just loaded
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_cycle(&registry, max_reservation_age).await;
        }
    })
}

/// Run one sweep cycle over every registered pool.
async fn sweep_cycle(registry: &PoolRegistry, max_reservation_age: Duration) {
    let max_age_ms = max_reservation_age.as_millis() as u64;
    for pool in registry.pools().await {
        let released = pool.release_stale(max_age_ms).await;
        let normalized = pool.normalize_cooldowns().await;
        if released > 0 {
            info!(
                pool_id = %pool.config().id,
                released,
                "released stale reservations"
            );
        }
        if normalized > 0 {
            debug!(
                pool_id = %pool.config().id,
                normalized,
                "normalized expired cooldowns"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{MemberStatus, PoolMembership};
    use crate::pool::{AccountPool, PoolConfig};
    use social_accounts::Platform;
    use std::collections::HashSet;

    #[tokio::test]
    async fn cycle_normalizes_cooldowns_and_keeps_fresh_reservations() {
        let registry = PoolRegistry::new();
        let config = PoolConfig::new("brand-a", Platform::X);
        let mut expired = PoolMembership::new("a".into(), 0, 1);
        expired.status = MemberStatus::Cooldown { until: 1 };
        expired.cooldown_until = Some(1);
        let pool = registry
            .insert(AccountPool::with_members(
                config,
                vec![expired, PoolMembership::new("b".into(), 0, 1)],
            ))
            .await
            .unwrap();

        // a reservation made just now is not stale
        let reservation = pool.reserve(&HashSet::new()).await.unwrap();

        sweep_cycle(&registry, Duration::from_secs(60)).await;

        let members = pool.members().await;
        assert!(
            members.iter().all(|m| m.status == MemberStatus::Active),
            "expired cooldown flipped to active"
        );
        let reserved = pool.get_member(&reservation.membership_id).await.unwrap();
        assert!(reserved.in_flight, "fresh reservation survives the sweep");
    }

    #[tokio::test(start_paused = true)]
    async fn task_skips_first_tick() {
        let registry = Arc::new(PoolRegistry::new());
        let handle = spawn_sweep_task(
            registry,
            Duration::from_secs(300),
            Duration::from_secs(600),
        );
        // A cycle before the first interval elapses would be wasted work on
        // freshly loaded pools; just make sure the task is alive.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
