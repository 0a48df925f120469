//! Dispatch coordination
//!
//! The entry point for "publish to platform X for brand Y". Looks up the
//! pool, reserves a member, invokes the external publish capability under a
//! timeout, records the outcome, and fails over to the next member inside an
//! explicit bounded loop with an exclusion set.
//!
//! Error propagation policy: per-account failures (network, rate limit,
//! platform, auth) are recovered locally by failing over; per-content
//! failures (rejected/invalid content) are surfaced immediately since no
//! account swap fixes bad content. The caller sees "the pool" posting, never
//! a raw single-account error, unless every candidate is exhausted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::Secret;
use serde::Serialize;
use social_accounts::{AccountHealth, AccountStore, Platform, SocialAccount};
use tracing::{debug, info, warn};

use publisher::{AccountHandle, Content, ErrorKind, PublishError, Publisher};

use crate::audit::{AuditLog, OutcomeRecord};
use crate::error::{Error, Result};
use crate::member::MemberStatus;
use crate::policy::{HealthPolicy, Outcome};
use crate::pool::AccountPool;
use crate::registry::PoolRegistry;

/// What the caller of `dispatch` gets back.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub request_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Coordinates pools, the account store, and the publish capability.
pub struct Dispatcher {
    registry: Arc<PoolRegistry>,
    accounts: Arc<AccountStore>,
    publisher: Arc<dyn Publisher>,
    policy: HealthPolicy,
    max_attempts: u32,
    publish_timeout: Duration,
    audit: Arc<AuditLog>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<PoolRegistry>,
        accounts: Arc<AccountStore>,
        publisher: Arc<dyn Publisher>,
        policy: HealthPolicy,
        max_attempts: u32,
        publish_timeout: Duration,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            registry,
            accounts,
            publisher,
            policy,
            max_attempts,
            publish_timeout,
            audit,
        }
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    /// Publish `content` for `brand_id` on `platform` through the pool.
    ///
    /// Fails with `PoolNotConfigured` when no active pool exists and
    /// `PoolExhausted` when no eligible member can be reserved; both are
    /// operational conditions for an operator, not retryable publish errors.
    pub async fn dispatch(
        &self,
        brand_id: &str,
        platform: Platform,
        content: &Content,
    ) -> Result<DispatchResult> {
        let request_id = format!("disp_{}", uuid::Uuid::new_v4().simple());
        let pool = self.registry.get(brand_id, platform).await?;
        if !pool.config().active {
            return Err(Error::PoolNotConfigured {
                brand_id: brand_id.to_string(),
                platform,
            });
        }

        let member_count = pool.member_count().await;
        if member_count == 0 {
            return Err(Error::PoolExhausted(pool.exhausted_message().await));
        }
        let max_attempts = self.max_attempts.min(member_count as u32).max(1);

        let mut excluded: HashSet<String> = HashSet::new();
        let mut last_failure: Option<(PublishError, String, String, u32)> = None;

        for attempt in 1..=max_attempts {
            let Some(reservation) = pool.reserve(&excluded).await else {
                return Err(Error::PoolExhausted(pool.exhausted_message().await));
            };

            debug!(
                request_id,
                pool_id = %pool.config().id,
                account_id = %reservation.account_id,
                attempt,
                "member reserved"
            );

            let account = match self.accounts.get(&reservation.account_id).await {
                Some(a) if a.active => a,
                _ => {
                    warn!(
                        request_id,
                        account_id = %reservation.account_id,
                        "account in pool but missing or deactivated in store"
                    );
                    let err = PublishError::new(
                        ErrorKind::Unknown,
                        "account missing from store",
                    );
                    self.finish_attempt(
                        &pool,
                        &reservation.membership_id,
                        &request_id,
                        &Outcome::Failure(err.kind),
                        0,
                    )
                    .await?;
                    excluded.insert(reservation.account_id.clone());
                    last_failure = Some((
                        err,
                        reservation.account_id,
                        reservation.membership_id,
                        attempt,
                    ));
                    continue;
                }
            };

            let handle = account_handle(&account);
            let started = Instant::now();
            let publish_result = match tokio::time::timeout(
                self.publish_timeout,
                self.publisher.publish(&handle, content),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(PublishError::new(
                    ErrorKind::NetworkError,
                    format!("publish timed out after {:?}", self.publish_timeout),
                )),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            match publish_result {
                Ok(receipt) => {
                    self.finish_attempt(
                        &pool,
                        &reservation.membership_id,
                        &request_id,
                        &Outcome::Success,
                        latency_ms,
                    )
                    .await?;
                    info!(
                        request_id,
                        pool_id = %pool.config().id,
                        account_id = %reservation.account_id,
                        post_id = %receipt.post_id,
                        attempts = attempt,
                        "dispatch succeeded"
                    );
                    return Ok(DispatchResult {
                        request_id,
                        success: true,
                        account_id: Some(reservation.account_id),
                        membership_id: Some(reservation.membership_id),
                        post_id: Some(receipt.post_id),
                        url: receipt.url,
                        attempts: attempt,
                        error: None,
                        error_kind: None,
                    });
                }
                Err(err) => {
                    self.finish_attempt(
                        &pool,
                        &reservation.membership_id,
                        &request_id,
                        &Outcome::Failure(err.kind),
                        latency_ms,
                    )
                    .await?;

                    // Content-level failures: no account swap can fix these.
                    if err.kind.is_content_error() {
                        info!(
                            request_id,
                            error_kind = err.kind.as_str(),
                            "content rejected, failover skipped"
                        );
                        return Ok(failure_result(
                            request_id,
                            reservation.account_id,
                            reservation.membership_id,
                            attempt,
                            &err,
                        ));
                    }

                    excluded.insert(reservation.account_id.clone());
                    last_failure = Some((
                        err,
                        reservation.account_id,
                        reservation.membership_id,
                        attempt,
                    ));

                    if !pool.config().auto_failover {
                        break;
                    }
                }
            }
        }

        // Attempts exhausted (or failover disabled): surface the last failure.
        let (err, account_id, membership_id, attempts) = last_failure
            .unwrap_or_else(|| {
                // Unreachable in practice: the loop either returns or records
                // a failure. Kept as a defined result rather than a panic.
                (
                    PublishError::new(ErrorKind::Unknown, "no attempt made"),
                    String::new(),
                    String::new(),
                    0,
                )
            });
        warn!(
            request_id,
            error_kind = err.kind.as_str(),
            attempts,
            "dispatch failed after all attempts"
        );
        Ok(failure_result(request_id, account_id, membership_id, attempts, &err))
    }

    /// Record an attempt everywhere it counts: pool state, account counters,
    /// audit log, metrics.
    async fn finish_attempt(
        &self,
        pool: &Arc<AccountPool>,
        membership_id: &str,
        request_id: &str,
        outcome: &Outcome,
        latency_ms: u64,
    ) -> Result<()> {
        let updated = pool.record(membership_id, outcome, &self.policy).await?;

        let health = account_health(&updated.status);
        if let Err(e) = self
            .accounts
            .record_outcome(
                &updated.account_id,
                outcome.is_success(),
                health,
                updated.last_error.clone(),
            )
            .await
        {
            warn!(request_id, account_id = %updated.account_id, error = %e, "failed to mirror outcome to account store");
        }

        let record = OutcomeRecord::new(
            request_id,
            &pool.config().id,
            membership_id,
            &updated.account_id,
            pool.config().platform,
            outcome.error_kind(),
            latency_ms,
        );
        if let Err(e) = self.audit.append(&record).await {
            warn!(request_id, error = %e, "failed to append audit record");
        }

        let kind_label = outcome
            .error_kind()
            .map(|k| k.as_str())
            .unwrap_or("success");
        metrics::counter!(
            "dispatch_attempts_total",
            "platform" => pool.config().platform.as_str(),
            "kind" => kind_label
        )
        .increment(1);
        Ok(())
    }
}

fn account_handle(account: &SocialAccount) -> AccountHandle {
    AccountHandle {
        account_id: account.id.clone(),
        platform: account.platform,
        handle: account.handle.clone(),
        access_token: Secret::new(account.access_token.clone()),
    }
}

/// Map a membership status to the account-level health mirror.
fn account_health(status: &MemberStatus) -> AccountHealth {
    match status {
        MemberStatus::Active => AccountHealth::Active,
        MemberStatus::Cooldown { .. } => AccountHealth::Cooldown,
        MemberStatus::Suspended => AccountHealth::Suspended,
        MemberStatus::Banned => AccountHealth::Banned,
        MemberStatus::Error => AccountHealth::Error,
    }
}

fn failure_result(
    request_id: String,
    account_id: String,
    membership_id: String,
    attempts: u32,
    err: &PublishError,
) -> DispatchResult {
    DispatchResult {
        request_id,
        success: false,
        account_id: Some(account_id),
        membership_id: Some(membership_id),
        post_id: None,
        url: None,
        attempts,
        error: Some(err.message.clone()),
        error_kind: Some(err.kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::PoolMembership;
    use crate::pool::PoolConfig;
    use publisher::PostReceipt;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use tokio::sync::Mutex;

    /// Publisher returning scripted results in order, recording which
    /// accounts it was called with.
    struct ScriptedPublisher {
        script: Mutex<VecDeque<std::result::Result<PostReceipt, PublishError>>>,
        calls: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl ScriptedPublisher {
        fn new(script: Vec<std::result::Result<PostReceipt, PublishError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        async fn calls(&self) -> Vec<String> {
            self.calls.lock().await.clone()
        }
    }

    impl Publisher for ScriptedPublisher {
        fn id(&self) -> &str {
            "scripted"
        }

        fn publish<'a>(
            &'a self,
            account: &'a AccountHandle,
            _content: &'a Content,
        ) -> Pin<Box<dyn Future<Output = publisher::Result<PostReceipt>> + Send + 'a>> {
            Box::pin(async move {
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.calls.lock().await.push(account.account_id.clone());
                self.script
                    .lock()
                    .await
                    .pop_front()
                    .unwrap_or_else(|| Ok(receipt("fallback")))
            })
        }
    }

    fn receipt(id: &str) -> PostReceipt {
        PostReceipt {
            post_id: id.to_string(),
            url: None,
        }
    }

    fn fail(kind: ErrorKind) -> std::result::Result<PostReceipt, PublishError> {
        Err(PublishError::new(kind, "scripted failure"))
    }

    fn content() -> Content {
        Content {
            text: "hello world".into(),
            media_urls: vec![],
            link: None,
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        publisher: Arc<ScriptedPublisher>,
        pool: Arc<AccountPool>,
        _dir: tempfile::TempDir,
    }

    /// Build a dispatcher over one pool with the given member account ids.
    async fn harness(
        accounts: &[&str],
        config: PoolConfig,
        publisher: ScriptedPublisher,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            AccountStore::load(dir.path().join("accounts.json"))
                .await
                .unwrap(),
        );
        let mut members = Vec::new();
        for id in accounts {
            store
                .add(SocialAccount::new(
                    id.to_string(),
                    config.platform,
                    config.brand_id.clone(),
                    format!("@{id}"),
                    format!("tok_{id}"),
                ))
                .await
                .unwrap();
            members.push(PoolMembership::new(id.to_string(), 0, 1));
        }
        let registry = Arc::new(PoolRegistry::new());
        let pool = registry
            .insert(AccountPool::with_members(config, members))
            .await
            .unwrap();
        let publisher = Arc::new(publisher);
        let dispatcher = Dispatcher::new(
            registry,
            store,
            publisher.clone(),
            HealthPolicy::default(),
            3,
            Duration::from_millis(500),
            Arc::new(AuditLog::disabled()),
        );
        Harness {
            dispatcher,
            publisher,
            pool,
            _dir: dir,
        }
    }

    fn config() -> PoolConfig {
        PoolConfig::new("brand-a", Platform::Instagram)
    }

    #[tokio::test]
    async fn round_robin_rotates_across_calls() {
        // Scenario: 3 active members, all never used. First call picks the
        // lowest account id; second call picks a different member.
        let h = harness(
            &["a", "b", "c"],
            config(),
            ScriptedPublisher::new(vec![Ok(receipt("p1")), Ok(receipt("p2"))]),
        )
        .await;

        let first = h
            .dispatcher
            .dispatch("brand-a", Platform::Instagram, &content())
            .await
            .unwrap();
        assert!(first.success);
        assert_eq!(first.account_id.as_deref(), Some("a"));

        let member = h
            .pool
            .get_member(first.membership_id.as_deref().unwrap())
            .await
            .unwrap();
        assert!(member.last_used_at.is_some());

        let second = h
            .dispatcher
            .dispatch("brand-a", Platform::Instagram, &content())
            .await
            .unwrap();
        assert!(second.success);
        assert_ne!(second.account_id, first.account_id);
    }

    #[tokio::test]
    async fn failover_tries_next_member() {
        let h = harness(
            &["a", "b"],
            config(),
            ScriptedPublisher::new(vec![fail(ErrorKind::RateLimited), Ok(receipt("p1"))]),
        )
        .await;

        let result = h
            .dispatcher
            .dispatch("brand-a", Platform::Instagram, &content())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.account_id.as_deref(), Some("b"));
        assert_eq!(h.publisher.calls().await, vec!["a", "b"]);

        // the rate-limited member cooled down
        assert_eq!(h.pool.health().await.cooldown, 1);
    }

    #[tokio::test]
    async fn content_rejection_skips_failover() {
        // Scenario: ContentRejected on the first candidate returns failure
        // immediately without trying the remaining eligible candidates.
        let h = harness(
            &["a", "b", "c"],
            config(),
            ScriptedPublisher::new(vec![fail(ErrorKind::ContentRejected)]),
        )
        .await;

        let result = h
            .dispatcher
            .dispatch("brand-a", Platform::Instagram, &content())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::ContentRejected));
        assert_eq!(result.attempts, 1);
        assert_eq!(h.publisher.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn all_banned_is_exhausted_without_publishing() {
        // Scenario: all members Banned → PoolExhausted without ever calling
        // the publish capability.
        let h = harness(
            &["a", "b", "c"],
            config(),
            ScriptedPublisher::new(vec![]),
        )
        .await;
        for m in h.pool.members().await {
            h.pool
                .record(
                    &m.id,
                    &Outcome::Failure(ErrorKind::AccountBanned),
                    &HealthPolicy::default(),
                )
                .await
                .unwrap();
        }

        let err = h
            .dispatcher
            .dispatch("brand-a", Platform::Instagram, &content())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PoolExhausted(_)));
        assert!(h.publisher.calls().await.is_empty());
    }

    #[tokio::test]
    async fn failover_terminates_within_bounds() {
        // All members rate limited: terminates within min(max_attempts, K)
        // attempts and reports the failure.
        let h = harness(
            &["a", "b", "c"],
            config(),
            ScriptedPublisher::new(vec![
                fail(ErrorKind::RateLimited),
                fail(ErrorKind::RateLimited),
                fail(ErrorKind::RateLimited),
            ]),
        )
        .await;

        let result = h
            .dispatcher
            .dispatch("brand-a", Platform::Instagram, &content())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.error_kind, Some(ErrorKind::RateLimited));
        assert_eq!(h.publisher.calls().await.len(), 3);
    }

    #[tokio::test]
    async fn attempts_bounded_by_member_count() {
        let h = harness(
            &["a"],
            config(),
            ScriptedPublisher::new(vec![fail(ErrorKind::NetworkError)]),
        )
        .await;

        let result = h
            .dispatcher
            .dispatch("brand-a", Platform::Instagram, &content())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.attempts, 1, "one member means one attempt");
    }

    #[tokio::test]
    async fn auto_failover_disabled_stops_after_first_failure() {
        let mut cfg = config();
        cfg.auto_failover = false;
        let h = harness(
            &["a", "b"],
            cfg,
            ScriptedPublisher::new(vec![fail(ErrorKind::PlatformError)]),
        )
        .await;

        let result = h
            .dispatcher
            .dispatch("brand-a", Platform::Instagram, &content())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(h.publisher.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_pool_errors() {
        let h = harness(&["a"], config(), ScriptedPublisher::new(vec![])).await;
        let err = h
            .dispatcher
            .dispatch("brand-a", Platform::TikTok, &content())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PoolNotConfigured { .. }));
    }

    #[tokio::test]
    async fn inactive_pool_is_not_configured() {
        let mut cfg = config();
        cfg.active = false;
        let h = harness(&["a"], cfg, ScriptedPublisher::new(vec![])).await;
        let err = h
            .dispatcher
            .dispatch("brand-a", Platform::Instagram, &content())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PoolNotConfigured { .. }));
    }

    #[tokio::test]
    async fn publish_timeout_becomes_network_error() {
        let h = harness(
            &["a"],
            config(),
            ScriptedPublisher::new(vec![Ok(receipt("too-late"))])
                .slow(Duration::from_secs(5)),
        )
        .await;

        let result = h
            .dispatcher
            .dispatch("brand-a", Platform::Instagram, &content())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::NetworkError));

        // reservation was released despite the timeout
        let member = &h.pool.members().await[0];
        assert!(!member.in_flight);
        assert_eq!(member.posts_today, 0);
    }

    #[tokio::test]
    async fn success_mirrors_to_account_store() {
        let h = harness(
            &["a"],
            config(),
            ScriptedPublisher::new(vec![Ok(receipt("p1"))]),
        )
        .await;
        h.dispatcher
            .dispatch("brand-a", Platform::Instagram, &content())
            .await
            .unwrap();

        let account = h.dispatcher.accounts().get("a").await.unwrap();
        assert_eq!(account.total_success, 1);
        assert_eq!(account.posts_today, 1);
        assert_eq!(account.health, AccountHealth::Active);
    }

    #[tokio::test]
    async fn deactivated_account_is_skipped() {
        let h = harness(
            &["a", "b"],
            config(),
            ScriptedPublisher::new(vec![Ok(receipt("p1"))]),
        )
        .await;
        h.dispatcher.accounts().deactivate("a").await.unwrap();

        let result = h
            .dispatcher
            .dispatch("brand-a", Platform::Instagram, &content())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.account_id.as_deref(), Some("b"));
        assert_eq!(h.publisher.calls().await, vec!["b"]);
    }

    #[tokio::test]
    async fn no_double_booking_under_concurrent_dispatch() {
        // N concurrent dispatches against one member capped at N-1: exactly
        // N-1 successes, at least one pool-exhausted.
        const N: usize = 4;
        let mut cfg = config();
        cfg.max_posts_per_day = (N - 1) as u32;
        let h = harness(
            &["a"],
            cfg,
            ScriptedPublisher::new(vec![
                Ok(receipt("p1")),
                Ok(receipt("p2")),
                Ok(receipt("p3")),
                Ok(receipt("p4")),
            ]),
        )
        .await;

        let dispatcher = Arc::new(h.dispatcher);
        let mut handles = Vec::new();
        for _ in 0..N {
            let d = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                d.dispatch("brand-a", Platform::Instagram, &content()).await
            }));
        }

        let mut successes = 0;
        let mut exhausted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(r) if r.success => successes += 1,
                Err(Error::PoolExhausted(_)) => exhausted += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(successes, N - 1);
        assert!(exhausted >= 1);
        assert_eq!(h.pool.members().await[0].posts_today, (N - 1) as u32);
    }
}
