//! HTTP API handlers
//!
//! Endpoints:
//! - POST   /dispatch                              — publish through a pool
//! - GET    /pools                                 — list pools with health
//! - POST   /pools                                 — create a pool
//! - GET    /pools/{id}/health                     — one pool's health counts
//! - POST   /pools/{id}/members                    — enroll an account
//! - DELETE /pools/{id}/members/{membership_id}    — remove a membership
//! - POST   /memberships/{id}/reset                — administrative reset
//! - POST   /maintenance/reset-daily               — scheduler hook
//! - GET    /accounts, POST /accounts, DELETE /accounts/{id}
//! - GET    /health, GET /metrics

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use publisher::Content;
use social_accounts::{AccountHealth, Platform, SocialAccount};
use social_pool::{Dispatcher, PoolConfig, PoolHealth, PoolStore, RotationStrategy};

use crate::error::ApiError;
use crate::metrics::record_dispatch;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub pool_store: Arc<PoolStore>,
    pub prometheus: PrometheusHandle,
}

impl AppState {
    /// Snapshot pool state to disk after a mutation. Persistence failures are
    /// logged, not surfaced: in-memory state is authoritative until restart.
    async fn persist_pools(&self) {
        if let Err(e) = self
            .pool_store
            .save_registry(self.dispatcher.registry())
            .await
        {
            warn!(error = %e, "failed to persist pool state");
        }
    }
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/dispatch", post(dispatch))
        .route("/pools", get(list_pools).post(create_pool))
        .route("/pools/{id}/health", get(pool_health))
        .route("/pools/{id}/members", post(add_member))
        .route(
            "/pools/{id}/members/{membership_id}",
            delete(remove_member),
        )
        .route("/memberships/{id}/reset", post(reset_membership))
        .route("/maintenance/reset-daily", post(reset_daily))
        .route("/accounts", get(list_accounts).post(create_account))
        .route("/accounts/{id}", delete(deactivate_account))
        .route("/health", get(service_health))
        .route("/metrics", get(render_metrics))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DispatchRequest {
    brand_id: String,
    platform: Platform,
    content: Content,
}

/// POST /dispatch — publish content through the (brand, platform) pool.
///
/// 200 success, 422 content rejected, 502 all attempts failed,
/// 503 pool exhausted, 404 pool not configured.
async fn dispatch(
    State(state): State<AppState>,
    axum::Json(req): axum::Json<DispatchRequest>,
) -> Response {
    if req.content.text.is_empty() && req.content.media_urls.is_empty() {
        return ApiError::bad_request("content must have text or media").into_response();
    }

    let platform = req.platform.as_str();
    let started = Instant::now();
    let outcome = state
        .dispatcher
        .dispatch(&req.brand_id, req.platform, &req.content)
        .await;
    let duration = started.elapsed().as_secs_f64();

    // Member state changed on every attempt; snapshot it.
    if !matches!(&outcome, Err(social_pool::Error::PoolNotConfigured { .. })) {
        state.persist_pools().await;
    }

    match outcome {
        Ok(result) if result.success => {
            record_dispatch(platform, "success", duration);
            (StatusCode::OK, axum::Json(result)).into_response()
        }
        Ok(result) => {
            let content_error = result
                .error_kind
                .is_some_and(|k| k.is_content_error());
            let status = if content_error {
                record_dispatch(platform, "content_rejected", duration);
                StatusCode::UNPROCESSABLE_ENTITY
            } else {
                record_dispatch(platform, "failure", duration);
                StatusCode::BAD_GATEWAY
            };
            (status, axum::Json(result)).into_response()
        }
        Err(err @ social_pool::Error::PoolExhausted(_)) => {
            record_dispatch(platform, "exhausted", duration);
            ApiError::from(err).into_response()
        }
        Err(err @ social_pool::Error::PoolNotConfigured { .. }) => {
            record_dispatch(platform, "not_configured", duration);
            ApiError::from(err).into_response()
        }
        Err(err) => {
            record_dispatch(platform, "error", duration);
            ApiError::from(err).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct PoolSummary {
    id: String,
    brand_id: String,
    platform: Platform,
    strategy: RotationStrategy,
    active: bool,
    health: PoolHealth,
}

/// GET /pools — all pools with their health counts.
async fn list_pools(State(state): State<AppState>) -> axum::Json<Vec<PoolSummary>> {
    let mut summaries = Vec::new();
    for pool in state.dispatcher.registry().pools().await {
        let config = pool.config();
        summaries.push(PoolSummary {
            id: config.id.clone(),
            brand_id: config.brand_id.clone(),
            platform: config.platform,
            strategy: config.strategy,
            active: config.active,
            health: pool.health().await,
        });
    }
    summaries.sort_by(|a, b| a.id.cmp(&b.id));
    axum::Json(summaries)
}

#[derive(Debug, Deserialize)]
struct CreatePoolRequest {
    brand_id: String,
    platform: Platform,
    #[serde(default)]
    strategy: RotationStrategy,
    max_posts_per_day: Option<u32>,
    cooldown_secs: Option<u64>,
    auto_failover: Option<bool>,
}

/// POST /pools — create an empty pool for a (brand, platform) pair.
async fn create_pool(
    State(state): State<AppState>,
    axum::Json(req): axum::Json<CreatePoolRequest>,
) -> Result<Response, ApiError> {
    if req.brand_id.is_empty() {
        return Err(ApiError::bad_request("brand_id must not be empty"));
    }
    let mut config = PoolConfig::new(req.brand_id, req.platform);
    config.strategy = req.strategy;
    if let Some(cap) = req.max_posts_per_day {
        if cap == 0 {
            return Err(ApiError::bad_request("max_posts_per_day must be greater than 0"));
        }
        config.max_posts_per_day = cap;
    }
    if let Some(secs) = req.cooldown_secs {
        config.cooldown_ms = secs * 1000;
    }
    if let Some(auto) = req.auto_failover {
        config.auto_failover = auto;
    }

    let pool = state
        .dispatcher
        .registry()
        .insert(social_pool::AccountPool::new(config))
        .await?;
    state.persist_pools().await;
    let body = serde_json::json!({
        "id": pool.config().id,
        "brand_id": pool.config().brand_id,
        "platform": pool.config().platform,
    });
    Ok((StatusCode::CREATED, axum::Json(body)).into_response())
}

/// GET /pools/{id}/health — one pool's member counts.
async fn pool_health(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
) -> Result<axum::Json<PoolHealth>, ApiError> {
    let pool = state
        .dispatcher
        .registry()
        .get_by_id(&pool_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("pool not found: {pool_id}")))?;
    Ok(axum::Json(pool.health().await))
}

#[derive(Debug, Deserialize)]
struct AddMemberRequest {
    account_id: String,
    #[serde(default)]
    priority: u32,
    #[serde(default = "default_weight")]
    weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// POST /pools/{id}/members — enroll an existing account in a pool.
///
/// The account must exist, be active, and match the pool's platform.
async fn add_member(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
    axum::Json(req): axum::Json<AddMemberRequest>,
) -> Result<Response, ApiError> {
    let pool = state
        .dispatcher
        .registry()
        .get_by_id(&pool_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("pool not found: {pool_id}")))?;

    let account = state
        .dispatcher
        .accounts()
        .get(&req.account_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("account not found: {}", req.account_id)))?;
    if !account.active {
        return Err(ApiError::bad_request(format!(
            "account {} is deactivated",
            req.account_id
        )));
    }
    if account.platform != pool.config().platform {
        return Err(ApiError::bad_request(format!(
            "account {} is a {} account, pool is {}",
            req.account_id,
            account.platform,
            pool.config().platform
        )));
    }

    let member = pool
        .add_member(&req.account_id, req.priority, req.weight)
        .await?;
    state.persist_pools().await;
    info!(pool_id, membership_id = %member.id, account_id = %member.account_id, "member enrolled");
    Ok((StatusCode::CREATED, axum::Json(member)).into_response())
}

/// DELETE /pools/{id}/members/{membership_id} — remove a membership.
///
/// The account record itself is untouched.
async fn remove_member(
    State(state): State<AppState>,
    Path((pool_id, membership_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let pool = state
        .dispatcher
        .registry()
        .get_by_id(&pool_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("pool not found: {pool_id}")))?;
    pool.remove_member(&membership_id).await?;
    state.persist_pools().await;
    info!(pool_id, membership_id, "member removed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /memberships/{id}/reset — clear Suspended/Banned/Error back to Active.
///
/// Administrative override after a human resolves the platform issue. Also
/// resets the account-level health mirror.
async fn reset_membership(
    State(state): State<AppState>,
    Path(membership_id): Path<String>,
) -> Result<Response, ApiError> {
    for pool in state.dispatcher.registry().pools().await {
        if pool.get_member(&membership_id).await.is_none() {
            continue;
        }
        let member = pool.reset_membership(&membership_id).await?;
        if let Err(e) = state
            .dispatcher
            .accounts()
            .reset_health(&member.account_id)
            .await
        {
            warn!(account_id = %member.account_id, error = %e, "failed to reset account health");
        }
        state.persist_pools().await;
        info!(membership_id, account_id = %member.account_id, "membership reset");
        return Ok(axum::Json(member).into_response());
    }
    Err(ApiError::not_found(format!(
        "membership not found: {membership_id}"
    )))
}

/// POST /maintenance/reset-daily — zero `posts_today` everywhere.
///
/// Called by an external scheduler at each pool's local midnight. Idempotent:
/// a duplicate call changes nothing.
async fn reset_daily(State(state): State<AppState>) -> Result<Response, ApiError> {
    let mut memberships = 0usize;
    for pool in state.dispatcher.registry().pools().await {
        memberships += pool.reset_daily().await;
    }
    let accounts = state.dispatcher.accounts().reset_daily().await?;
    state.persist_pools().await;
    info!(memberships, accounts, "daily counters reset");
    Ok(axum::Json(serde_json::json!({
        "memberships_reset": memberships,
        "accounts_reset": accounts,
    }))
    .into_response())
}

/// Account view with the token redacted.
#[derive(Debug, Serialize)]
struct RedactedAccount {
    id: String,
    platform: Platform,
    brand_id: String,
    handle: String,
    health: AccountHealth,
    last_used_at: Option<u64>,
    posts_today: u32,
    total_success: u64,
    total_failure: u64,
    consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
    active: bool,
}

impl From<SocialAccount> for RedactedAccount {
    fn from(a: SocialAccount) -> Self {
        Self {
            id: a.id,
            platform: a.platform,
            brand_id: a.brand_id,
            handle: a.handle,
            health: a.health,
            last_used_at: a.last_used_at,
            posts_today: a.posts_today,
            total_success: a.total_success,
            total_failure: a.total_failure,
            consecutive_failures: a.consecutive_failures,
            last_error: a.last_error,
            active: a.active,
        }
    }
}

/// GET /accounts — every account, tokens never included.
async fn list_accounts(State(state): State<AppState>) -> axum::Json<Vec<RedactedAccount>> {
    let mut accounts: Vec<RedactedAccount> = state
        .dispatcher
        .accounts()
        .list()
        .await
        .into_iter()
        .map(RedactedAccount::from)
        .collect();
    accounts.sort_by(|a, b| a.id.cmp(&b.id));
    axum::Json(accounts)
}

#[derive(Debug, Deserialize)]
struct CreateAccountRequest {
    id: String,
    platform: Platform,
    brand_id: String,
    handle: String,
    access_token: String,
}

/// POST /accounts — register a credentialed account.
async fn create_account(
    State(state): State<AppState>,
    axum::Json(req): axum::Json<CreateAccountRequest>,
) -> Result<Response, ApiError> {
    if req.id.is_empty() || req.access_token.is_empty() {
        return Err(ApiError::bad_request("id and access_token are required"));
    }
    let account = SocialAccount::new(
        req.id,
        req.platform,
        req.brand_id,
        req.handle,
        req.access_token,
    );
    state.dispatcher.accounts().add(account.clone()).await?;
    info!(account_id = %account.id, platform = %account.platform, "account registered");
    Ok((
        StatusCode::CREATED,
        axum::Json(RedactedAccount::from(account)),
    )
        .into_response())
}

/// DELETE /accounts/{id} — soft-deactivate; history is kept.
async fn deactivate_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.dispatcher.accounts().deactivate(&account_id).await?;
    info!(account_id, "account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /health — service liveness plus a pool rollup.
async fn service_health(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let registry = state.dispatcher.registry();
    let mut active = 0usize;
    let mut members = 0usize;
    for pool in registry.pools().await {
        let health = pool.health().await;
        active += health.active;
        members += health.member_count;
    }
    axum::Json(serde_json::json!({
        "status": "ok",
        "pools": registry.len().await,
        "members": members,
        "members_active": active,
        "accounts": state.dispatcher.accounts().len().await,
    }))
}

/// GET /metrics — Prometheus text exposition.
async fn render_metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
        .into_response()
}
