//! Social account dispatcher
//!
//! Single-binary service that:
//! 1. Loads account and pool state from JSON files
//! 2. Listens for dispatch requests
//! 3. Rotates publishes across pooled accounts with health-aware failover
//! 4. Exposes pool management, health, and Prometheus metrics endpoints

mod config;
mod error;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use publisher::HttpPublisher;
use social_accounts::AccountStore;
use social_pool::{
    AccountPool, AuditLog, Dispatcher, HealthPolicy, PoolConfig, PoolRegistry, PoolStore,
    spawn_sweep_task,
};

use crate::config::Config;
use crate::routes::{AppState, build_router};

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting social-dispatcher");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        adapters = config.publisher.adapter_urls.len(),
        seed_pools = config.pools.len(),
        "configuration loaded"
    );

    let accounts = Arc::new(
        AccountStore::load(config.storage.accounts_path.clone())
            .await
            .context("failed to load account store")?,
    );
    info!(accounts = accounts.len().await, "account store loaded");

    let pool_store = Arc::new(
        PoolStore::open(config.storage.pools_path.clone())
            .await
            .context("failed to open pool store")?,
    );
    let registry = pool_store
        .hydrate()
        .await
        .context("failed to hydrate pool registry")?;

    seed_pools(&config, &registry, &accounts).await;
    pool_store
        .save_registry(&registry)
        .await
        .context("failed to persist seeded pools")?;

    let policy = build_policy(&config.policy);
    let publish_timeout = Duration::from_secs(config.dispatch.publish_timeout_secs);

    let http_publisher = HttpPublisher::new(
        reqwest::Client::new(),
        config.publisher.adapter_urls.clone(),
        Duration::from_secs(config.publisher.request_timeout_secs),
    );

    let audit = Arc::new(AuditLog::new(config.storage.audit_path.clone()));

    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        accounts,
        Arc::new(http_publisher),
        policy,
        config.dispatch.max_attempts,
        publish_timeout,
        audit,
    ));

    // Stale reservations are anything much older than a publish could run.
    let sweep_handle = spawn_sweep_task(
        registry.clone(),
        Duration::from_secs(config.dispatch.sweep_interval_secs),
        publish_timeout * 2,
    );

    let app_state = AppState {
        dispatcher,
        pool_store: pool_store.clone(),
        prometheus: prometheus_handle,
    };
    let app = build_router(app_state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "accepting requests");

    // Graceful shutdown:
    // 1. shutdown_signal() fires on SIGTERM/SIGINT
    // 2. axum stops accepting new connections and drains in-flight requests
    // 3. DRAIN_TIMEOUT bounds the drain so a slow adapter cannot block exit
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    sweep_handle.abort();

    // Final snapshot so cooldowns and counters survive the restart.
    if let Err(e) = pool_store.save_registry(&registry).await {
        error!(error = %e, "failed to persist pool state on shutdown");
    }
    info!("shutdown complete");
    Ok(())
}

/// Create pools declared in config that don't exist yet and enroll their
/// listed accounts. Existing pools are left untouched; unknown account ids
/// are skipped with a warning.
async fn seed_pools(config: &Config, registry: &PoolRegistry, accounts: &AccountStore) {
    for seed in &config.pools {
        let pool = match registry.get(&seed.brand_id, seed.platform).await {
            Ok(existing) => {
                info!(
                    brand_id = %seed.brand_id,
                    platform = %seed.platform,
                    "pool already exists, seed entry skipped"
                );
                existing
            }
            Err(_) => {
                let mut pool_config = PoolConfig::new(seed.brand_id.clone(), seed.platform);
                pool_config.strategy = seed.strategy;
                if let Some(cap) = seed.max_posts_per_day {
                    pool_config.max_posts_per_day = cap;
                }
                if let Some(secs) = seed.cooldown_secs {
                    pool_config.cooldown_ms = secs * 1000;
                }
                match registry.insert(AccountPool::new(pool_config)).await {
                    Ok(pool) => pool,
                    Err(e) => {
                        warn!(brand_id = %seed.brand_id, platform = %seed.platform, error = %e, "failed to seed pool");
                        continue;
                    }
                }
            }
        };

        for (priority, account_id) in seed.accounts.iter().enumerate() {
            if accounts.get(account_id).await.is_none() {
                warn!(account_id, "seed account not in store, skipped");
                continue;
            }
            // priority follows declaration order; duplicates are fine on restart
            match pool.add_member(account_id, priority as u32, 1).await {
                Ok(_) | Err(social_pool::Error::DuplicateMember(_)) => {}
                Err(e) => warn!(account_id, error = %e, "failed to enroll seed account"),
            }
        }
    }
}

fn build_policy(config: &config::PolicyConfig) -> HealthPolicy {
    let mut policy = HealthPolicy::default();
    if let Some(secs) = config.cooldown_secs {
        policy.base_cooldown_ms = secs * 1000;
    }
    if let Some(secs) = config.max_cooldown_secs {
        policy.max_cooldown_ms = secs * 1000;
    }
    if let Some(n) = config.suspend_after_auth_failures {
        policy.suspend_after_auth_failures = n;
    }
    if let Some(n) = config.cooldown_after_transient_failures {
        policy.cooldown_after_transient_failures = n;
    }
    policy
}

/// Resolve on SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
