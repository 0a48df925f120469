//! Account pool rotation and health engine
//!
//! Routes each publish request through a pool of rotating accounts per
//! (brand, platform), so no single account absorbs enough traffic to get
//! rate-limited or banned. Per-pool membership state drives selection; the
//! health policy turns publish outcomes into state transitions; the
//! dispatcher ties it together with bounded failover.
//!
//! Membership lifecycle:
//! 1. Admin creates a pool and adds accounts → memberships start `Active`
//! 2. Dispatch reserves an eligible member (selection + daily-cap increment
//!    in one critical section) and publishes through it
//! 3. Outcome recorded: rate limit → `Cooldown` with escalating duration,
//!    ban/suspension → terminal until manual reset, repeated auth failures
//!    → `Suspended`, repeated transient failures → `Cooldown`
//! 4. Cooldown expiry is evaluated lazily at selection time; a background
//!    sweep normalizes stored state and force-releases stale reservations

pub mod audit;
pub mod dispatch;
pub mod error;
pub mod member;
pub mod policy;
pub mod pool;
pub mod registry;
pub mod select;
pub mod store;
pub mod sweep;

pub use audit::{AuditLog, OutcomeRecord};
pub use dispatch::{DispatchResult, Dispatcher};
pub use error::{Error, Result};
pub use member::{MemberStatus, PoolMembership};
pub use policy::{HealthPolicy, Outcome};
pub use pool::{AccountPool, PoolConfig, PoolHealth, Reservation};
pub use registry::PoolRegistry;
pub use select::RotationStrategy;
pub use store::PoolStore;
pub use sweep::spawn_sweep_task;
