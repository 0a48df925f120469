//! Durable store for social accounts
//!
//! One `SocialAccount` record per linked credential/session. The store file is
//! the single source of truth for account identity and lifetime counters; the
//! pool engine keeps its own per-pool rotation state and mirrors health back
//! here after each publish attempt.
//!
//! Account lifecycle:
//! 1. Admin links an account to a brand → record stored, health `Active`
//! 2. Dispatch selects the account through a pool and publishes
//! 3. Outcome is recorded: counters updated, health mirrored from the pool
//! 4. Daily reset zeroes `posts_today` for every account
//! 5. Accounts are soft-deactivated, never deleted while history references them

pub mod account;
pub mod error;
pub mod store;

pub use account::{AccountHealth, Platform, SocialAccount};
pub use error::{Error, Result};
pub use store::AccountStore;
