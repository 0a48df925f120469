//! Error types for pool operations

use social_accounts::Platform;

/// Errors from pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no pool configured for brand {brand_id} on {platform}")]
    PoolNotConfigured { brand_id: String, platform: Platform },

    #[error("pool already exists: {0}")]
    PoolExists(String),

    #[error("pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("membership not found: {0}")]
    MembershipNotFound(String),

    #[error("account already in pool: {0}")]
    DuplicateMember(String),

    #[error("pool store error: {0}")]
    Store(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
