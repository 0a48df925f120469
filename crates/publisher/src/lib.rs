//! Publish capability abstraction
//!
//! Defines the `Publisher` trait that decouples the dispatch engine from how a
//! post actually reaches a platform. The engine only needs
//! `publish(account, content) -> receipt | classified error`; concrete
//! adapters (HTTP sidecars today, browser drivers elsewhere) implement the
//! same trait.
//!
//! The error taxonomy here drives the whole health engine: each `ErrorKind`
//! maps to a membership state transition in the pool crate.

pub mod classify;
pub mod http;

pub use classify::classify_status;
pub use http::HttpPublisher;

use common::Secret;
use serde::{Deserialize, Serialize};
use social_accounts::Platform;
use std::future::Future;
use std::pin::Pin;

/// Classified publish failure.
///
/// Ordered roughly by severity. `is_content_error` kinds can never be fixed
/// by switching accounts, so dispatch surfaces them without failover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkError,
    AuthenticationError,
    RateLimited,
    AccountBanned,
    AccountSuspended,
    ContentRejected,
    PlatformError,
    ValidationError,
    TokenExpired,
    Unknown,
}

impl ErrorKind {
    /// Label for logs, metrics, and stored `last_error` fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "network_error",
            ErrorKind::AuthenticationError => "authentication_error",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::AccountBanned => "account_banned",
            ErrorKind::AccountSuspended => "account_suspended",
            ErrorKind::ContentRejected => "content_rejected",
            ErrorKind::PlatformError => "platform_error",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::TokenExpired => "token_expired",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// True when the failure is about the content itself, not the account.
    /// Dispatch must not fail over for these — no account swap fixes bad content.
    pub fn is_content_error(&self) -> bool {
        matches!(self, ErrorKind::ContentRejected | ErrorKind::ValidationError)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed publish attempt with its classification.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PublishError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PublishError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result alias for publish operations.
pub type Result<T> = std::result::Result<T, PublishError>;

/// The post to publish. Generated upstream; opaque to this engine beyond
/// basic shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub text: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Receipt for a successfully published post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostReceipt {
    pub post_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Minimal projection of a social account handed to adapters.
///
/// The access token is wrapped in `Secret` so adapter logging can't leak it.
pub struct AccountHandle {
    pub account_id: String,
    pub platform: Platform,
    pub handle: String,
    pub access_token: Secret<String>,
}

impl std::fmt::Debug for AccountHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountHandle")
            .field("account_id", &self.account_id)
            .field("platform", &self.platform)
            .field("handle", &self.handle)
            .field("access_token", &self.access_token)
            .finish()
    }
}

/// Abstraction over platform publishing adapters.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Publisher>` shared by the dispatcher).
pub trait Publisher: Send + Sync {
    /// Identifier for logging (e.g. "http", "noop").
    fn id(&self) -> &str;

    /// Publish `content` as `account`. Errors carry an `ErrorKind` the pool
    /// engine uses for state transitions.
    fn publish<'a>(
        &'a self,
        account: &'a AccountHandle,
        content: &'a Content,
    ) -> Pin<Box<dyn Future<Output = Result<PostReceipt>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_errors_skip_failover() {
        assert!(ErrorKind::ContentRejected.is_content_error());
        assert!(ErrorKind::ValidationError.is_content_error());
        assert!(!ErrorKind::RateLimited.is_content_error());
        assert!(!ErrorKind::AccountBanned.is_content_error());
        assert!(!ErrorKind::NetworkError.is_content_error());
    }

    #[test]
    fn error_kind_labels_are_snake_case() {
        assert_eq!(ErrorKind::RateLimited.as_str(), "rate_limited");
        assert_eq!(ErrorKind::TokenExpired.as_str(), "token_expired");
        let json = serde_json::to_string(&ErrorKind::AccountSuspended).unwrap();
        assert_eq!(json, "\"account_suspended\"");
    }

    #[test]
    fn publish_error_display_includes_kind_and_message() {
        let err = PublishError::new(ErrorKind::RateLimited, "slow down");
        assert_eq!(err.to_string(), "rate_limited: slow down");
    }

    #[test]
    fn account_handle_debug_redacts_token() {
        let handle = AccountHandle {
            account_id: "acct-1".into(),
            platform: Platform::X,
            handle: "@demo".into(),
            access_token: Secret::new("super-secret".to_string()),
        };
        let debug = format!("{handle:?}");
        assert!(!debug.contains("super-secret"), "got: {debug}");
        assert!(debug.contains("[REDACTED]"));
    }
}
