//! Error classification for platform adapter responses
//!
//! Adapters speak plain HTTP; this module turns a status code and response
//! body into the `ErrorKind` taxonomy the pool engine acts on. Body pattern
//! scans distinguish the cases platforms report under the same status code:
//! a 403 can mean a banned account, a suspended account, or a plain
//! permission failure, and each drives a different state transition.

use crate::ErrorKind;

/// Phrases platforms use when an account is permanently banned.
const BAN_PATTERNS: &[&str] = &["banned", "permanently disabled", "account terminated"];

/// Phrases indicating a temporary/appealable suspension.
const SUSPEND_PATTERNS: &[&str] = &["suspended", "locked", "restricted", "temporarily disabled"];

/// Phrases in 401 bodies indicating an expired token rather than a bad one.
const TOKEN_EXPIRED_PATTERNS: &[&str] = &["expired", "token has expired", "session expired"];

/// Phrases in 4xx bodies indicating the content itself was rejected.
const CONTENT_PATTERNS: &[&str] = &["content", "media", "caption", "duplicate post", "spam"];

fn matches_any(body: &str, patterns: &[&str]) -> bool {
    let lower = body.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

/// Classify a 403 response body: ban, suspension, or generic auth failure.
pub fn classify_403(body: &str) -> ErrorKind {
    if matches_any(body, BAN_PATTERNS) {
        ErrorKind::AccountBanned
    } else if matches_any(body, SUSPEND_PATTERNS) {
        ErrorKind::AccountSuspended
    } else {
        ErrorKind::AuthenticationError
    }
}

/// Classify an adapter response by HTTP status and body.
///
/// - 429 → `RateLimited`
/// - 401 → `TokenExpired` if the body says so, else `AuthenticationError`
/// - 403 → body pattern scan (ban / suspension / auth)
/// - 400/422 → `ContentRejected` if the body blames the content, else
///   `ValidationError`
/// - 408/5xx → `PlatformError`
/// - anything else → `Unknown`
pub fn classify_status(status: u16, body: &str) -> ErrorKind {
    match status {
        429 => ErrorKind::RateLimited,
        401 => {
            if matches_any(body, TOKEN_EXPIRED_PATTERNS) {
                ErrorKind::TokenExpired
            } else {
                ErrorKind::AuthenticationError
            }
        }
        403 => classify_403(body),
        400 | 422 => {
            if matches_any(body, CONTENT_PATTERNS) {
                ErrorKind::ContentRejected
            } else {
                ErrorKind::ValidationError
            }
        }
        408 => ErrorKind::PlatformError,
        s if (500..600).contains(&s) => ErrorKind::PlatformError,
        _ => ErrorKind::Unknown,
    }
}
