//! HTTP publishing adapter
//!
//! Forwards publish requests to per-platform adapter services (the processes
//! that actually drive each platform's API or browser session). The adapter
//! contract is one endpoint: `POST {base_url}/publish` with a bearer token,
//! returning `{"post_id": "...", "url": "..."}` on success. Non-2xx responses
//! are classified through `classify_status`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    AccountHandle, Content, ErrorKind, PostReceipt, PublishError, Publisher, Result,
    classify::classify_status,
};
use social_accounts::Platform;

/// Publisher that relays posts to platform adapter services over HTTP.
pub struct HttpPublisher {
    client: reqwest::Client,
    /// Adapter base URL per platform. Platforms without an entry fail with
    /// `ValidationError` (a config problem, not an account problem).
    adapter_urls: HashMap<Platform, String>,
    timeout: Duration,
}

impl HttpPublisher {
    pub fn new(
        client: reqwest::Client,
        adapter_urls: HashMap<Platform, String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            adapter_urls,
            timeout,
        }
    }

    async fn publish_inner(
        &self,
        account: &AccountHandle,
        content: &Content,
    ) -> Result<PostReceipt> {
        let base = self.adapter_urls.get(&account.platform).ok_or_else(|| {
            PublishError::new(
                ErrorKind::ValidationError,
                format!("no adapter configured for platform {}", account.platform),
            )
        })?;
        let url = format!("{}/publish", base.trim_end_matches('/'));

        let body = serde_json::json!({
            "platform": account.platform,
            "handle": account.handle,
            "content": content,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(account.access_token.expose())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let detail = if e.is_timeout() { "adapter timeout" } else { "adapter unreachable" };
                PublishError::new(ErrorKind::NetworkError, format!("{detail}: {e}"))
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            PublishError::new(ErrorKind::NetworkError, format!("reading adapter response: {e}"))
        })?;

        if (200..300).contains(&status) {
            let receipt: PostReceipt = serde_json::from_str(&text).map_err(|e| {
                warn!(platform = %account.platform, error = %e, "adapter returned malformed receipt");
                PublishError::new(ErrorKind::PlatformError, format!("malformed receipt: {e}"))
            })?;
            debug!(
                platform = %account.platform,
                account_id = %account.account_id,
                post_id = %receipt.post_id,
                "post published"
            );
            Ok(receipt)
        } else {
            let kind = classify_status(status, &text);
            Err(PublishError::new(
                kind,
                format!("adapter returned {status}: {text}"),
            ))
        }
    }
}

impl Publisher for HttpPublisher {
    fn id(&self) -> &str {
        "http"
    }

    fn publish<'a>(
        &'a self,
        account: &'a AccountHandle,
        content: &'a Content,
    ) -> Pin<Box<dyn Future<Output = Result<PostReceipt>> + Send + 'a>> {
        Box::pin(self.publish_inner(account, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;

    fn handle(platform: Platform) -> AccountHandle {
        AccountHandle {
            account_id: "acct-1".into(),
            platform,
            handle: "@demo".into(),
            access_token: Secret::new("tok".to_string()),
        }
    }

    fn content() -> Content {
        Content {
            text: "hello".into(),
            media_urls: vec![],
            link: None,
        }
    }

    #[tokio::test]
    async fn unconfigured_platform_is_validation_error() {
        let publisher = HttpPublisher::new(
            reqwest::Client::new(),
            HashMap::new(),
            Duration::from_secs(5),
        );
        let err = publisher
            .publish(&handle(Platform::TikTok), &content())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
        assert!(err.message.contains("tiktok"));
    }

    #[tokio::test]
    async fn unreachable_adapter_is_network_error() {
        // Reserved TEST-NET address, nothing listens there
        let mut urls = HashMap::new();
        urls.insert(Platform::X, "http://192.0.2.1:9".to_string());
        let publisher = HttpPublisher::new(
            reqwest::Client::new(),
            urls,
            Duration::from_millis(200),
        );
        let err = publisher
            .publish(&handle(Platform::X), &content())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NetworkError);
    }
}
