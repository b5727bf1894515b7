// Bearer token provider and cache
// Tokens are fetched with the client-credentials grant and reused until shortly before expiry.
// Concurrent callers share one in-flight refresh.

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::vendor::{ApiError, TravelApi};

// Tokens this close to expiry are treated as stale
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token request rejected with status {status}")]
    Rejected { status: u16, body: Value },

    #[error("Token response did not contain an access_token")]
    Malformed(Value),

    #[error("Failed to fetch token: {0}")]
    Transport(#[from] ApiError),
}

impl TokenError {
    // HTTP status a proxy should answer with for this failure
    pub fn status(&self) -> u16 {
        match self {
            TokenError::Rejected { status, .. } => *status,
            TokenError::Malformed(_) | TokenError::Transport(_) => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub value: String,
    // None when the vendor did not report a lifetime; such tokens are used once
    pub expires_at: Option<Instant>,
}

impl AccessToken {
    fn is_fresh(&self, now: Instant, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + margin < expires_at,
            None => false,
        }
    }
}

// One client-credentials round trip, no retry
pub async fn fetch_token(api: &dyn TravelApi) -> Result<AccessToken, TokenError> {
    let response = api.request_token().await?;

    if !response.is_success() {
        warn!(status = response.status, "token request rejected by vendor");
        return Err(TokenError::Rejected {
            status: response.status,
            body: response.body,
        });
    }

    let value = response
        .body
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string);
    let Some(value) = value else {
        return Err(TokenError::Malformed(response.body));
    };

    let expires_at = response
        .body
        .get("expires_in")
        .and_then(Value::as_u64)
        // A lifetime past what Instant can represent is treated as unknown
        .and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs)));

    Ok(AccessToken { value, expires_at })
}

#[derive(Debug, Default)]
pub struct TokenStats {
    pub fetch_count: AtomicUsize,
    pub hit_count: AtomicUsize,
    pub failure_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TokenStatsReport {
    pub fetch_count: usize,
    pub hit_count: usize,
    pub failure_count: usize,
}

pub struct TokenCache {
    api: Arc<dyn TravelApi>,
    current: RwLock<Option<AccessToken>>,
    refresh: Mutex<()>,
    margin: Duration,
    stats: TokenStats,
}

impl TokenCache {
    pub fn new(api: Arc<dyn TravelApi>) -> Self {
        Self::with_margin(api, DEFAULT_EXPIRY_MARGIN)
    }

    pub fn with_margin(api: Arc<dyn TravelApi>, margin: Duration) -> Self {
        Self {
            api,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
            margin,
            stats: TokenStats::default(),
        }
    }

    fn cached(&self) -> Option<String> {
        let current = self.current.read();
        current
            .as_ref()
            .filter(|token| token.is_fresh(Instant::now(), self.margin))
            .map(|token| token.value.clone())
    }

    // Returns a usable bearer token, refreshing it only when stale
    pub async fn get(&self) -> Result<String, TokenError> {
        if let Some(token) = self.cached() {
            self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
            return Ok(token);
        }

        let _refresh = self.refresh.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.cached() {
            self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
            return Ok(token);
        }

        self.stats.fetch_count.fetch_add(1, Ordering::SeqCst);
        match fetch_token(self.api.as_ref()).await {
            Ok(token) => {
                let value = token.value.clone();
                if token.expires_at.is_some() {
                    info!("cached new vendor token");
                    *self.current.write() = Some(token);
                } else {
                    debug!("vendor token has no expiry, not caching");
                }
                Ok(value)
            }
            Err(err) => {
                self.stats.failure_count.fetch_add(1, Ordering::SeqCst);
                warn!(error = %err, "token refresh failed");
                Err(err)
            }
        }
    }

    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    pub fn stats(&self) -> TokenStatsReport {
        TokenStatsReport {
            fetch_count: self.stats.fetch_count.load(Ordering::SeqCst),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            failure_count: self.stats.failure_count.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::mock_server::{MockReply, MockVendor};
    use futures::future::join_all;
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_token_success() {
        let vendor = MockVendor::new();
        let token = fetch_token(&vendor).await.unwrap();
        assert_eq!(token.value, "test-token");
        assert!(token.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_fetch_token_rejected_keeps_status_and_body() {
        let vendor = MockVendor::new();
        let vendor_error = json!({"error": "invalid_client", "code": 38187});
        vendor.set_token(MockReply::status(401, vendor_error.clone()));

        let err = fetch_token(&vendor).await.unwrap_err();
        assert_eq!(err.status(), 401);
        match err {
            TokenError::Rejected { body, .. } => assert_eq!(body, vendor_error),
            other => panic!("Expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_token_transport_failure_is_500() {
        let vendor = MockVendor::new();
        vendor.set_token(MockReply::Fail("connection refused".to_string()));

        let err = fetch_token(&vendor).await.unwrap_err();
        assert_eq!(err.status(), 500);
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_fetch_token_missing_field_is_malformed() {
        let vendor = MockVendor::new();
        vendor.set_token(MockReply::ok(json!({"token_type": "Bearer"})));

        let err = fetch_token(&vendor).await.unwrap_err();
        assert!(matches!(err, TokenError::Malformed(_)));
        assert_eq!(err.status(), 500);
    }

    #[tokio::test]
    async fn test_huge_expiry_is_treated_as_unknown() {
        let vendor = Arc::new(MockVendor::new());
        vendor.set_token(MockReply::ok(
            json!({"access_token": "long-lived", "expires_in": u64::MAX}),
        ));

        let token = fetch_token(vendor.as_ref()).await.unwrap();
        assert_eq!(token.value, "long-lived");
        assert_eq!(token.expires_at, None);

        let cache = TokenCache::new(vendor.clone());
        assert_eq!(cache.get().await.unwrap(), "long-lived");
        assert_eq!(cache.get().await.unwrap(), "long-lived");
        assert_eq!(MockVendor::calls(&vendor.token_calls), 3);
    }

    #[tokio::test]
    async fn test_cache_reuses_token_until_stale() {
        let vendor = Arc::new(MockVendor::new());
        let cache = TokenCache::new(vendor.clone());

        for _ in 0..5 {
            assert_eq!(cache.get().await.unwrap(), "test-token");
        }

        assert_eq!(MockVendor::calls(&vendor.token_calls), 1);
        let stats = cache.stats();
        assert_eq!(stats.fetch_count, 1);
        assert_eq!(stats.hit_count, 4);
    }

    #[tokio::test]
    async fn test_cache_refetches_when_within_margin() {
        let vendor = Arc::new(MockVendor::new());
        vendor.set_token(MockReply::ok(
            json!({"access_token": "short-lived", "expires_in": 10}),
        ));
        let cache = TokenCache::new(vendor.clone());

        cache.get().await.unwrap();
        cache.get().await.unwrap();

        // 10s lifetime is inside the 30s margin, so nothing is ever fresh
        assert_eq!(MockVendor::calls(&vendor.token_calls), 2);
    }

    #[tokio::test]
    async fn test_token_without_expiry_is_not_cached() {
        let vendor = Arc::new(MockVendor::new());
        vendor.set_token(MockReply::ok(json!({"access_token": "one-shot"})));
        let cache = TokenCache::new(vendor.clone());

        assert_eq!(cache.get().await.unwrap(), "one-shot");
        assert_eq!(cache.get().await.unwrap(), "one-shot");
        assert_eq!(MockVendor::calls(&vendor.token_calls), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let vendor = Arc::new(MockVendor::new());
        vendor.set_delay(50);
        let cache = Arc::new(TokenCache::new(vendor.clone()));

        let callers = (0..20).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get().await })
        });

        for result in join_all(callers).await {
            assert_eq!(result.unwrap().unwrap(), "test-token");
        }

        assert_eq!(MockVendor::calls(&vendor.token_calls), 1);
        let stats = cache.stats();
        assert_eq!(stats.fetch_count, 1);
        assert_eq!(stats.hit_count, 19);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_not_cached() {
        let vendor = Arc::new(MockVendor::new());
        vendor.set_token(MockReply::status(500, json!({"error": "upstream"})));
        let cache = TokenCache::new(vendor.clone());

        assert!(cache.get().await.is_err());

        vendor.set_token(MockReply::ok(
            json!({"access_token": "recovered", "expires_in": 1799}),
        ));
        assert_eq!(cache.get().await.unwrap(), "recovered");
        assert_eq!(cache.stats().failure_count, 1);
    }

    #[test]
    fn test_stats_track_first_fetch() {
        let cache = TokenCache::new(Arc::new(MockVendor::new()));
        assert_eq!(cache.stats(), TokenStatsReport::default());

        let token = tokio_test::block_on(cache.get()).unwrap();
        assert_eq!(token, "test-token");
        assert_eq!(
            cache.stats(),
            TokenStatsReport {
                fetch_count: 1,
                hit_count: 0,
                failure_count: 0
            }
        );
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let vendor = Arc::new(MockVendor::new());
        let cache = TokenCache::new(vendor.clone());

        cache.get().await.unwrap();
        cache.invalidate();
        cache.get().await.unwrap();

        assert_eq!(MockVendor::calls(&vendor.token_calls), 2);
    }
}
