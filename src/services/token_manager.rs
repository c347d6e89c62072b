use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::IdentityConfig;
use crate::errors::AppError;

/// Seconds before expiry at which a cached token is replaced.
pub const REFRESH_MARGIN_SECONDS: i64 = 300;
const MIN_CACHE_SECONDS: i64 = 60;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AppToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Issues application tokens (client credentials grant).
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AppToken, AppError>;
}

pub struct ClientCredentialsSource {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl ClientCredentialsSource {
    pub fn new(http: reqwest::Client, config: &IdentityConfig) -> Self {
        Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.app_scope.clone(),
        }
    }
}

/// Validates a client credentials answer.
pub fn parse_app_token(status: StatusCode, body: &str) -> Result<AppToken, AppError> {
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(AppError::ServiceUnavailable("Identity provider temporarily unavailable".into()));
    }
    if !status.is_success() {
        return Err(AppError::IdentityProviderError(format!("token request failed with {}", status)));
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| AppError::IdentityProviderError(format!("invalid token response: {}", e)))?;
    for field in ["access_token", "token_type", "expires_in"] {
        if value.get(field).is_none() {
            return Err(AppError::IdentityProviderError(format!("Missing field in token response: {}", field)));
        }
    }
    serde_json::from_value(value)
        .map_err(|e| AppError::IdentityProviderError(format!("invalid token response: {}", e)))
}

#[async_trait]
impl TokenSource for ClientCredentialsSource {
    async fn fetch_token(&self) -> Result<AppToken, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        parse_app_token(status, &body)
    }
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TokenInfo {
    pub client_id: String,
    pub scope: String,
    pub has_cached_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub seconds_remaining: Option<i64>,
}

fn mask(client_id: &str) -> String {
    match client_id.get(..8) {
        Some(prefix) if client_id.len() > 8 => format!("{}...", prefix),
        _ => client_id.to_string(),
    }
}

/// Caches the application token. The lock is held across a refresh so
/// concurrent callers wait for one request.
pub struct TokenManager {
    source: Box<dyn TokenSource>,
    client_id: String,
    scope: String,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(source: Box<dyn TokenSource>, client_id: &str, scope: &str) -> Self {
        Self {
            source,
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            cache: Mutex::new(None),
        }
    }

    pub async fn access_token(&self, force_refresh: bool) -> Result<String, AppError> {
        let mut cache = self.cache.lock().await;

        if !force_refresh {
            if let Some(cached) = cache.as_ref().filter(|c| c.expires_at > Utc::now()) {
                debug!("Using cached application token");
                return Ok(cached.access_token.clone());
            }
        }

        let token = self.source.fetch_token().await.map_err(|e| {
            error!("Application token request failed: {}", e);
            e
        })?;
        let lifetime = (token.expires_in - REFRESH_MARGIN_SECONDS).max(MIN_CACHE_SECONDS);
        *cache = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(lifetime),
        });
        info!("Fetched application token, cached for {}s", lifetime);
        Ok(token.access_token)
    }

    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
        info!("Application token cache cleared");
    }

    pub async fn info(&self) -> TokenInfo {
        let cache = self.cache.lock().await;
        let expires_at = cache.as_ref().map(|c| c.expires_at);
        TokenInfo {
            client_id: mask(&self.client_id),
            scope: self.scope.clone(),
            has_cached_token: cache.is_some(),
            expires_at,
            seconds_remaining: expires_at.map(|e| (e - Utc::now()).num_seconds().max(0)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts requests and hands out numbered tokens.
    pub(crate) struct CountingSource {
        pub calls: Arc<AtomicUsize>,
        pub expires_in: i64,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> Result<AppToken, AppError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AppToken { access_token: format!("token-{}", n), token_type: "Bearer".into(), expires_in: self.expires_in })
        }
    }

    pub(crate) fn manager(expires_in: i64) -> (TokenManager, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource { calls: calls.clone(), expires_in };
        (TokenManager::new(Box::new(source), "0f3c2a9e-1234-5678", "scope/.default"), calls)
    }

    #[tokio::test]
    async fn cached_token_is_reused() {
        let (manager, calls) = manager(3600);
        assert_eq!(manager.access_token(false).await.unwrap(), "token-1");
        assert_eq!(manager.access_token(false).await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(manager.access_token(true).await.unwrap(), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_new_request() {
        let (manager, calls) = manager(3600);
        manager.access_token(false).await.unwrap();
        manager.invalidate().await;
        assert!(!manager.info().await.has_cached_token);
        manager.access_token(false).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn short_lived_tokens_are_cached_for_at_least_a_minute() {
        let (manager, _) = manager(100);
        manager.access_token(false).await.unwrap();
        let info = manager.info().await;
        let remaining = info.seconds_remaining.unwrap();
        assert!((55..=60).contains(&remaining), "{}", remaining);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let (manager, calls) = manager(3600);
        let manager = Arc::new(manager);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = manager.clone();
                tokio::spawn(async move { m.access_token(false).await.unwrap() })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap(), "token-1");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn info_masks_client_id() {
        let (manager, _) = manager(3600);
        let info = manager.info().await;
        assert_eq!(info.client_id, "0f3c2a9e...");
        assert_eq!(info.scope, "scope/.default");
        assert_eq!(info.expires_at, None);
    }

    #[test]
    fn app_token_response_validation() {
        let err = parse_app_token(StatusCode::SERVICE_UNAVAILABLE, "").unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));

        let err = parse_app_token(StatusCode::OK, r#"{"access_token":"a","expires_in":3599}"#).unwrap_err();
        assert_eq!(err.message(), "Missing field in token response: token_type");

        let token = parse_app_token(StatusCode::OK, r#"{"access_token":"a","token_type":"Bearer","expires_in":3599}"#).unwrap();
        assert_eq!(token.expires_in, 3599);
    }
}
