use log::{debug, warn};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::IdentityConfig;
use crate::errors::AppError;
use crate::services::token_manager::TokenManager;

#[derive(Deserialize)]
struct GroupEntry {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "securityEnabled")]
    security_enabled: Option<bool>,
}

#[derive(Deserialize)]
struct GroupPage {
    #[serde(default)]
    value: Vec<GroupEntry>,
}

/// Display names of the groups in a membership listing.
pub fn parse_group_names(body: &str) -> Result<Vec<String>, AppError> {
    let page: GroupPage = serde_json::from_str(body)
        .map_err(|e| AppError::IdentityProviderError(format!("invalid group response: {}", e)))?;
    Ok(page
        .value
        .into_iter()
        .filter(|g| g.security_enabled.unwrap_or(true))
        .filter_map(|g| g.display_name)
        .filter(|n| !n.is_empty())
        .collect())
}

/// Group memberships from the directory, read with the application token.
pub struct GroupDirectory {
    http: reqwest::Client,
    groups_url: String,
    tokens: Arc<TokenManager>,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Instant, Vec<String>)>>,
}

impl GroupDirectory {
    pub fn new(http: reqwest::Client, config: &IdentityConfig, tokens: Arc<TokenManager>) -> Self {
        Self {
            http,
            groups_url: config.groups_url.clone(),
            tokens,
            ttl: Duration::from_secs(config.role_cache_seconds),
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch(&self, user_id: &str, token: &str) -> Result<reqwest::Response, AppError> {
        let url = self.groups_url.replace("{user_id}", user_id);
        Ok(self.http.get(url).bearer_auth(token).send().await?)
    }

    pub async fn user_groups(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        if let Some((fetched, groups)) = self.cache.lock().await.get(user_id) {
            if fetched.elapsed() < self.ttl {
                debug!("Using cached groups for {}", user_id);
                return Ok(groups.clone());
            }
        }

        let token = self.tokens.access_token(false).await?;
        let mut response = self.fetch(user_id, &token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Application token rejected, refreshing");
            let token = self.tokens.access_token(true).await?;
            response = self.fetch(user_id, &token).await?;
        }

        let groups = match response.status() {
            StatusCode::NOT_FOUND => {
                warn!("User {} not found in directory", user_id);
                Vec::new()
            }
            status if status.is_success() => parse_group_names(&response.text().await?)?,
            status => {
                return Err(AppError::IdentityProviderError(format!("group lookup failed with {}", status)));
            }
        };

        self.remember(user_id, groups.clone()).await;
        Ok(groups)
    }

    /// Caches `groups` and evicts entries older than the TTL.
    async fn remember(&self, user_id: &str, groups: Vec<String>) {
        let mut cache = self.cache.lock().await;
        cache.retain(|_, (fetched, _)| fetched.elapsed() < self.ttl);
        cache.insert(user_id.to_string(), (Instant::now(), groups));
    }

    /// Drops every cached lookup; returns how many users were cached.
    pub async fn clear_cache(&self) -> usize {
        let mut cache = self.cache.lock().await;
        let cleared = cache.len();
        cache.clear();
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identity_provider::tests::identity_config;
    use crate::services::token_manager::tests::manager;

    #[test]
    fn group_names_skip_non_security_groups() {
        let body = r#"{"value":[
            {"displayName":"Staff","id":"1"},
            {"displayName":"Newsletter","securityEnabled":false},
            {"id":"3"},
            {"displayName":"Admin","securityEnabled":true}
        ]}"#;
        assert_eq!(parse_group_names(body).unwrap(), vec!["Staff".to_string(), "Admin".to_string()]);
        assert!(parse_group_names("{}").unwrap().is_empty());
        assert!(parse_group_names("not json").is_err());
    }

    #[tokio::test]
    async fn cached_groups_are_served_without_request() {
        let (tokens, calls) = manager(3600);
        let directory = GroupDirectory::new(reqwest::Client::new(), &identity_config(), Arc::new(tokens));
        directory
            .cache
            .lock()
            .await
            .insert("user-1".into(), (Instant::now(), vec!["Staff".into()]));

        assert_eq!(directory.user_groups("user-1").await.unwrap(), vec!["Staff".to_string()]);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(directory.clear_cache().await, 1);
        assert_eq!(directory.clear_cache().await, 0);
    }

    #[tokio::test]
    async fn stale_entries_are_evicted_on_insert() {
        let (tokens, _) = manager(3600);
        let mut directory = GroupDirectory::new(reqwest::Client::new(), &identity_config(), Arc::new(tokens));
        directory.ttl = Duration::ZERO;
        directory
            .cache
            .lock()
            .await
            .insert("user-1".into(), (Instant::now(), vec!["Staff".into()]));

        directory.remember("user-2", vec!["Admin".into()]).await;

        let cache = directory.cache.lock().await;
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("user-2"));
    }
}
