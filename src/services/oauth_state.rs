use actix_web::HttpRequest;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::auth::OAuthState;

const STATE_COLUMNS: &str = "id, state, tool_slug, user_identifier, created_at, expires_at";

/// Statistics of a cleanup run, also produced by a dry run.
#[derive(Serialize, Debug, Clone, Default)]
pub struct ExpiredStatesSummary {
    pub expired: i64,
    pub active: i64,
    pub states: Vec<OAuthState>,
}

/// Shortened state for log lines.
pub fn short(state: &str) -> &str {
    state.get(..8).unwrap_or(state)
}

/// 32 random bytes, URL-safe base64 without padding.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// First 16 hex characters of `sha256("<ip>:<user agent>")`.
pub fn client_identifier(ip: &str, user_agent: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", ip, user_agent).as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

pub fn client_ip(req: &HttpRequest) -> String {
    req.headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}

pub fn request_identifier(req: &HttpRequest) -> String {
    let user_agent = req
        .headers()
        .get("User-Agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    client_identifier(&client_ip(req), user_agent)
}

/// Outcome of presenting a state value to the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateCheck {
    Unknown,
    Expired,
    ClientMismatch,
    Valid(String),
}

impl StateCheck {
    /// Whether the stored row is deleted as part of the check.
    pub fn consumes(&self) -> bool {
        matches!(self, StateCheck::Expired | StateCheck::Valid(_))
    }
}

/// Expired states are dropped; a client mismatch leaves the state usable by
/// the client it was issued to.
pub fn check_state(row: Option<&OAuthState>, user_identifier: Option<&str>, now: DateTime<Utc>) -> StateCheck {
    match row {
        None => StateCheck::Unknown,
        Some(row) if row.is_expired_at(now) => StateCheck::Expired,
        Some(row) if user_identifier.is_some_and(|id| id != row.user_identifier) => StateCheck::ClientMismatch,
        Some(row) => StateCheck::Valid(row.tool_slug.clone()),
    }
}

/// Persistence of OAuth states.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn insert(
        &self,
        state: &str,
        tool_slug: &str,
        user_identifier: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Locks the row, runs `check_state` and deletes the row when the check
    /// consumes it. Concurrent callers for one state are serialized.
    async fn check_and_take(
        &self,
        state: &str,
        user_identifier: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<StateCheck, AppError>;

    async fn live_tool_slug(&self, state: &str, now: DateTime<Utc>) -> Result<Option<String>, AppError>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;

    async fn count_active(&self, now: DateTime<Utc>) -> Result<i64, AppError>;

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<OAuthState>, AppError>;
}

pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn insert(
        &self,
        state: &str,
        tool_slug: &str,
        user_identifier: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("INSERT INTO oauth_states (state, tool_slug, user_identifier, expires_at) VALUES ($1, $2, $3, $4)")
            .bind(state)
            .bind(tool_slug)
            .bind(user_identifier)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn check_and_take(
        &self,
        state: &str,
        user_identifier: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<StateCheck, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OAuthState>(&format!(
            "SELECT {} FROM oauth_states WHERE state = $1 FOR UPDATE",
            STATE_COLUMNS
        ))
        .bind(state)
        .fetch_optional(&mut *tx)
        .await?;

        let check = check_state(row.as_ref(), user_identifier, now);
        if let (true, Some(row)) = (check.consumes(), row) {
            sqlx::query("DELETE FROM oauth_states WHERE id = $1")
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(check)
    }

    async fn live_tool_slug(&self, state: &str, now: DateTime<Utc>) -> Result<Option<String>, AppError> {
        let slug = sqlx::query_scalar::<_, String>(
            "SELECT tool_slug FROM oauth_states WHERE state = $1 AND expires_at > $2",
        )
        .bind(state)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(slug)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_active(&self, now: DateTime<Utc>) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM oauth_states WHERE expires_at > $1")
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<OAuthState>, AppError> {
        let states = sqlx::query_as::<_, OAuthState>(&format!(
            "SELECT {} FROM oauth_states WHERE expires_at <= $1 ORDER BY expires_at",
            STATE_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(states)
    }
}

/// One-time OAuth `state` values bound to a tool and a client.
pub struct OAuthStateManager<'a> {
    store: &'a dyn StateStore,
    timeout_seconds: i64,
}

impl<'a> OAuthStateManager<'a> {
    pub fn new(store: &'a dyn StateStore, timeout_seconds: i64) -> Self {
        Self { store, timeout_seconds }
    }

    pub async fn create_state(&self, tool_slug: &str, user_identifier: &str) -> Result<String, AppError> {
        let state = generate_state();
        let expires_at = Utc::now() + Duration::seconds(self.timeout_seconds);
        self.store.insert(&state, tool_slug, user_identifier, expires_at).await?;

        info!("Created OAuth state {}... for tool {}", short(&state), tool_slug);
        Ok(state)
    }

    /// Returns the tool slug bound to `state` and deletes it. An identifier
    /// mismatch is rejected without consuming the state.
    pub async fn validate_and_consume(&self, state: &str, user_identifier: Option<&str>) -> Result<Option<String>, AppError> {
        match self.store.check_and_take(state, user_identifier, Utc::now()).await? {
            StateCheck::Valid(tool_slug) => Ok(Some(tool_slug)),
            StateCheck::Unknown => {
                warn!("Unknown OAuth state {}...", short(state));
                Ok(None)
            }
            StateCheck::Expired => {
                warn!("Expired OAuth state {}...", short(state));
                Ok(None)
            }
            StateCheck::ClientMismatch => {
                warn!("OAuth state {}... used by a different client", short(state));
                Ok(None)
            }
        }
    }

    /// Tool slug of a live state, without consuming it.
    pub async fn peek_tool_slug(&self, state: &str) -> Result<Option<String>, AppError> {
        self.store.live_tool_slug(state, Utc::now()).await
    }

    pub async fn cleanup_expired(&self) -> Result<u64, AppError> {
        let removed = self.store.delete_expired(Utc::now()).await?;
        if removed > 0 {
            info!("Removed {} expired OAuth states", removed);
        }
        Ok(removed)
    }

    pub async fn active_count(&self) -> Result<i64, AppError> {
        self.store.count_active(Utc::now()).await
    }

    pub async fn expired_summary(&self) -> Result<ExpiredStatesSummary, AppError> {
        let now = Utc::now();
        let states = self.store.list_expired(now).await?;
        Ok(ExpiredStatesSummary {
            expired: states.len() as i64,
            active: self.store.count_active(now).await?,
            states,
        })
    }
}
