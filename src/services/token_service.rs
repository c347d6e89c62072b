use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{info, warn};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::errors::AppError;
use crate::utils::jwt::{generate_token_pair, validate_token, Claims, TokenPair, TokenSubject, TokenType};

/// Blacklist and account lookups behind refresh-token handling.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn is_blacklisted(&self, jti: Uuid) -> Result<bool, AppError>;

    /// Records `jti`. Returns false when it was already blacklisted, which
    /// makes the insert the single gate for one-time use.
    async fn blacklist(&self, jti: Uuid, user_id: i64, expires_at: DateTime<Utc>) -> Result<bool, AppError>;

    async fn user_is_active(&self, user_id: i64) -> Result<bool, AppError>;
}

pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn is_blacklisted(&self, jti: Uuid) -> Result<bool, AppError> {
        let found = sqlx::query_scalar::<_, i64>("SELECT id FROM token_blacklist WHERE jti = $1")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn blacklist(&self, jti: Uuid, user_id: i64, expires_at: DateTime<Utc>) -> Result<bool, AppError> {
        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO token_blacklist (jti, user_id, expires_at) \
             VALUES ($1, (SELECT id FROM users WHERE id = $2), $3) \
             ON CONFLICT (jti) DO NOTHING \
             RETURNING id",
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted.is_some())
    }

    async fn user_is_active(&self, user_id: i64) -> Result<bool, AppError> {
        let active = sqlx::query_scalar::<_, bool>("SELECT is_active FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(active == Some(true))
    }
}

fn blacklisted() -> AppError {
    AppError::Unauthorized("Token is blacklisted".into())
}

/// Refresh-token lifecycle backed by the `token_blacklist` table.
pub struct TokenService<'a> {
    store: &'a dyn TokenStore,
    config: &'a JwtConfig,
}

impl<'a> TokenService<'a> {
    pub fn new(store: &'a dyn TokenStore, config: &'a JwtConfig) -> Self {
        Self { store, config }
    }

    async fn blacklist(&self, claims: &Claims) -> Result<bool, AppError> {
        let expires_at = Utc.timestamp_opt(claims.exp, 0).single().unwrap_or_else(Utc::now);
        self.store.blacklist(claims.jti, claims.user_id, expires_at).await
    }

    /// Issues a new pair and blacklists the old refresh token. Of several
    /// concurrent refreshes with one token only the first succeeds.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = validate_token(&self.config.secret, refresh_token, Some(TokenType::Refresh))?;

        if !self.store.user_is_active(claims.user_id).await? {
            return Err(AppError::Unauthorized("User is inactive or does not exist".into()));
        }
        if !self.blacklist(&claims).await? {
            warn!("Blacklisted refresh token used by user {}", claims.user_id);
            return Err(blacklisted());
        }
        generate_token_pair(self.config, &TokenSubject::from(&claims))
    }

    /// Valid signature, not expired and, for refresh tokens, not blacklisted.
    pub async fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let claims = validate_token(&self.config.secret, token, None)?;
        if claims.token_type == TokenType::Refresh && self.store.is_blacklisted(claims.jti).await? {
            return Err(blacklisted());
        }
        Ok(claims)
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<Claims, AppError> {
        let claims = validate_token(&self.config.secret, refresh_token, Some(TokenType::Refresh))
            .map_err(|e| AppError::BadRequest(format!("Invalid refresh token: {}", e.message())))?;
        if !self.blacklist(&claims).await? {
            return Err(AppError::BadRequest("Invalid refresh token: Token is blacklisted".into()));
        }
        info!("User {} logged out", claims.user_id);
        Ok(claims)
    }
}
