use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::errors::AppError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: String, // user id
    pub user_id: i64,
    pub email: String,
    pub role: String,
    pub role_level: i32,
    pub is_staff: bool,
    pub token_type: TokenType,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Who a token is issued for.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSubject {
    pub user_id: i64,
    pub email: String,
    pub role: String,
    pub role_level: i32,
    pub is_staff: bool,
}

impl From<&Claims> for TokenSubject {
    fn from(claims: &Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email.clone(),
            role: claims.role.clone(),
            role_level: claims.role_level,
            is_staff: claims.is_staff,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TokenPair {
    pub refresh: String,
    pub access: String,
}

pub fn generate_token(config: &JwtConfig, subject: &TokenSubject, token_type: TokenType) -> Result<String, AppError> {
    let now = Utc::now();
    let lifetime = match token_type {
        TokenType::Access => Duration::minutes(config.access_lifetime_minutes),
        TokenType::Refresh => Duration::days(config.refresh_lifetime_days),
    };

    let claims = Claims {
        sub: subject.user_id.to_string(),
        user_id: subject.user_id,
        email: subject.email.clone(),
        role: subject.role.clone(),
        role_level: subject.role_level,
        is_staff: subject.is_staff,
        token_type,
        jti: Uuid::new_v4(),
        iat: now.timestamp(),
        exp: (now + lifetime).timestamp(),
    };

    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(config.secret.as_bytes()))
        .map_err(|_| AppError::InternalServerError("Token generation error".into()))
}

pub fn generate_token_pair(config: &JwtConfig, subject: &TokenSubject) -> Result<TokenPair, AppError> {
    Ok(TokenPair {
        refresh: generate_token(config, subject, TokenType::Refresh)?,
        access: generate_token(config, subject, TokenType::Access)?,
    })
}

/// Checks signature and expiry with no leeway. When `expected` is given the
/// token type must match.
pub fn validate_token(secret: &str, token: &str, expected: Option<TokenType>) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized("Token is invalid or expired".into()))?;

    match expected {
        Some(kind) if kind != claims.token_type => Err(AppError::Unauthorized("Token has wrong type".into())),
        _ => Ok(claims),
    }
}
