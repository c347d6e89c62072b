use actix_web::{web, HttpResponse};
use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::user::User;
use crate::services::roles::RoleLevel;
use crate::services::token_service::{PgTokenStore, TokenService};
use crate::utils::jwt::{generate_token_pair, TokenSubject};
use crate::utils::validation::validate_payload;

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1, max = 128))]
    password: String,
}

#[derive(Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    refresh: String,
}

#[derive(Deserialize, Validate)]
pub struct VerifyRequest {
    #[validate(length(min = 1))]
    token: String,
}

pub fn verify_password(stored_hash: &str, password: &str) -> Result<(), AppError> {
    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|_| AppError::InternalServerError("Invalid password hash".to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized("No active account found with the given credentials".to_string()))
}

/// Role carried in tokens of local accounts.
pub fn local_role(user: &User) -> (&'static str, RoleLevel) {
    if user.is_superuser {
        ("Administrator", RoleLevel::Administrator)
    } else if user.is_staff {
        ("Staff", RoleLevel::Staff)
    } else {
        ("User", RoleLevel::User)
    }
}

pub async fn obtain_token(
    req: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&req.0)?;

    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, first_name, last_name, password_hash, is_staff, is_superuser, is_active, last_login \
         FROM users WHERE LOWER(email) = LOWER($1)",
    )
    .bind(&req.email)
    .fetch_optional(&**pool)
    .await?
    .filter(|u| u.is_active)
    .ok_or_else(|| AppError::Unauthorized("No active account found with the given credentials".to_string()))?;

    let hash = user.password_hash.as_deref().ok_or_else(|| {
        warn!("Password login attempted for account {} without password", user.id);
        AppError::Unauthorized("No active account found with the given credentials".to_string())
    })?;
    verify_password(hash, &req.password)?;

    sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(&**pool)
        .await?;

    let (role, level) = local_role(&user);
    let tokens = generate_token_pair(
        &config.jwt,
        &TokenSubject {
            user_id: user.id,
            email: user.email.clone(),
            role: role.to_string(),
            role_level: level.value(),
            is_staff: user.is_staff,
        },
    )?;

    info!("User {} logged in with password", user.id);
    Ok(HttpResponse::Ok().json(tokens))
}

pub async fn refresh_token(
    req: web::Json<RefreshRequest>,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&req.0)?;
    let store = PgTokenStore::new(pool.get_ref().clone());
    let tokens = TokenService::new(&store, &config.jwt).refresh(&req.refresh).await?;
    Ok(HttpResponse::Ok().json(tokens))
}

pub async fn verify_token(
    req: web::Json<VerifyRequest>,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&req.0)?;
    let store = PgTokenStore::new(pool.get_ref().clone());
    TokenService::new(&store, &config.jwt).verify(&req.token).await?;
    Ok(HttpResponse::Ok().json(json!({})))
}
