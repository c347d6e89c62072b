use actix_web::cookie::Cookie;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::employee_auth::{EmployeeAuthenticator, PgEmployeeStore};
use crate::services::identity::IdentityState;
use crate::services::identity_provider::COMMON_LOGOUT_URL;
use crate::services::oauth_state::{request_identifier, short, OAuthStateManager, PgStateStore};
use crate::services::token_service::{PgTokenStore, TokenService};
use crate::utils::auth::{require_staff, ACCESS_TOKEN_COOKIE};

#[derive(Deserialize)]
pub struct CallbackQuery {
    state: Option<String>,
}

#[derive(Deserialize)]
pub struct CodeExchange {
    code: Option<String>,
    state: Option<String>,
}

#[derive(Deserialize)]
pub struct LogoutRequest {
    refresh: Option<String>,
    post_logout_redirect_uri: Option<String>,
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found().insert_header((header::LOCATION, location)).finish()
}

fn frontend_base(tool_url: &str, config: &AppConfig) -> String {
    if tool_url.trim().is_empty() {
        config.frontend_url.clone()
    } else {
        tool_url.to_string()
    }
}

/// Starts the provider sign-in for a tool.
pub async fn login(
    req: HttpRequest,
    tool_slug: web::Path<String>,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    identity: web::Data<IdentityState>,
) -> Result<HttpResponse, AppError> {
    let identity = identity.get()?;
    let tool_slug = tool_slug.into_inner();

    PgEmployeeStore::new(pool.get_ref().clone())
        .active_tool(&tool_slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tool '{}' not found or inactive", tool_slug)))?;

    let states = PgStateStore::new(pool.get_ref().clone());
    let state = OAuthStateManager::new(&states, config.oauth_state_timeout_seconds)
        .create_state(&tool_slug, &request_identifier(&req))
        .await?;

    Ok(redirect(&identity.client.authorization_url(&state)?))
}

/// Provider redirect target. Passes the query on to the tool's frontend,
/// which posts `code` and `state` back to `callback_exchange`.
pub async fn callback_redirect(
    req: HttpRequest,
    query: web::Query<CallbackQuery>,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, AppError> {
    let state = query
        .state
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("No state found in callback. Cannot proceed.".into()))?;

    let states = PgStateStore::new(pool.get_ref().clone());
    let tool_slug = OAuthStateManager::new(&states, config.oauth_state_timeout_seconds)
        .peek_tool_slug(state)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired state. Please try logging in again.".into()))?;

    let tool = PgEmployeeStore::new(pool.get_ref().clone())
        .active_tool(&tool_slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Tool configured for this login does not exist.".into()))?;

    let location = format!("{}?{}", frontend_base(&tool.frontend_url, &config), req.query_string());
    info!("Forwarding callback for state {}... to tool {}", short(state), tool.slug);
    Ok(redirect(&location))
}

/// Exchanges the authorization code for the employee's JWT pair.
pub async fn callback_exchange(
    req: HttpRequest,
    tool_slug: web::Path<String>,
    body: web::Json<CodeExchange>,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    identity: web::Data<IdentityState>,
) -> Result<HttpResponse, AppError> {
    let identity = identity.get()?;
    let tool_slug = tool_slug.into_inner();

    let (code, state) = match (body.code.as_deref(), body.state.as_deref()) {
        (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => (code, state),
        _ => return Err(AppError::BadRequest("Missing 'code' or 'state' in request body.".into())),
    };

    let store = PgStateStore::new(pool.get_ref().clone());
    let states = OAuthStateManager::new(&store, config.oauth_state_timeout_seconds);
    let bound = states.peek_tool_slug(state).await?;
    if bound.as_deref() != Some(tool_slug.as_str()) {
        warn!("State {}... does not belong to tool {}", short(state), tool_slug);
        return Err(AppError::BadRequest("State-Tool mismatch or expired state.".into()));
    }
    if states.validate_and_consume(state, Some(&request_identifier(&req))).await?.is_none() {
        return Err(AppError::BadRequest("State-Tool mismatch or expired state.".into()));
    }

    let store = PgEmployeeStore::new(pool.get_ref().clone());
    let tool = store
        .active_tool(&tool_slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tool '{}' not found.", tool_slug)))?;

    let outcome = async {
        let token = identity.client.exchange_code(code).await?;
        let profile = identity.client.user_info(&token.access_token).await?;
        let groups = identity.groups_or_empty(&profile.id).await;
        EmployeeAuthenticator {
            store: &store,
            roles: &identity.roles,
            jwt: &config.jwt,
            allowed_domains: &config.allowed_email_domains,
        }
        .authenticate(&profile, &groups, &tool)
        .await
    }
    .await;

    match outcome {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(e @ (AppError::Forbidden(_) | AppError::IdentityProviderError(_))) => {
            error!("Authentication failed for tool '{}': {}", tool_slug, e);
            Ok(HttpResponse::Forbidden().json(json!({"success": false, "error": e.message()})))
        }
        Err(e) => Err(e),
    }
}

pub async fn logout(
    body: web::Json<LogoutRequest>,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    identity: web::Data<IdentityState>,
) -> Result<HttpResponse, AppError> {
    let refresh = body
        .refresh
        .as_deref()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::BadRequest("No refresh token provided.".into()))?;

    let store = PgTokenStore::new(pool.get_ref().clone());
    TokenService::new(&store, &config.jwt)
        .logout(refresh)
        .await
        .map_err(|_| AppError::BadRequest("Invalid token.".into()))?;

    let post_logout = body
        .post_logout_redirect_uri
        .clone()
        .unwrap_or_else(|| config.frontend_url.clone());
    let logout_url = match identity.0.as_ref() {
        Some(services) => services.client.logout_url(&post_logout)?,
        None => format!("{}?post_logout_redirect_uri={}", COMMON_LOGOUT_URL, post_logout),
    };

    let mut expired = Cookie::new(ACCESS_TOKEN_COOKIE, "");
    expired.set_path("/");
    let mut response = HttpResponse::Ok().json(json!({"success": true, "logout_url": logout_url}));
    response.add_removal_cookie(&expired).map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(response)
}

pub async fn token_status(
    req: HttpRequest,
    config: web::Data<AppConfig>,
    identity: web::Data<IdentityState>,
) -> Result<HttpResponse, AppError> {
    require_staff(&req, &config.jwt)?;
    let services = identity.get()?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "token_info": services.tokens.info().await,
        "roles": services.roles.hierarchy(),
    })))
}

pub async fn token_invalidate(
    req: HttpRequest,
    config: web::Data<AppConfig>,
    identity: web::Data<IdentityState>,
) -> Result<HttpResponse, AppError> {
    let claims = require_staff(&req, &config.jwt)?;
    let services = identity.get()?;
    services.tokens.invalidate().await;
    let cleared = services.directory.clear_cache().await;
    info!("Application token invalidated by user {}", claims.user_id);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Token cache invalidated",
        "cleared_group_entries": cleared,
    })))
}
