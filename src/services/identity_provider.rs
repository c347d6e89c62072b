use log::{error, info};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::IdentityConfig;
use crate::errors::AppError;

/// Provider-wide logout endpoint used when no tenant is configured.
pub const COMMON_LOGOUT_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/logout";

#[derive(Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Profile returned by the user-info endpoint.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
}

impl UserProfile {
    /// `mail`, falling back to the principal name.
    pub fn email(&self) -> Option<&str> {
        self.mail
            .as_deref()
            .or(self.user_principal_name.as_deref())
            .filter(|e| !e.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct ProviderError {
    error: Option<String>,
    error_description: Option<String>,
}

/// Turns a token endpoint answer into a token or a readable error.
pub fn parse_token_response(status: StatusCode, body: &str) -> Result<TokenResponse, AppError> {
    if !status.is_success() {
        let message = serde_json::from_str::<ProviderError>(body)
            .ok()
            .and_then(|e| e.error_description.or(e.error))
            .unwrap_or_else(|| format!("token endpoint returned {}", status));
        return Err(AppError::IdentityProviderError(message));
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| AppError::IdentityProviderError(format!("invalid token response: {}", e)))?;
    if value.get("access_token").and_then(|v| v.as_str()).is_none() {
        return Err(AppError::IdentityProviderError("No access token received".into()));
    }
    serde_json::from_value(value)
        .map_err(|e| AppError::IdentityProviderError(format!("invalid token response: {}", e)))
}

/// OAuth 2.0 authorization code flow against the configured provider.
#[derive(Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    config: IdentityConfig,
}

impl IdentityClient {
    pub fn new(http: reqwest::Client, config: IdentityConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub fn authorization_url(&self, state: &str) -> Result<String, AppError> {
        let url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("scope", self.config.scope.as_str()),
                ("state", state),
                ("response_mode", "query"),
            ],
        )
        .map_err(|e| AppError::ConfigurationError(format!("invalid authorize URL: {}", e)))?;
        Ok(url.to_string())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("grant_type", "authorization_code"),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let token = parse_token_response(status, &body).map_err(|e| {
            error!("Code exchange failed: {}", e);
            e
        })?;
        info!("Exchanged authorization code");
        Ok(token)
    }

    pub async fn user_info(&self, access_token: &str) -> Result<UserProfile, AppError> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            error!("User info request failed with {}", status);
            return Err(AppError::IdentityProviderError(format!("user info request failed: {}", status)));
        }
        Ok(response.json::<UserProfile>().await?)
    }

    pub fn logout_url(&self, post_logout_redirect_uri: &str) -> Result<String, AppError> {
        let url = Url::parse_with_params(
            &self.config.logout_url,
            &[("post_logout_redirect_uri", post_logout_redirect_uri)],
        )
        .map_err(|e| AppError::ConfigurationError(format!("invalid logout URL: {}", e)))?;
        Ok(url.to_string())
    }
}
