use clap::{Parser, Subcommand};
use std::env;
use std::str::FromStr;

use crate::errors::AppError;
use crate::services::identity_provider::COMMON_LOGOUT_URL;

/// Command line for the backend binary.
#[derive(Parser, Debug)]
#[command(author, version, about = "DSP backend API")]
pub struct Cli {
    /// Host to bind to (overrides HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply the SQL migrations and exit
    Migrate,
    /// Delete expired OAuth states
    CleanupOauthStates {
        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
        /// Print every expired state
        #[arg(long)]
        verbose: bool,
    },
    /// Create the default tools if they are missing
    SeedTools {
        /// Grant every active employee access to the e-learning tool
        #[arg(long)]
        grant_elearning_all: bool,
    },
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_lifetime_minutes: i64,
    pub refresh_lifetime_days: i64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub base_path: String,
    pub images_folder: String,
    pub articles_folder: String,
    pub videos_folder: String,
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub presign_seconds: u64,
}

/// OAuth 2.0 settings of the external identity provider.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub logout_url: String,
    /// Group lookup endpoint; `{user_id}` is replaced with the user's id or email.
    pub groups_url: String,
    pub scope: String,
    /// Scope requested with the client credentials grant.
    pub app_scope: String,
    pub callback_url: String,
    pub role_mappings: Option<String>,
    pub role_cache_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub frontend_url: String,
    pub allowed_email_domains: Vec<String>,
    pub oauth_state_timeout_seconds: i64,
    /// Body limit for uploads under the content scope.
    pub max_upload_bytes: usize,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub identity: Option<IdentityConfig>,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env_opt(key) {
        Some(value) => value.trim().parse::<T>().map_err(|_| {
            AppError::ConfigurationError(format!("invalid value `{}` for {}", value, key))
        }),
        None => Ok(default),
    }
}

fn env_required(key: &str) -> Result<String, AppError> {
    env_opt(key).ok_or_else(|| AppError::ConfigurationError(format!("{} must be set", key)))
}

pub fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            bucket: env_or("STORAGE_BUCKET", "dsp-e-learning"),
            base_path: env_or("STORAGE_BASE_PATH", "Lerninhalte"),
            images_folder: env_or("STORAGE_IMAGES_FOLDER", "Bilder"),
            articles_folder: env_or("STORAGE_ARTICLES_FOLDER", "Artikel"),
            videos_folder: env_or("STORAGE_VIDEOS_FOLDER", "Videos"),
            endpoint_url: env_or("STORAGE_ENDPOINT_URL", "https://s3.eu-central-2.wasabisys.com"),
            region: env_or("STORAGE_REGION", "eu-central-2"),
            access_key_id: env_opt("STORAGE_ACCESS_KEY_ID"),
            secret_access_key: env_opt("STORAGE_SECRET_ACCESS_KEY"),
            presign_seconds: env_parse("STORAGE_PRESIGN_SECONDS", 7200)?,
        })
    }
}

impl IdentityConfig {
    /// Returns `None` when the client credentials are not configured.
    pub fn from_env() -> Result<Option<Self>, AppError> {
        let (client_id, client_secret) = match (env_opt("IDP_CLIENT_ID"), env_opt("IDP_CLIENT_SECRET")) {
            (Some(id), Some(secret)) => (id, secret),
            _ => return Ok(None),
        };

        let tenant = env_opt("IDP_TENANT_ID");
        let tenant_url = |suffix: &str| -> Option<String> {
            tenant
                .as_ref()
                .map(|t| format!("https://login.microsoftonline.com/{}/oauth2/v2.0/{}", t, suffix))
        };

        let authorize_url = env_opt("IDP_AUTHORIZE_URL")
            .or_else(|| tenant_url("authorize"))
            .ok_or_else(|| AppError::ConfigurationError("IDP_AUTHORIZE_URL or IDP_TENANT_ID must be set".into()))?;
        let token_url = env_opt("IDP_TOKEN_URL")
            .or_else(|| tenant_url("token"))
            .ok_or_else(|| AppError::ConfigurationError("IDP_TOKEN_URL or IDP_TENANT_ID must be set".into()))?;
        let logout_url = env_opt("IDP_LOGOUT_URL")
            .or_else(|| tenant_url("logout"))
            .unwrap_or_else(|| COMMON_LOGOUT_URL.to_string());

        Ok(Some(Self {
            client_id,
            client_secret,
            authorize_url,
            token_url,
            userinfo_url: env_or("IDP_USERINFO_URL", "https://graph.microsoft.com/v1.0/me"),
            logout_url,
            groups_url: env_or(
                "IDP_GROUPS_URL",
                "https://graph.microsoft.com/v1.0/users/{user_id}/memberOf?$select=displayName,id",
            ),
            scope: env_or("IDP_SCOPE", "openid email profile User.Read"),
            app_scope: env_or("IDP_APP_SCOPE", "https://graph.microsoft.com/.default"),
            callback_url: env_or("IDP_CALLBACK_URL", "http://localhost:8080/api/microsoft/auth/callback/"),
            role_mappings: env_opt("ROLE_MAPPINGS"),
            role_cache_seconds: env_parse("ROLE_CACHE_SECONDS", 300)?,
        }))
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = env_required("JWT_SECRET")?;

        Ok(Self {
            host: env_or("HOST", "127.0.0.1"),
            port: env_parse("PORT", 8080)?,
            database_url: env_required("DATABASE_URL")?,
            frontend_url: env_or("FRONTEND_URL", "http://localhost:5173"),
            allowed_email_domains: parse_domain_list(&env_or("ALLOWED_EMAIL_DOMAINS", "")),
            oauth_state_timeout_seconds: env_parse("OAUTH_STATE_TIMEOUT_SECONDS", 600)?,
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            jwt: JwtConfig {
                secret,
                access_lifetime_minutes: env_parse("JWT_ACCESS_TOKEN_LIFETIME_MINUTES", 15)?,
                refresh_lifetime_days: env_parse("JWT_REFRESH_TOKEN_LIFETIME_DAYS", 1)?,
            },
            storage: StorageConfig::from_env()?,
            identity: IdentityConfig::from_env()?,
        })
    }

    /// Applies command line overrides on top of the environment.
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_list_is_trimmed_and_lowercased() {
        assert_eq!(
            parse_domain_list(" Example.com, ,dsp.de "),
            vec!["example.com".to_string(), "dsp.de".to_string()]
        );
        assert!(parse_domain_list("").is_empty());
    }

    #[test]
    fn cli_parses_cleanup_flags() {
        let cli = Cli::parse_from(["dsp_backend", "cleanup-oauth-states", "--dry-run"]);
        assert_eq!(
            cli.command,
            Some(Command::CleanupOauthStates { dry_run: true, verbose: false })
        );
    }

    #[test]
    fn cli_overrides_port() {
        let cli = Cli::parse_from(["dsp_backend", "--port", "9000", "serve"]);
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.command, Some(Command::Serve));
    }
}
