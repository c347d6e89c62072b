use log::warn;
use std::sync::Arc;

use crate::config::IdentityConfig;
use crate::errors::AppError;
use crate::services::directory::GroupDirectory;
use crate::services::identity_provider::IdentityClient;
use crate::services::roles::RoleMappings;
use crate::services::token_manager::{ClientCredentialsSource, TokenManager};

/// Everything the OAuth routes need, built once at startup.
pub struct IdentityServices {
    pub client: IdentityClient,
    pub tokens: Arc<TokenManager>,
    pub directory: GroupDirectory,
    pub roles: RoleMappings,
}

impl IdentityServices {
    pub fn from_config(config: &IdentityConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("HTTP client: {}", e)))?;

        let tokens = Arc::new(TokenManager::new(
            Box::new(ClientCredentialsSource::new(http.clone(), config)),
            &config.client_id,
            &config.app_scope,
        ));

        Ok(Self {
            client: IdentityClient::new(http.clone(), config.clone()),
            directory: GroupDirectory::new(http, config, tokens.clone()),
            tokens,
            roles: RoleMappings::with_overrides(config.role_mappings.as_deref())?,
        })
    }

    /// Group names for role resolution. Lookup failures fall back to no groups.
    pub async fn groups_or_empty(&self, user_id: &str) -> Vec<String> {
        match self.directory.user_groups(user_id).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!("Group lookup for {} failed, using default role: {}", user_id, e);
                Vec::new()
            }
        }
    }
}

/// Optional identity services; `None` when the provider is not configured.
pub struct IdentityState(pub Option<IdentityServices>);

impl IdentityState {
    pub fn get(&self) -> Result<&IdentityServices, AppError> {
        self.0
            .as_ref()
            .ok_or_else(|| AppError::ServiceUnavailable("Identity provider is not configured".into()))
    }
}
