//! Provider directory: the enabled identity providers of a tenant.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use super::registry::{Cursor, ModelError, ProviderModel, RegistryError, TenantRegistry};
use super::relay_state::RelayState;
use super::request::AuthRequestArtifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub i64);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One configured identity provider, as shown on the login page.
#[derive(ToSchema, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    #[schema(value_type = i64)]
    pub id: ProviderId,
    pub name: String,
    pub enabled: bool,
    pub css_class: String,
    pub body: String,
    pub sequence: i32,
}

/// Search criteria passed to [`ProviderModel::search_read`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderFilter {
    pub enabled: Option<bool>,
}

impl ProviderFilter {
    #[must_use]
    pub const fn enabled() -> Self {
        Self {
            enabled: Some(true),
        }
    }

    #[must_use]
    pub fn matches(&self, provider: &Provider) -> bool {
        self.enabled.is_none_or(|enabled| provider.enabled == enabled)
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("tenant has no SAML providers installed")]
    NotInstalled,
    #[error("provider {0} not found or disabled")]
    NotFound(ProviderId),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// List the enabled providers of `tenant`, ordered by `sequence`.
///
/// Never fails: an unknown tenant, a tenant without the provider model, or a
/// storage error all yield an empty list.
pub async fn list_enabled(registry: &dyn TenantRegistry, tenant: &str) -> Vec<Provider> {
    match try_list_enabled(registry, tenant).await {
        Ok(providers) => providers,
        Err(DirectoryError::NotInstalled) => {
            debug!(tenant = %tenant, "no SAML provider model installed");
            Vec::new()
        }
        Err(DirectoryError::Registry(RegistryError::Unavailable(reason))) => {
            warn!(tenant = %tenant, reason = %reason, "SAML2: tenant unavailable");
            Vec::new()
        }
        Err(err) => {
            error!(tenant = %tenant, error = %err, "SAML2: failed to list providers");
            Vec::new()
        }
    }
}

async fn try_list_enabled(
    registry: &dyn TenantRegistry,
    tenant: &str,
) -> Result<Vec<Provider>, DirectoryError> {
    let handle = registry.resolve(tenant).await?;
    let mut cursor = handle.cursor().await?;
    let model = cursor.providers().ok_or(DirectoryError::NotInstalled)?;

    let filter = ProviderFilter::enabled();
    let mut providers = model.search_read(&filter).await?;

    // the model's own filtering and ordering are not trusted
    providers.retain(|provider| filter.matches(provider));
    providers.sort_by_key(|provider| (provider.sequence, provider.id));

    Ok(providers)
}

/// An enabled provider bound to the model of an open cursor.
pub struct ProviderHandle<'c> {
    model: &'c mut dyn ProviderModel,
    provider: Provider,
}

impl ProviderHandle<'_> {
    #[must_use]
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Ask the provider model for the IdP request carrying `state`.
    ///
    /// # Errors
    /// Returns the model error unchanged.
    pub async fn build_auth_request(
        self,
        state: &RelayState,
    ) -> Result<AuthRequestArtifact, ModelError> {
        self.model.get_auth_request(self.provider.id, state).await
    }
}

/// Resolve `provider_id` within an open cursor. Disabled providers are not found.
///
/// # Errors
/// [`DirectoryError::NotInstalled`] when the cursor has no provider model,
/// [`DirectoryError::NotFound`] for unknown or disabled providers.
pub async fn resolve(
    cursor: &mut dyn Cursor,
    provider_id: ProviderId,
) -> Result<ProviderHandle<'_>, DirectoryError> {
    let model = cursor.providers().ok_or(DirectoryError::NotInstalled)?;
    let provider = model
        .read(provider_id)
        .await?
        .filter(|provider| provider.enabled)
        .ok_or(DirectoryError::NotFound(provider_id))?;

    Ok(ProviderHandle { model, provider })
}
