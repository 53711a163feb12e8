//! Authentication request builder.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use super::provider::{self, DirectoryError};
use super::registry::{ModelError, RegistryError, TenantRegistry};
use super::relay_state::RelayState;

/// Provider specific request payload, usually the IdP redirect URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthRequestArtifact(String);

impl AuthRequestArtifact {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
enum BuildError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Build the IdP request for the tenant and provider named by `state`.
///
/// Returns `None` when anything along the way fails; the reason is logged.
pub async fn build_auth_request(
    registry: &dyn TenantRegistry,
    state: &RelayState,
) -> Option<AuthRequestArtifact> {
    match try_build(registry, state).await {
        Ok(artifact) => {
            debug!(
                tenant = %state.tenant(),
                provider = %state.provider(),
                "SAML2: auth request built"
            );
            Some(artifact)
        }
        Err(err) => {
            error!(
                tenant = %state.tenant(),
                provider = %state.provider(),
                error = %err,
                "SAML2: failed to build auth request"
            );
            None
        }
    }
}

async fn try_build(
    registry: &dyn TenantRegistry,
    state: &RelayState,
) -> Result<AuthRequestArtifact, BuildError> {
    let handle = registry.resolve(state.tenant()).await?;
    // read-only: the cursor is dropped without commit
    let mut cursor = handle.cursor().await?;
    let provider = provider::resolve(cursor.as_mut(), state.provider()).await?;
    Ok(provider.build_auth_request(state).await?)
}
