//! Assertion validation and session issuance.

use thiserror::Error;
use tracing::{debug, error, warn};

use super::provider::{self, DirectoryError};
use super::registry::{Credentials, RegistryError, SamlAuthError, TenantRegistry};
use super::relay_state::RelayState;

/// Coarse sign-in failures. Only the variant reaches the browser.
#[derive(Debug, Error)]
pub enum SignInError {
    #[error("signup is not available for this tenant")]
    SignupDisabled,
    #[error("access denied")]
    AccessDenied,
    #[error("sign-in could not be validated")]
    ValidationError,
}

/// Validate `assertion` against the provider named by `state` and return the
/// credentials of the authenticated user.
///
/// The tenant transaction is committed once on success. Every failure path
/// drops the cursor uncommitted.
///
/// # Errors
/// See [`SignInError`]; details are logged, never returned.
pub async fn complete_sign_in(
    registry: &dyn TenantRegistry,
    state: &RelayState,
    assertion: Option<&str>,
) -> Result<Credentials, SignInError> {
    let tenant = state.tenant();
    let provider_id = state.provider();

    let Some(assertion) = assertion.filter(|assertion| !assertion.trim().is_empty()) else {
        warn!(tenant = %tenant, provider = %provider_id, "SAML2: missing SAMLResponse");
        return Err(SignInError::ValidationError);
    };

    let handle = registry.resolve(tenant).await.map_err(|err| {
        match &err {
            RegistryError::Unavailable(reason) => {
                warn!(tenant = %tenant, reason = %reason, "SAML2: tenant unavailable");
            }
            RegistryError::Storage(_) => {
                error!(tenant = %tenant, error = %err, "SAML2: tenant lookup failed");
            }
        }
        SignInError::ValidationError
    })?;

    let mut cursor = handle.cursor().await.map_err(|err| {
        error!(tenant = %tenant, error = %err, "SAML2: failed to open cursor");
        SignInError::ValidationError
    })?;

    // the provider must exist and be enabled before the assertion is looked at
    if let Err(err) = provider::resolve(cursor.as_mut(), provider_id).await {
        match err {
            DirectoryError::NotFound(_) | DirectoryError::NotInstalled => {
                warn!(tenant = %tenant, provider = %provider_id, error = %err, "SAML2: unknown provider");
            }
            _ => {
                error!(tenant = %tenant, provider = %provider_id, error = %err, "SAML2: provider lookup failed");
            }
        }
        return Err(SignInError::ValidationError);
    }

    let Some(users) = cursor.users() else {
        warn!(tenant = %tenant, "SAML2: user model not installed, signup unavailable");
        return Err(SignInError::SignupDisabled);
    };

    let credentials = match users
        .authenticate_via_saml(provider_id, assertion, state.context())
        .await
    {
        Ok(credentials) => credentials,
        Err(SamlAuthError::SignupDisabled) => {
            warn!(tenant = %tenant, provider = %provider_id, "SAML2: signup disabled for unknown identity");
            return Err(SignInError::SignupDisabled);
        }
        Err(SamlAuthError::AccessDenied(reason)) => {
            warn!(tenant = %tenant, provider = %provider_id, reason = %reason, "SAML2: access denied");
            return Err(SignInError::AccessDenied);
        }
        Err(SamlAuthError::Internal(err)) => {
            error!(tenant = %tenant, provider = %provider_id, error = %err, "SAML2: assertion validation failed");
            return Err(SignInError::ValidationError);
        }
    };

    cursor.commit().await.map_err(|err| {
        error!(tenant = %tenant, error = %err, "SAML2: failed to commit sign-in");
        SignInError::ValidationError
    })?;

    debug!(tenant = %tenant, provider = %provider_id, login = %credentials.login, "SAML2: sign-in validated");

    Ok(credentials)
}
