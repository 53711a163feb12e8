//! Collaborator seams consumed by the flow core.
//!
//! The core never talks to a database directly. A [`TenantRegistry`] resolves a
//! tenant name into a [`RegistryHandle`], the handle opens a scoped
//! [`Cursor`], and the cursor exposes the provider and user models installed
//! for that tenant. Dropping a cursor without calling [`Cursor::commit`]
//! releases it and rolls back whatever the models wrote.

use secrecy::SecretString;
use std::{future::Future, pin::Pin, sync::Arc};
use thiserror::Error;

use super::provider::{Provider, ProviderFilter, ProviderId};
use super::relay_state::{Context, RelayState};
use super::request::AuthRequestArtifact;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The tenant does not exist or may not be served.
    #[error("tenant unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Errors raised by provider model calls.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("provider {0} not found")]
    NotFound(ProviderId),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Failures of [`UserModel::authenticate_via_saml`], kept apart so the flow can
/// map each one to its own redirect code.
#[derive(Debug, Error)]
pub enum SamlAuthError {
    /// No local account can be created or bound for the validated identity.
    #[error("signup is not available")]
    SignupDisabled,
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Resolve tenants to handles.
pub trait TenantRegistry: Send + Sync {
    fn resolve<'a>(
        &'a self,
        tenant: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn RegistryHandle>, RegistryError>>;
}

/// A resolved tenant.
pub trait RegistryHandle: Send + Sync {
    fn tenant(&self) -> &str;

    /// Open a scoped transaction over the tenant storage.
    fn cursor(&self) -> BoxFuture<'_, anyhow::Result<Box<dyn Cursor>>>;
}

/// Scoped transaction. Released (rolled back) on drop unless committed.
pub trait Cursor: Send {
    /// Provider model, `None` when the tenant has no SAML providers installed.
    fn providers(&mut self) -> Option<&mut dyn ProviderModel>;

    /// User model, `None` when the tenant cannot bind or provision accounts.
    fn users(&mut self) -> Option<&mut dyn UserModel>;

    fn commit(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>>;
}

pub trait ProviderModel: Send {
    /// Build the provider specific authentication request for `state`.
    fn get_auth_request<'a>(
        &'a mut self,
        provider_id: ProviderId,
        state: &'a RelayState,
    ) -> BoxFuture<'a, Result<AuthRequestArtifact, ModelError>>;

    fn search_read<'a>(
        &'a mut self,
        filter: &'a ProviderFilter,
    ) -> BoxFuture<'a, Result<Vec<Provider>, ModelError>>;

    fn read(&mut self, provider_id: ProviderId)
    -> BoxFuture<'_, Result<Option<Provider>, ModelError>>;
}

pub trait UserModel: Send {
    /// Validate `assertion` against the provider and return session credentials.
    fn authenticate_via_saml<'a>(
        &'a mut self,
        provider_id: ProviderId,
        assertion: &'a str,
        context: &'a Context,
    ) -> BoxFuture<'a, Result<Credentials, SamlAuthError>>;
}

/// Application credentials produced by a successful assertion validation.
///
/// The session token is the raw cookie value; storage only keeps its hash.
#[derive(Debug)]
pub struct Credentials {
    pub tenant: String,
    pub login: String,
    pub session_token: SecretString,
}
