//! SAML authentication flow core.
//!
//! Everything in here is storage agnostic and talks to the outside world only
//! through the traits in [`registry`].

pub mod assertion;
pub mod flow;
pub mod provider;
pub mod registry;
pub mod relay_state;
pub mod request;

#[cfg(test)]
pub(crate) mod test_support;

pub use assertion::{SignInError, complete_sign_in};
pub use flow::{
    AuthRequestResponse, SignInOutcome, SignInParams, SignInRedirect, get_auth_request,
    list_providers, sign_in,
};
pub use provider::{Provider, ProviderFilter, ProviderId};
pub use registry::{
    BoxFuture, Credentials, Cursor, ModelError, ProviderModel, RegistryError, RegistryHandle,
    SamlAuthError, TenantRegistry, UserModel,
};
pub use relay_state::{Context, DecodeError, RelayState};
pub use request::AuthRequestArtifact;
