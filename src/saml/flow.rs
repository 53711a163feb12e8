//! Flow controller: initiate, list and complete.
//!
//! ```text
//! Idle -> RequestInitiated -> AwaitingIdPResponse -> Completed
//!                                                    |- Success
//!                                                    |- SignupDisabled
//!                                                    |- AccessDenied
//!                                                    `- ValidationError
//! ```
//!
//! Nothing here is kept between requests; the relay state carries the whole
//! handshake.

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::form_urlencoded;
use utoipa::ToSchema;

use super::assertion::{self, SignInError};
use super::provider::{self, Provider};
use super::registry::{Credentials, TenantRegistry};
use super::relay_state::RelayState;
use super::request::{self, AuthRequestArtifact};

pub const SIGNUP_LANDING_URL: &str = "/?type=signup";
pub const SIGNUP_DISABLED_URL: &str = "/#action=login&saml_error=1";
pub const VALIDATION_ERROR_URL: &str = "/#action=login&saml_error=2";
pub const ACCESS_DENIED_URL: &str = "/#action=login&saml_error=3";

#[derive(ToSchema, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequestResponse {
    #[schema(value_type = Option<String>)]
    pub auth_request: Option<AuthRequestArtifact>,
}

/// Parameters of the sign-in callback, as posted by the IdP.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignInParams {
    #[serde(rename = "SAMLResponse", default)]
    pub saml_response: Option<String>,
    #[serde(rename = "RelayState", default)]
    pub relay_state: Option<String>,
}

/// Result of a completed handshake.
#[derive(Debug)]
pub enum SignInOutcome {
    Success {
        credentials: Credentials,
        redirect_url: String,
    },
    SignupDisabled,
    AccessDenied,
    ValidationError,
}

/// What the HTTP boundary has to send back.
#[derive(Debug)]
pub enum SignInRedirect {
    /// Establish the session for `credentials`, then go to `url`.
    Session { credentials: Credentials, url: String },
    /// Redirect while refreshing the existing session cookie.
    RefreshCookie { url: String },
    /// Redirect without touching cookies.
    WithoutCookie { url: String },
    /// No relay state at all: send the browser to the signup page.
    SignupLanding,
}

impl SignInRedirect {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Session { url, .. } | Self::RefreshCookie { url } | Self::WithoutCookie { url } => {
                url
            }
            Self::SignupLanding => SIGNUP_LANDING_URL,
        }
    }
}

impl From<SignInOutcome> for SignInRedirect {
    fn from(outcome: SignInOutcome) -> Self {
        match outcome {
            SignInOutcome::Success {
                credentials,
                redirect_url,
            } => Self::Session {
                credentials,
                url: redirect_url,
            },
            SignInOutcome::SignupDisabled => Self::RefreshCookie {
                url: SIGNUP_DISABLED_URL.to_string(),
            },
            SignInOutcome::AccessDenied => Self::WithoutCookie {
                url: ACCESS_DENIED_URL.to_string(),
            },
            SignInOutcome::ValidationError => Self::RefreshCookie {
                url: VALIDATION_ERROR_URL.to_string(),
            },
        }
    }
}

/// Initiate: decode the relay state and build the IdP request.
pub async fn get_auth_request(
    registry: &dyn TenantRegistry,
    relaystate: Option<&str>,
) -> AuthRequestResponse {
    let Some(raw) = relaystate else {
        warn!("SAML2: get_auth_request without relaystate");
        return AuthRequestResponse { auth_request: None };
    };

    let state = match RelayState::decode(raw) {
        Ok(state) => state,
        Err(err) => {
            warn!(error = %err, "SAML2: undecodable relaystate");
            return AuthRequestResponse { auth_request: None };
        }
    };

    AuthRequestResponse {
        auth_request: request::build_auth_request(registry, &state).await,
    }
}

/// List the enabled providers of `dbname`.
pub async fn list_providers(registry: &dyn TenantRegistry, dbname: Option<&str>) -> Vec<Provider> {
    match dbname.map(str::trim).filter(|name| !name.is_empty()) {
        Some(tenant) => provider::list_enabled(registry, tenant).await,
        None => {
            warn!("SAML2: list_providers without dbname");
            Vec::new()
        }
    }
}

/// Complete the handshake and decide where the browser goes next.
pub async fn sign_in(registry: &dyn TenantRegistry, params: SignInParams) -> SignInRedirect {
    let Some(raw) = params
        .relay_state
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
    else {
        return SignInRedirect::SignupLanding;
    };

    let outcome = complete(registry, raw, params.saml_response.as_deref()).await;
    SignInRedirect::from(outcome)
}

async fn complete(registry: &dyn TenantRegistry, raw: &str, assertion: Option<&str>) -> SignInOutcome {
    let state = match RelayState::decode(raw) {
        Ok(state) => state,
        Err(err) => {
            warn!(error = %err, "SAML2: undecodable RelayState on sign-in");
            return SignInOutcome::ValidationError;
        }
    };

    match assertion::complete_sign_in(registry, &state, assertion).await {
        Ok(credentials) => SignInOutcome::Success {
            credentials,
            redirect_url: success_url(&state),
        },
        Err(SignInError::SignupDisabled) => SignInOutcome::SignupDisabled,
        Err(SignInError::AccessDenied) => SignInOutcome::AccessDenied,
        Err(SignInError::ValidationError) => SignInOutcome::ValidationError,
    }
}

/// Post-login target: the action wins over the menu, the root is the fallback.
fn success_url(state: &RelayState) -> String {
    if let Some(action) = state.action() {
        format!("/#action={}", encode_component(&action))
    } else if let Some(menu) = state.menu() {
        format!("/#menu_id={}", encode_component(&menu))
    } else {
        "/".to_string()
    }
}

fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::ProviderId;
    use crate::saml::test_support::{FakeRegistry, FakeTenant, UserOutcome, provider};
    use serde_json::json;

    fn registry(outcome: UserOutcome) -> FakeRegistry {
        FakeRegistry::new().with_tenant(
            FakeTenant::new("acme")
                .with_providers(vec![provider(1, "Okta", true, 1)])
                .with_user_outcome(outcome),
        )
    }

    fn params(state: &RelayState) -> anyhow::Result<SignInParams> {
        Ok(SignInParams {
            saml_response: Some("PHNhbWw+".to_string()),
            relay_state: Some(state.encode()?),
        })
    }

    #[tokio::test]
    async fn get_auth_request_with_bad_relaystate_is_null() {
        let registry = registry(UserOutcome::Success);
        assert_eq!(
            get_auth_request(&registry, Some("%%%")).await,
            AuthRequestResponse { auth_request: None }
        );
        assert_eq!(
            get_auth_request(&registry, None).await,
            AuthRequestResponse { auth_request: None }
        );
    }

    #[tokio::test]
    async fn get_auth_request_returns_artifact() -> anyhow::Result<()> {
        let registry = registry(UserOutcome::Success);
        let token = RelayState::new("acme", ProviderId(1)).encode()?;
        let response = get_auth_request(&registry, Some(&token)).await;
        assert_eq!(
            response.auth_request,
            Some(AuthRequestArtifact::new("https://idp.test/sso/1"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn list_providers_without_dbname_is_empty() {
        let registry = registry(UserOutcome::Success);
        assert!(list_providers(&registry, None).await.is_empty());
        assert!(list_providers(&registry, Some(" ")).await.is_empty());
        assert_eq!(list_providers(&registry, Some("acme")).await.len(), 1);
    }

    #[tokio::test]
    async fn sign_in_without_relay_state_lands_on_signup() {
        let registry = registry(UserOutcome::Success);
        let redirect = sign_in(
            &registry,
            SignInParams {
                saml_response: Some("PHNhbWw+".to_string()),
                relay_state: None,
            },
        )
        .await;
        assert!(matches!(redirect, SignInRedirect::SignupLanding));
        assert_eq!(redirect.url(), "/?type=signup");
        assert_eq!(registry.commits("acme"), 0);
    }

    #[tokio::test]
    async fn sign_in_with_blank_relay_state_lands_on_signup() {
        let registry = registry(UserOutcome::Success);
        for blank in ["", "  "] {
            let redirect = sign_in(
                &registry,
                SignInParams {
                    saml_response: Some("PHNhbWw+".to_string()),
                    relay_state: Some(blank.to_string()),
                },
            )
            .await;
            assert!(matches!(redirect, SignInRedirect::SignupLanding));
            assert_eq!(redirect.url(), SIGNUP_LANDING_URL);
        }
        assert_eq!(registry.commits("acme"), 0);
    }

    #[tokio::test]
    async fn sign_in_success_prefers_action() -> anyhow::Result<()> {
        let registry = registry(UserOutcome::Success);
        let state = RelayState::new("acme", ProviderId(1))
            .with_action(42)
            .with_menu(7);

        let redirect = sign_in(&registry, params(&state)?).await;
        match redirect {
            SignInRedirect::Session { credentials, url } => {
                assert_eq!(url, "/#action=42");
                assert_eq!(credentials.login, "alice@acme.test");
            }
            other => anyhow::bail!("unexpected redirect: {other:?}"),
        }
        assert_eq!(registry.commits("acme"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_success_falls_back_to_menu_then_root() -> anyhow::Result<()> {
        let registry = registry(UserOutcome::Success);

        let menu = RelayState::new("acme", ProviderId(1)).with_menu(7);
        let redirect = sign_in(&registry, params(&menu)?).await;
        assert!(matches!(redirect, SignInRedirect::Session { .. }));
        assert_eq!(redirect.url(), "/#menu_id=7");

        let falsy = RelayState::new("acme", ProviderId(1))
            .with_action(json!(false))
            .with_menu(json!(""));
        let redirect = sign_in(&registry, params(&falsy)?).await;
        assert_eq!(redirect.url(), "/");
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_encodes_navigation_values() -> anyhow::Result<()> {
        let registry = registry(UserOutcome::Success);
        let state = RelayState::new("acme", ProviderId(1)).with_action("sale.order&x=1");
        let redirect = sign_in(&registry, params(&state)?).await;
        assert_eq!(redirect.url(), "/#action=sale.order%26x%3D1");
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_failures_map_to_coded_redirects() -> anyhow::Result<()> {
        let state = RelayState::new("acme", ProviderId(1));

        let redirect = sign_in(&registry(UserOutcome::SignupDisabled), params(&state)?).await;
        assert!(matches!(redirect, SignInRedirect::RefreshCookie { .. }));
        assert_eq!(redirect.url(), "/#action=login&saml_error=1");

        let redirect = sign_in(&registry(UserOutcome::Internal), params(&state)?).await;
        assert!(matches!(redirect, SignInRedirect::RefreshCookie { .. }));
        assert_eq!(redirect.url(), "/#action=login&saml_error=2");

        let redirect = sign_in(&registry(UserOutcome::AccessDenied), params(&state)?).await;
        assert!(matches!(redirect, SignInRedirect::WithoutCookie { .. }));
        assert_eq!(redirect.url(), "/#action=login&saml_error=3");
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_with_malformed_relay_state_is_validation_error() {
        let registry = registry(UserOutcome::Success);
        let redirect = sign_in(
            &registry,
            SignInParams {
                saml_response: Some("PHNhbWw+".to_string()),
                relay_state: Some("garbage!".to_string()),
            },
        )
        .await;
        assert_eq!(redirect.url(), VALIDATION_ERROR_URL);
        assert_eq!(registry.commits("acme"), 0);
    }
}
