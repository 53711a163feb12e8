//! Redirect responses and session cookies.

use axum::{
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, InvalidHeaderValue, LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use tracing::error;

use super::state::SamlConfig;
use crate::saml::{
    Credentials, SignInRedirect,
    flow::{SIGNUP_LANDING_URL, VALIDATION_ERROR_URL},
};

pub const SESSION_COOKIE_NAME: &str = "samlflow_session";
pub const TENANT_COOKIE_NAME: &str = "samlflow_tenant";

/// What a plain redirect does with the caller's session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookiePolicy {
    /// Re-issue the session cookie the request carried, if any.
    Refresh(Option<String>),
    Untouched,
}

/// Render the sign-in decision into a `303 See Other`.
pub fn respond(config: &SamlConfig, headers: &HeaderMap, decision: SignInRedirect) -> Response {
    match decision {
        SignInRedirect::Session { credentials, url } => {
            redirect_with_session(config, &credentials, &url)
        }
        SignInRedirect::RefreshCookie { url } => redirect(
            config,
            &url,
            CookiePolicy::Refresh(session_token_from(headers)),
        ),
        SignInRedirect::WithoutCookie { url } => redirect(config, &url, CookiePolicy::Untouched),
        SignInRedirect::SignupLanding => redirect(config, SIGNUP_LANDING_URL, CookiePolicy::Untouched),
    }
}

/// Establish the session for `credentials` and redirect to `url`.
pub fn redirect_with_session(config: &SamlConfig, credentials: &Credentials, url: &str) -> Response {
    let cookies = session_cookie(config, credentials.session_token.expose_secret())
        .and_then(|session| {
            tenant_cookie(config, &credentials.tenant).map(|tenant| (session, tenant))
        });

    match cookies {
        Ok((session, tenant)) => {
            let mut headers = HeaderMap::new();
            headers.append(SET_COOKIE, session);
            headers.append(SET_COOKIE, tenant);
            see_other(url, headers)
        }
        Err(err) => {
            error!(tenant = %credentials.tenant, error = %err, "failed to build session cookie");
            see_other(VALIDATION_ERROR_URL, HeaderMap::new())
        }
    }
}

/// Redirect to `url`, applying `policy` to the session cookie.
pub fn redirect(config: &SamlConfig, url: &str, policy: CookiePolicy) -> Response {
    let mut headers = HeaderMap::new();
    if let CookiePolicy::Refresh(Some(token)) = policy {
        match session_cookie(config, &token) {
            Ok(cookie) => {
                headers.insert(SET_COOKIE, cookie);
            }
            Err(err) => error!(error = %err, "failed to refresh session cookie"),
        }
    }
    see_other(url, headers)
}

fn see_other(url: &str, mut headers: HeaderMap) -> Response {
    match HeaderValue::from_str(url) {
        Ok(location) => {
            headers.insert(LOCATION, location);
        }
        Err(err) => {
            error!(error = %err, "invalid redirect target");
            headers.insert(LOCATION, HeaderValue::from_static("/"));
        }
    }
    (StatusCode::SEE_OTHER, headers).into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
fn session_cookie(config: &SamlConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(config, SESSION_COOKIE_NAME, token)
}

fn tenant_cookie(config: &SamlConfig, tenant: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(config, TENANT_COOKIE_NAME, tenant)
}

fn cookie(config: &SamlConfig, name: &str, value: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn session_token_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            let val = val.trim();
            (key.trim() == SESSION_COOKIE_NAME && !val.is_empty()).then(|| val.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn credentials() -> Credentials {
        Credentials {
            tenant: "acme".to_string(),
            login: "alice".to_string(),
            session_token: SecretString::from("tok123"),
        }
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok().map(str::to_string))
            .collect()
    }

    #[test]
    fn session_redirect_sets_both_cookies() {
        let config = SamlConfig::new("https://app.example.com".to_string());
        let response = redirect_with_session(&config, &credentials(), "/#action=42");

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
            Some("/#action=42")
        );
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert_eq!(
            cookies[0],
            "samlflow_session=tok123; Path=/; HttpOnly; SameSite=Lax; Max-Age=43200; Secure"
        );
        assert!(cookies[1].starts_with("samlflow_tenant=acme;"));
    }

    #[test]
    fn plain_http_frontend_drops_secure_flag() {
        let config = SamlConfig::new("http://localhost:8080".to_string()).with_session_ttl_seconds(60);
        let response = redirect_with_session(&config, &credentials(), "/");
        let cookies = set_cookies(&response);
        assert_eq!(
            cookies[0],
            "samlflow_session=tok123; Path=/; HttpOnly; SameSite=Lax; Max-Age=60"
        );
    }

    #[test]
    fn refresh_reissues_existing_cookie_only() {
        let config = SamlConfig::default();

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("lang=en; samlflow_session=abc"));
        let token = session_token_from(&headers);
        assert_eq!(token.as_deref(), Some("abc"));

        let response = redirect(&config, "/x", CookiePolicy::Refresh(token));
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("samlflow_session=abc;"));

        let response = redirect(&config, "/x", CookiePolicy::Refresh(None));
        assert!(set_cookies(&response).is_empty());

        let response = redirect(&config, "/x", CookiePolicy::Untouched);
        assert!(set_cookies(&response).is_empty());
    }

    #[test]
    fn access_denied_never_sets_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("samlflow_session=abc"));
        let response = respond(
            &SamlConfig::default(),
            &headers,
            SignInRedirect::WithoutCookie {
                url: "/#action=login&saml_error=3".to_string(),
            },
        );
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(set_cookies(&response).is_empty());
    }

    #[test]
    fn unusable_tenant_falls_back_to_validation_error() {
        let mut credentials = credentials();
        credentials.tenant = "bad\ntenant".to_string();
        let response = redirect_with_session(&SamlConfig::default(), &credentials, "/");
        assert_eq!(
            response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
            Some(VALIDATION_ERROR_URL)
        );
        assert!(set_cookies(&response).is_empty());
    }
}
