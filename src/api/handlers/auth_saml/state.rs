//! SAML endpoint configuration and shared state.

use std::sync::Arc;

use crate::saml::TenantRegistry;

const DEFAULT_FRONTEND_BASE_URL: &str = "https://localhost";
const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;

#[derive(Clone, Debug)]
pub struct SamlConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
}

impl Default for SamlConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FRONTEND_BASE_URL.to_string())
    }
}

impl SamlConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    /// Cookies carry `Secure` only when the frontend is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// State shared by the `/auth_saml` handlers.
pub struct SamlState {
    config: SamlConfig,
    registry: Arc<dyn TenantRegistry>,
}

impl SamlState {
    #[must_use]
    pub fn new(config: SamlConfig, registry: Arc<dyn TenantRegistry>) -> Self {
        Self { config, registry }
    }

    #[must_use]
    pub fn config(&self) -> &SamlConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &dyn TenantRegistry {
        self.registry.as_ref()
    }
}
