use crate::{
    api::{self, SamlConfig, SamlState},
    cli::telemetry,
    saml::TenantRegistry,
    storage::{PgTenantRegistry, SamaelVerifier},
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub tenants: Vec<String>,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub saml_signup: bool,
    pub saml_clock_skew_seconds: i64,
    pub max_connections: u32,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the DSN is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let verifier = Arc::new(SamaelVerifier::new(args.saml_clock_skew_seconds));

    let registry = PgTenantRegistry::new(&args.dsn, verifier)
        .context("invalid database connection string")?
        .with_allowlist(args.tenants.iter().map(String::as_str))
        .with_signup(args.saml_signup)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_max_connections(args.max_connections);

    if args.tenants.is_empty() {
        debug!("no tenant allowlist configured, every database name is accepted");
    } else {
        info!(tenants = ?args.tenants, "tenant allowlist configured");
    }

    let config = SamlConfig::new(args.frontend_base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds);

    let registry: Arc<dyn TenantRegistry> = Arc::new(registry);
    let state = Arc::new(SamlState::new(config, registry));

    let result = api::new(args.port, state).await;

    telemetry::shutdown_tracer();

    result
}
