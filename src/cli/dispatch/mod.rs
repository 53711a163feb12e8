//! Map validated CLI arguments to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::saml;
use anyhow::{Context, Result, bail};
use url::Url;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let saml_opts = saml::Options::parse(matches)?;

    let frontend = Url::parse(&saml_opts.frontend_base_url)
        .context("invalid SAMLFLOW_FRONTEND_BASE_URL")?;
    if !matches!(frontend.scheme(), "http" | "https") {
        bail!("frontend base URL must be http or https");
    }

    Ok(Action::Server(Args {
        port,
        dsn,
        tenants: saml_opts.tenants,
        frontend_base_url: saml_opts.frontend_base_url,
        session_ttl_seconds: saml_opts.session_ttl_seconds,
        saml_signup: saml_opts.signup,
        saml_clock_skew_seconds: saml_opts.clock_skew_seconds,
        max_connections: saml_opts.max_connections,
    }))
}
