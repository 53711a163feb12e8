use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::storage::verifier::MAX_CLOCK_SKEW_SECONDS;

pub const ARG_TENANTS: &str = "tenants";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_SAML_SIGNUP: &str = "saml-signup";
pub const ARG_SAML_CLOCK_SKEW_SECONDS: &str = "saml-clock-skew-seconds";
pub const ARG_DB_MAX_CONNECTIONS: &str = "db-max-connections";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TENANTS)
                .long(ARG_TENANTS)
                .help("Comma separated tenant (database) names to serve; empty serves any")
                .env("SAMLFLOW_TENANTS")
                .value_delimiter(',')
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, decides whether session cookies are Secure")
                .env("SAMLFLOW_FRONTEND_BASE_URL")
                .default_value("https://localhost"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("SAMLFLOW_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SAML_SIGNUP)
                .long(ARG_SAML_SIGNUP)
                .help("Provision unknown SAML users on first sign-in")
                .env("SAMLFLOW_SAML_SIGNUP")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_SAML_CLOCK_SKEW_SECONDS)
                .long(ARG_SAML_CLOCK_SKEW_SECONDS)
                .help("Allowed clock skew when checking assertion validity windows")
                .env("SAMLFLOW_SAML_CLOCK_SKEW_SECONDS")
                .default_value("180")
                .value_parser(clap::value_parser!(i64).range(0..=MAX_CLOCK_SKEW_SECONDS)),
        )
        .arg(
            Arg::new(ARG_DB_MAX_CONNECTIONS)
                .long(ARG_DB_MAX_CONNECTIONS)
                .help("Maximum pooled connections per tenant database")
                .env("SAMLFLOW_DB_MAX_CONNECTIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub tenants: Vec<String>,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub signup: bool,
    pub clock_skew_seconds: i64,
    pub max_connections: u32,
}

impl Options {
    /// # Errors
    /// Returns an error if a defaulted argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let tenants = matches
            .get_many::<String>(ARG_TENANTS)
            .map(|values| {
                values
                    .map(|tenant| tenant.trim().to_string())
                    .filter(|tenant| !tenant.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .context("missing required argument: --frontend-base-url")?;

        let session_ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .context("missing required argument: --session-ttl-seconds")?;

        let clock_skew_seconds = matches
            .get_one::<i64>(ARG_SAML_CLOCK_SKEW_SECONDS)
            .copied()
            .context("missing required argument: --saml-clock-skew-seconds")?;

        let max_connections = matches
            .get_one::<u32>(ARG_DB_MAX_CONNECTIONS)
            .copied()
            .context("missing required argument: --db-max-connections")?;

        Ok(Self {
            tenants,
            frontend_base_url,
            session_ttl_seconds,
            signup: matches.get_flag(ARG_SAML_SIGNUP),
            clock_skew_seconds,
            max_connections,
        })
    }
}
