//! Token and error helpers shared by the Postgres collaborators.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use once_cell::sync::Lazy;
use rand::{RngCore, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Create a new session token for the session cookie.
/// The raw value is only returned to set the cookie; the database stores a hash.
pub(crate) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a session token so raw values never touch the database.
pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Compiled once; `None` only if the pattern itself is broken.
static TENANT_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").ok());

/// Tenant names double as database names, so only a conservative charset is served.
pub(crate) fn valid_tenant_name(tenant: &str) -> bool {
    tenant.len() <= 63
        && TENANT_RE
            .as_ref()
            .is_some_and(|regex| regex.is_match(tenant))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23505")
}

/// `invalid_catalog_name`: the tenant database does not exist.
pub(crate) fn is_missing_database(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "3D000")
}

fn has_sqlstate(err: &sqlx::Error, state: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == state),
        _ => false,
    }
}
