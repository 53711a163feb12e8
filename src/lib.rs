//! # Samlflow (SAML single sign-on for multi-tenant applications)
//!
//! `samlflow` mediates SAML-based single sign-on: it enumerates the identity
//! providers configured for a tenant, builds the provider specific
//! authentication request, and validates the `SAMLResponse` the IdP posts back
//! before issuing an application session.
//!
//! ## Relay State
//!
//! Every handshake carries an opaque `RelayState` token holding the tenant, the
//! provider id, an optional request context and the post-login navigation
//! target. The token travels through the IdP untouched; nothing about an
//! in-flight handshake is kept in process memory.
//!
//! ## Tenants
//!
//! Each tenant is one Postgres database. The [`saml::TenantRegistry`] seam
//! resolves a tenant name to a handle able to open a scoped transaction; the
//! transaction is committed only when a sign-in succeeds.
//!
//! ## Error exposure
//!
//! The listing and request-building endpoints never fail: errors degrade to an
//! empty list or a `null` request. The sign-in callback exposes exactly three
//! coarse error codes in its redirect fragment (`saml_error=1|2|3`).

pub mod api;
pub mod cli;
pub mod saml;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
