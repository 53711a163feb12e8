//! Postgres implementation of the tenant collaborators.
//!
//! Each tenant is a database on one Postgres server; the expected tables are in
//! `sql/schema.sql`. A tenant without the `auth_saml_provider` table has no
//! provider model, and a tenant without the user tables cannot sign anyone in.

pub mod authn_request;
pub mod cursor;
mod providers;
pub mod registry;
mod users;
pub(crate) mod utils;
pub mod verifier;

pub use cursor::{Capabilities, PgCursor};
pub use registry::{PgHandle, PgTenantRegistry, TenantSettings};
pub use verifier::{AssertionError, AssertionVerifier, SamaelVerifier, VerifiedAssertion};
