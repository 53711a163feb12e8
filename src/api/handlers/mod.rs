//! HTTP handlers.

pub mod auth_saml;
pub mod health;
pub mod root;
