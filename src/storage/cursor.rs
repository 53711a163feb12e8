//! Scoped tenant transaction.
//!
//! A [`PgCursor`] owns one `sqlx` transaction. `sqlx` rolls the transaction
//! back when it is dropped, so only [`Cursor::commit`] makes writes durable.

use anyhow::Context;
use sqlx::{Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::Instrument;

use super::registry::TenantSettings;
use crate::saml::{BoxFuture, Cursor, ProviderModel, UserModel};

/// Which SAML models are installed in a tenant database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub providers: bool,
    pub users: bool,
}

impl Capabilities {
    pub(super) async fn detect(tx: &mut Transaction<'static, Postgres>) -> anyhow::Result<Self> {
        let query = r"
            SELECT
                to_regclass('auth_saml_provider') IS NOT NULL AS providers,
                (to_regclass('users') IS NOT NULL
                    AND to_regclass('user_saml_identities') IS NOT NULL
                    AND to_regclass('user_sessions') IS NOT NULL
                    AND to_regclass('saml_assertion_replay') IS NOT NULL) AS users
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .fetch_one(&mut **tx)
            .instrument(span)
            .await
            .context("failed to detect installed SAML models")?;

        Ok(Self {
            providers: row.get("providers"),
            users: row.get("users"),
        })
    }
}

pub struct PgCursor {
    pub(super) tenant: String,
    pub(super) tx: Transaction<'static, Postgres>,
    pub(super) capabilities: Capabilities,
    pub(super) settings: Arc<TenantSettings>,
}

impl PgCursor {
    pub(super) fn new(
        tenant: String,
        tx: Transaction<'static, Postgres>,
        capabilities: Capabilities,
        settings: Arc<TenantSettings>,
    ) -> Self {
        Self {
            tenant,
            tx,
            capabilities,
            settings,
        }
    }
}

impl Cursor for PgCursor {
    fn providers(&mut self) -> Option<&mut dyn ProviderModel> {
        if self.capabilities.providers {
            Some(self)
        } else {
            None
        }
    }

    fn users(&mut self) -> Option<&mut dyn UserModel> {
        if self.capabilities.users {
            Some(self)
        } else {
            None
        }
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>> {
        let Self { tenant, tx, .. } = *self;
        Box::pin(async move {
            tx.commit()
                .await
                .with_context(|| format!("commit transaction for tenant {tenant}"))
        })
    }
}
