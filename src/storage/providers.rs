//! `auth_saml_provider` access.

use anyhow::Context;
use sqlx::{Row, postgres::PgRow};
use tracing::Instrument;

use super::authn_request::{self, IdpEndpoint};
use super::cursor::PgCursor;
use crate::saml::{
    AuthRequestArtifact, BoxFuture, ModelError, Provider, ProviderFilter, ProviderId,
    ProviderModel, RelayState,
};

const PROVIDER_COLUMNS: &str = "id, name, enabled, css_class, body, sequence";

fn provider_from_row(row: &PgRow) -> Provider {
    Provider {
        id: ProviderId(row.get("id")),
        name: row.get("name"),
        enabled: row.get("enabled"),
        css_class: row.get("css_class"),
        body: row.get("body"),
        sequence: row.get("sequence"),
    }
}

impl PgCursor {
    /// The IdP entity id that must issue assertions for `provider_id`.
    pub(super) async fn idp_entity_id(
        &mut self,
        provider_id: ProviderId,
    ) -> anyhow::Result<Option<String>> {
        let query = "SELECT idp_entity_id FROM auth_saml_provider WHERE id = $1 AND enabled";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(provider_id.0)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to lookup provider issuer")?;

        Ok(row.map(|row| row.get("idp_entity_id")))
    }
}

impl ProviderModel for PgCursor {
    fn get_auth_request<'a>(
        &'a mut self,
        provider_id: ProviderId,
        state: &'a RelayState,
    ) -> BoxFuture<'a, Result<AuthRequestArtifact, ModelError>> {
        Box::pin(async move {
            let query = r"
                SELECT idp_sso_url, sp_entity_id, sp_acs_url, name_id_format
                FROM auth_saml_provider
                WHERE id = $1 AND enabled
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(provider_id.0)
                .fetch_optional(&mut *self.tx)
                .instrument(span)
                .await
                .context("failed to load provider endpoint")?
                .ok_or(ModelError::NotFound(provider_id))?;

            let endpoint = IdpEndpoint {
                sso_url: row.get("idp_sso_url"),
                sp_entity_id: row.get("sp_entity_id"),
                acs_url: row.get("sp_acs_url"),
                name_id_format: row.get("name_id_format"),
            };

            let url = authn_request::redirect_url(&endpoint, state)?;
            Ok(AuthRequestArtifact::new(url))
        })
    }

    fn search_read<'a>(
        &'a mut self,
        filter: &'a ProviderFilter,
    ) -> BoxFuture<'a, Result<Vec<Provider>, ModelError>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {PROVIDER_COLUMNS} FROM auth_saml_provider \
                 WHERE ($1::boolean IS NULL OR enabled = $1) ORDER BY sequence, id"
            );
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = %query
            );
            let rows = sqlx::query(&query)
                .bind(filter.enabled)
                .fetch_all(&mut *self.tx)
                .instrument(span)
                .await
                .context("failed to list providers")?;

            Ok(rows.iter().map(provider_from_row).collect())
        })
    }

    fn read(
        &mut self,
        provider_id: ProviderId,
    ) -> BoxFuture<'_, Result<Option<Provider>, ModelError>> {
        Box::pin(async move {
            let query = format!("SELECT {PROVIDER_COLUMNS} FROM auth_saml_provider WHERE id = $1");
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = %query
            );
            let row = sqlx::query(&query)
                .bind(provider_id.0)
                .fetch_optional(&mut *self.tx)
                .instrument(span)
                .await
                .context("failed to read provider")?;

            Ok(row.as_ref().map(provider_from_row))
        })
    }
}
