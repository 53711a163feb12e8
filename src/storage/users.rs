//! SAML identity binding, signup and session issuance.

use anyhow::{Context, anyhow};
use secrecy::SecretString;
use serde_json::Value;
use sqlx::Row;
use tracing::{Instrument, info};
use uuid::Uuid;

use super::cursor::PgCursor;
use super::utils::{generate_session_token, hash_session_token, is_unique_violation};
use super::verifier::{AssertionError, MAX_CLOCK_SKEW_SECONDS, VerifiedAssertion};
use crate::saml::{
    BoxFuture, Context as RequestContext, Credentials, ProviderId, SamlAuthError, UserModel,
};

/// Replay rows are kept this long past their expiry. It must outlast the
/// largest clock skew, or an expired assertion could be accepted twice.
const REPLAY_RETENTION_SECONDS: i64 = 24 * 60 * 60;

const PURGE_EXPIRED_REPLAYS: &str = r"
    DELETE FROM saml_assertion_replay
    WHERE expires_at < NOW() - $1::bigint * INTERVAL '1 second'
";

struct BoundUser {
    id: Uuid,
    login: String,
    active: bool,
}

impl PgCursor {
    async fn purge_expired_replays(&mut self) -> anyhow::Result<u64> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = PURGE_EXPIRED_REPLAYS
        );
        let result = sqlx::query(PURGE_EXPIRED_REPLAYS)
            .bind(REPLAY_RETENTION_SECONDS)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to purge expired assertion ids")?;
        Ok(result.rows_affected())
    }

    async fn record_assertion(
        &mut self,
        provider_id: ProviderId,
        verified: &VerifiedAssertion,
    ) -> Result<(), SamlAuthError> {
        let purged = self.purge_expired_replays().await?;
        if purged > 0 {
            tracing::debug!(purged, "purged expired assertion ids");
        }

        let query = r"
            INSERT INTO saml_assertion_replay (provider_id, assertion_id, expires_at)
            VALUES ($1, $2, COALESCE($3, NOW() + INTERVAL '1 day'))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(provider_id.0)
            .bind(&verified.assertion_id)
            .bind(verified.not_on_or_after)
            .execute(&mut *self.tx)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(SamlAuthError::AccessDenied(format!(
                "assertion {} already used",
                verified.assertion_id
            ))),
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to record assertion")
                .into()),
        }
    }

    async fn lookup_bound_user(
        &mut self,
        provider_id: ProviderId,
        name_id: &str,
    ) -> anyhow::Result<Option<BoundUser>> {
        let query = r"
            SELECT u.id, u.login, u.active
            FROM user_saml_identities i
            JOIN users u ON u.id = i.user_id
            WHERE i.provider_id = $1 AND i.name_id = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(provider_id.0)
            .bind(name_id)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to lookup SAML identity")?;

        Ok(row.map(|row| BoundUser {
            id: row.get("id"),
            login: row.get("login"),
            active: row.get("active"),
        }))
    }

    /// Create a local account for `verified` and link it to the provider.
    async fn provision_user(
        &mut self,
        provider_id: ProviderId,
        verified: &VerifiedAssertion,
        context: &RequestContext,
    ) -> Result<BoundUser, SamlAuthError> {
        let lang = context.get("lang").and_then(Value::as_str);
        let tz = context.get("tz").and_then(Value::as_str);

        let query = r"
            INSERT INTO users (login, lang, tz)
            VALUES ($1, $2, $3)
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&verified.name_id)
            .bind(lang)
            .bind(tz)
            .fetch_one(&mut *self.tx)
            .instrument(span)
            .await;

        let user_id: Uuid = match row {
            Ok(row) => row.get("id"),
            // an unlinked local account already owns this login
            Err(err) if is_unique_violation(&err) => {
                return Err(SamlAuthError::AccessDenied(format!(
                    "login {} is bound to another account",
                    verified.name_id
                )));
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context("failed to insert user")
                    .into());
            }
        };

        let query = r"
            INSERT INTO user_saml_identities (user_id, provider_id, name_id, name_id_format)
            VALUES ($1, $2, $3, $4)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(provider_id.0)
            .bind(&verified.name_id)
            .bind(verified.name_id_format.as_deref())
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to link SAML identity")?;

        info!(tenant = %self.tenant, provider = %provider_id, user_id = %user_id, "SAML2: user provisioned");

        Ok(BoundUser {
            id: user_id,
            login: verified.name_id.clone(),
            active: true,
        })
    }

    async fn insert_session(&mut self, user_id: Uuid) -> anyhow::Result<String> {
        // Generate a random token, store only its hash, and return the raw value
        // so the caller can set the session cookie.
        let query = r"
            INSERT INTO user_sessions (user_id, session_hash, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );

        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(self.settings.session_ttl_seconds)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to insert session")?;

        Ok(token)
    }

    async fn authenticate(
        &mut self,
        provider_id: ProviderId,
        assertion: &str,
        context: &RequestContext,
    ) -> Result<Credentials, SamlAuthError> {
        let issuer = self
            .idp_entity_id(provider_id)
            .await?
            .ok_or_else(|| anyhow!("provider {provider_id} disappeared during sign-in"))?;

        let verified = self
            .settings
            .verifier
            .verify(assertion, &issuer)
            .map_err(|err| match err {
                AssertionError::Rejected(reason) => SamlAuthError::AccessDenied(reason),
                AssertionError::Malformed(detail) => {
                    SamlAuthError::Internal(anyhow!("malformed SAML response: {detail}"))
                }
            })?;

        self.record_assertion(provider_id, &verified).await?;

        let user = match self.lookup_bound_user(provider_id, &verified.name_id).await? {
            Some(user) => user,
            None if self.settings.signup => {
                self.provision_user(provider_id, &verified, context).await?
            }
            None => return Err(SamlAuthError::SignupDisabled),
        };

        if !user.active {
            return Err(SamlAuthError::AccessDenied(format!(
                "user {} is inactive",
                user.login
            )));
        }

        let token = self.insert_session(user.id).await?;

        Ok(Credentials {
            tenant: self.tenant.clone(),
            login: user.login,
            session_token: SecretString::from(token),
        })
    }
}

impl UserModel for PgCursor {
    fn authenticate_via_saml<'a>(
        &'a mut self,
        provider_id: ProviderId,
        assertion: &'a str,
        context: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Credentials, SamlAuthError>> {
        Box::pin(self.authenticate(provider_id, assertion, context))
    }
}
