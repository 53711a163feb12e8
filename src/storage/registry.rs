//! Tenant registry backed by one Postgres database per tenant.

use anyhow::Context;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;
use tracing::{Instrument, debug, info_span};
use url::Url;

use super::cursor::{Capabilities, PgCursor};
use super::utils::{is_missing_database, valid_tenant_name};
use super::verifier::AssertionVerifier;
use crate::saml::{BoxFuture, Cursor, RegistryError, RegistryHandle, TenantRegistry};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;

/// Behaviour shared by every tenant cursor.
#[derive(Clone)]
pub struct TenantSettings {
    pub signup: bool,
    pub session_ttl_seconds: i64,
    pub verifier: Arc<dyn AssertionVerifier>,
}

pub struct PgTenantRegistry {
    base_url: Url,
    allowlist: Option<HashSet<String>>,
    max_connections: u32,
    settings: Arc<TenantSettings>,
    pools: RwLock<HashMap<String, PgPool>>,
}

impl PgTenantRegistry {
    /// `dsn` names the server; its database path is replaced by the tenant name.
    ///
    /// # Errors
    /// Returns an error if `dsn` is not a URL.
    pub fn new(dsn: &str, verifier: Arc<dyn AssertionVerifier>) -> anyhow::Result<Self> {
        let base_url = Url::parse(dsn).context("invalid Postgres DSN")?;
        Ok(Self {
            base_url,
            allowlist: None,
            max_connections: 5,
            settings: Arc::new(TenantSettings {
                signup: false,
                session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
                verifier,
            }),
            pools: RwLock::new(HashMap::new()),
        })
    }

    /// Only serve the named tenants. An empty list serves every valid name.
    #[must_use]
    pub fn with_allowlist<I, S>(mut self, tenants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tenants: HashSet<String> = tenants.into_iter().map(Into::into).collect();
        self.allowlist = (!tenants.is_empty()).then_some(tenants);
        self
    }

    #[must_use]
    pub fn with_signup(mut self, signup: bool) -> Self {
        self.settings_mut().signup = signup;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, ttl: i64) -> Self {
        self.settings_mut().session_ttl_seconds = ttl;
        self
    }

    #[must_use]
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    fn settings_mut(&mut self) -> &mut TenantSettings {
        Arc::make_mut(&mut self.settings)
    }

    fn check_tenant(&self, tenant: &str) -> Result<(), RegistryError> {
        if !valid_tenant_name(tenant) {
            return Err(RegistryError::Unavailable(format!(
                "invalid tenant name {tenant:?}"
            )));
        }
        if let Some(allowlist) = &self.allowlist {
            if !allowlist.contains(tenant) {
                return Err(RegistryError::Unavailable(format!(
                    "tenant {tenant:?} is not served"
                )));
            }
        }
        Ok(())
    }

    fn tenant_url(&self, tenant: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("/{tenant}"));
        url
    }

    async fn pool(&self, tenant: &str) -> Result<PgPool, RegistryError> {
        if let Some(pool) = self.pools.read().await.get(tenant) {
            return Ok(pool.clone());
        }

        let span = info_span!("db.connect", db.system = "postgresql", db.name = %tenant);
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(self.tenant_url(tenant).as_str())
            .instrument(span)
            .await
            .map_err(|err| {
                if is_missing_database(&err) {
                    RegistryError::Unavailable(format!("tenant {tenant:?} has no database"))
                } else {
                    RegistryError::Storage(
                        anyhow::Error::new(err).context("failed to connect tenant database"),
                    )
                }
            })?;

        debug!(tenant = %tenant, "tenant pool created");

        let mut pools = self.pools.write().await;
        Ok(pools.entry(tenant.to_string()).or_insert(pool).clone())
    }
}

impl TenantRegistry for PgTenantRegistry {
    fn resolve<'a>(
        &'a self,
        tenant: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn RegistryHandle>, RegistryError>> {
        Box::pin(async move {
            self.check_tenant(tenant)?;
            let pool = self.pool(tenant).await?;
            let handle: Arc<dyn RegistryHandle> = Arc::new(PgHandle {
                tenant: tenant.to_string(),
                pool,
                settings: Arc::clone(&self.settings),
            });
            Ok(handle)
        })
    }
}

pub struct PgHandle {
    tenant: String,
    pool: PgPool,
    settings: Arc<TenantSettings>,
}

impl RegistryHandle for PgHandle {
    fn tenant(&self) -> &str {
        &self.tenant
    }

    fn cursor(&self) -> BoxFuture<'_, anyhow::Result<Box<dyn Cursor>>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .context("begin tenant transaction")?;
            let capabilities = Capabilities::detect(&mut tx).await?;
            let cursor: Box<dyn Cursor> = Box::new(PgCursor::new(
                self.tenant.clone(),
                tx,
                capabilities,
                Arc::clone(&self.settings),
            ));
            Ok(cursor)
        })
    }
}
