//! In-memory collaborators for unit tests.

use anyhow::anyhow;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use super::provider::{Provider, ProviderFilter, ProviderId};
use super::registry::{
    BoxFuture, Credentials, Cursor, ModelError, ProviderModel, RegistryError, RegistryHandle,
    SamlAuthError, TenantRegistry, UserModel,
};
use super::relay_state::{Context, RelayState};
use super::request::AuthRequestArtifact;

pub(crate) fn provider(id: i64, name: &str, enabled: bool, sequence: i32) -> Provider {
    Provider {
        id: ProviderId(id),
        name: name.to_string(),
        enabled,
        css_class: "fa fa-fw fa-sign-in text-primary".to_string(),
        body: format!("Log in with {name}"),
        sequence,
    }
}

/// What the fake user model answers to every assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UserOutcome {
    Success,
    SignupDisabled,
    AccessDenied,
    Internal,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeTenant {
    name: String,
    providers: Vec<Provider>,
    provider_model: bool,
    user_model: bool,
    outcome: UserOutcome,
    fail_cursor: bool,
    fail_search: bool,
    fail_auth_request: bool,
    fail_commit: bool,
    commits: Arc<AtomicUsize>,
}

impl FakeTenant {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            providers: Vec::new(),
            provider_model: true,
            user_model: true,
            outcome: UserOutcome::Success,
            fail_cursor: false,
            fail_search: false,
            fail_auth_request: false,
            fail_commit: false,
            commits: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_providers(mut self, providers: Vec<Provider>) -> Self {
        self.providers = providers;
        self
    }

    pub(crate) fn with_user_outcome(mut self, outcome: UserOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub(crate) fn without_provider_model(mut self) -> Self {
        self.provider_model = false;
        self
    }

    pub(crate) fn without_user_model(mut self) -> Self {
        self.user_model = false;
        self
    }

    pub(crate) fn failing_cursor(mut self) -> Self {
        self.fail_cursor = true;
        self
    }

    pub(crate) fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub(crate) fn failing_auth_request(mut self) -> Self {
        self.fail_auth_request = true;
        self
    }

    pub(crate) fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }
}

impl RegistryHandle for FakeTenant {
    fn tenant(&self) -> &str {
        &self.name
    }

    fn cursor(&self) -> BoxFuture<'_, anyhow::Result<Box<dyn Cursor>>> {
        Box::pin(async move {
            if self.fail_cursor {
                return Err(anyhow!("connection refused"));
            }
            let providers = self.provider_model.then(|| FakeProviders {
                providers: self.providers.clone(),
                fail_search: self.fail_search,
                fail_auth_request: self.fail_auth_request,
            });
            let users = self.user_model.then(|| FakeUsers {
                tenant: self.name.clone(),
                outcome: self.outcome,
            });
            let cursor: Box<dyn Cursor> = Box::new(FakeCursor {
                providers,
                users,
                fail_commit: self.fail_commit,
                commits: Arc::clone(&self.commits),
            });
            Ok(cursor)
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeRegistry {
    tenants: HashMap<String, Arc<FakeTenant>>,
}

impl FakeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_tenant(mut self, tenant: FakeTenant) -> Self {
        self.tenants.insert(tenant.name.clone(), Arc::new(tenant));
        self
    }

    /// Number of committed cursors for `tenant`.
    pub(crate) fn commits(&self, tenant: &str) -> usize {
        self.tenants
            .get(tenant)
            .map_or(0, |tenant| tenant.commits.load(Ordering::SeqCst))
    }
}

impl TenantRegistry for FakeRegistry {
    fn resolve<'a>(
        &'a self,
        tenant: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn RegistryHandle>, RegistryError>> {
        Box::pin(async move {
            self.tenants
                .get(tenant)
                .map(|found| Arc::clone(found) as Arc<dyn RegistryHandle>)
                .ok_or_else(|| RegistryError::Unavailable(tenant.to_string()))
        })
    }
}

struct FakeCursor {
    providers: Option<FakeProviders>,
    users: Option<FakeUsers>,
    fail_commit: bool,
    commits: Arc<AtomicUsize>,
}

impl Cursor for FakeCursor {
    fn providers(&mut self) -> Option<&mut dyn ProviderModel> {
        self.providers
            .as_mut()
            .map(|model| model as &mut dyn ProviderModel)
    }

    fn users(&mut self) -> Option<&mut dyn UserModel> {
        self.users.as_mut().map(|model| model as &mut dyn UserModel)
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            if self.fail_commit {
                return Err(anyhow!("could not serialize access"));
            }
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

struct FakeProviders {
    providers: Vec<Provider>,
    fail_search: bool,
    fail_auth_request: bool,
}

impl ProviderModel for FakeProviders {
    fn get_auth_request<'a>(
        &'a mut self,
        provider_id: ProviderId,
        _state: &'a RelayState,
    ) -> BoxFuture<'a, Result<AuthRequestArtifact, ModelError>> {
        Box::pin(async move {
            if self.fail_auth_request {
                return Err(ModelError::Storage(anyhow!("idp metadata unavailable")));
            }
            if self.providers.iter().any(|p| p.id == provider_id) {
                Ok(AuthRequestArtifact::new(format!(
                    "https://idp.test/sso/{provider_id}"
                )))
            } else {
                Err(ModelError::NotFound(provider_id))
            }
        })
    }

    // returns everything unsorted; the directory filters and orders
    fn search_read<'a>(
        &'a mut self,
        _filter: &'a ProviderFilter,
    ) -> BoxFuture<'a, Result<Vec<Provider>, ModelError>> {
        Box::pin(async move {
            if self.fail_search {
                return Err(ModelError::Storage(anyhow!("relation does not exist")));
            }
            Ok(self.providers.clone())
        })
    }

    fn read(
        &mut self,
        provider_id: ProviderId,
    ) -> BoxFuture<'_, Result<Option<Provider>, ModelError>> {
        Box::pin(async move {
            Ok(self
                .providers
                .iter()
                .find(|p| p.id == provider_id)
                .cloned())
        })
    }
}

struct FakeUsers {
    tenant: String,
    outcome: UserOutcome,
}

impl UserModel for FakeUsers {
    fn authenticate_via_saml<'a>(
        &'a mut self,
        _provider_id: ProviderId,
        _assertion: &'a str,
        _context: &'a Context,
    ) -> BoxFuture<'a, Result<Credentials, SamlAuthError>> {
        Box::pin(async move {
            match self.outcome {
                UserOutcome::Success => Ok(Credentials {
                    tenant: self.tenant.clone(),
                    login: format!("alice@{}.test", self.tenant),
                    session_token: SecretString::from("fake-session-token"),
                }),
                UserOutcome::SignupDisabled => Err(SamlAuthError::SignupDisabled),
                UserOutcome::AccessDenied => {
                    Err(SamlAuthError::AccessDenied("issuer mismatch".to_string()))
                }
                UserOutcome::Internal => Err(SamlAuthError::Internal(anyhow!("xml parse error"))),
            }
        })
    }
}
