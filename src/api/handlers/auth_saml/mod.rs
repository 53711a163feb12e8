//! `/auth_saml` endpoints.
//!
//! Flow:
//! - The login page calls `list_providers` to render one button per provider.
//! - Clicking a button calls `get_auth_request` with a relay state and sends
//!   the browser to the returned IdP URL.
//! - The IdP posts the `SAMLResponse` back to `signin`, which answers with a
//!   `303` to the application or to a coded error page.
//!
//! The JSON endpoints always answer `200`; failures degrade to `null` or `[]`.

pub mod fragment;
pub mod redirect;
mod rpc;
pub mod state;


use axum::{
    Extension, Form, Json, Router,
    body::Bytes,
    extract::{
        Query,
        rejection::{FormRejection, QueryRejection},
    },
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::saml::{self, AuthRequestResponse, Provider, SignInParams};

pub use state::{SamlConfig, SamlState};

#[derive(ToSchema, IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct GetAuthRequestParams {
    /// Encoded relay state naming the tenant and the provider.
    #[serde(default)]
    pub relaystate: Option<String>,
}

#[derive(ToSchema, IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ListProvidersParams {
    /// Tenant (database) name.
    #[serde(default)]
    pub dbname: Option<String>,
}

#[derive(IntoParams, Deserialize)]
#[into_params(parameter_in = Query)]
#[allow(dead_code)]
struct SignInQuery {
    #[serde(rename = "SAMLResponse")]
    saml_response: Option<String>,
    #[serde(rename = "RelayState")]
    relay_state: Option<String>,
}

#[must_use]
pub fn routes() -> Router {
    Router::new()
        .route(
            "/auth_saml/get_auth_request",
            get(get_auth_request).post(get_auth_request_json),
        )
        .route(
            "/auth_saml/list_providers",
            get(list_providers).post(list_providers_json),
        )
        .route(
            "/auth_saml/signin",
            get(signin)
                .post(signin_form)
                .layer(middleware::from_fn(fragment::promote_fragment)),
        )
}

#[utoipa::path(
    get,
    path = "/auth_saml/get_auth_request",
    params(GetAuthRequestParams),
    responses(
        (status = 200, description = "IdP request, or null when it cannot be built", body = AuthRequestResponse)
    ),
    tag = "auth_saml"
)]
pub async fn get_auth_request(
    state: Extension<Arc<SamlState>>,
    params: Result<Query<GetAuthRequestParams>, QueryRejection>,
) -> Json<AuthRequestResponse> {
    let params = params.map(|Query(params)| params).unwrap_or_default();
    Json(saml::get_auth_request(state.registry(), params.relaystate.as_deref()).await)
}

#[utoipa::path(
    post,
    path = "/auth_saml/get_auth_request",
    request_body(content = GetAuthRequestParams, description = "Plain object or JSON-RPC call"),
    responses(
        (status = 200, description = "IdP request, or null when it cannot be built", body = AuthRequestResponse)
    ),
    tag = "auth_saml"
)]
pub async fn get_auth_request_json(state: Extension<Arc<SamlState>>, body: Bytes) -> Response {
    let (params, reply) = rpc::parse::<GetAuthRequestParams>(&body);
    let response = saml::get_auth_request(state.registry(), params.relaystate.as_deref()).await;
    reply.respond(response)
}

#[utoipa::path(
    get,
    path = "/auth_saml/list_providers",
    params(ListProvidersParams),
    responses(
        (status = 200, description = "Enabled providers ordered by sequence", body = [Provider])
    ),
    tag = "auth_saml"
)]
pub async fn list_providers(
    state: Extension<Arc<SamlState>>,
    params: Result<Query<ListProvidersParams>, QueryRejection>,
) -> Json<Vec<Provider>> {
    let params = params.map(|Query(params)| params).unwrap_or_default();
    Json(saml::list_providers(state.registry(), params.dbname.as_deref()).await)
}

#[utoipa::path(
    post,
    path = "/auth_saml/list_providers",
    request_body(content = ListProvidersParams, description = "Plain object or JSON-RPC call"),
    responses(
        (status = 200, description = "Enabled providers ordered by sequence", body = [Provider])
    ),
    tag = "auth_saml"
)]
pub async fn list_providers_json(state: Extension<Arc<SamlState>>, body: Bytes) -> Response {
    let (params, reply) = rpc::parse::<ListProvidersParams>(&body);
    let providers = saml::list_providers(state.registry(), params.dbname.as_deref()).await;
    reply.respond(providers)
}

#[utoipa::path(
    get,
    path = "/auth_saml/signin",
    params(SignInQuery),
    responses(
        (status = 200, description = "Fragment bounce page when called without parameters", content_type = "text/html"),
        (status = 303, description = "Redirect to the application or to a coded login error")
    ),
    tag = "auth_saml"
)]
pub async fn signin(
    state: Extension<Arc<SamlState>>,
    headers: HeaderMap,
    params: Result<Query<SignInParams>, QueryRejection>,
) -> Response {
    let params = params.map(|Query(params)| params).unwrap_or_else(|err| {
        debug!(error = %err, "unparseable sign-in query");
        SignInParams::default()
    });
    complete(&state, &headers, params).await
}

#[utoipa::path(
    post,
    path = "/auth_saml/signin",
    request_body(content = String, content_type = "application/x-www-form-urlencoded", description = "SAMLResponse and RelayState (HTTP-POST binding)"),
    responses(
        (status = 303, description = "Redirect to the application or to a coded login error")
    ),
    tag = "auth_saml"
)]
pub async fn signin_form(
    state: Extension<Arc<SamlState>>,
    headers: HeaderMap,
    params: Result<Form<SignInParams>, FormRejection>,
) -> Response {
    let params = params.map(|Form(params)| params).unwrap_or_else(|err| {
        debug!(error = %err, "unparseable sign-in form");
        SignInParams::default()
    });
    complete(&state, &headers, params).await
}

async fn complete(state: &SamlState, headers: &HeaderMap, params: SignInParams) -> Response {
    let decision = saml::sign_in(state.registry(), params).await;
    redirect::respond(state.config(), headers, decision).into_response()
}
