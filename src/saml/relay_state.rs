//! Relay state codec.
//!
//! The relay state is a compact JSON object using the short keys understood
//! by the sign-in client:
//!
//! | key | field | required |
//! |-----|-------|----------|
//! | `d` | tenant (database) name | yes |
//! | `p` | provider id | yes |
//! | `c` | request context | no |
//! | `a` | action to open after login | no |
//! | `m` | menu to open after login | no |
//!
//! [`RelayState::encode`] emits the document as unpadded base64url, so the
//! token only contains `[A-Za-z0-9_-]`. [`RelayState::decode`] also accepts the
//! bare JSON document, which is what browser clients post when they build the
//! state themselves. Unknown keys survive a decode/encode cycle.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;
use thiserror::Error;

use super::provider::ProviderId;

/// Opaque request context forwarded to the provider and user models.
pub type Context = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty relay state")]
    Empty,
    #[error("relay state is not valid base64url")]
    Encoding,
    #[error("relay state is not a valid document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("relay state is missing required field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayState {
    #[serde(rename = "d")]
    tenant: String,
    #[serde(rename = "p")]
    provider: ProviderId,
    #[serde(rename = "c", skip_serializing_if = "BTreeMap::is_empty")]
    context: Context,
    #[serde(rename = "a", skip_serializing_if = "Option::is_none")]
    action: Option<Value>,
    #[serde(rename = "m", skip_serializing_if = "Option::is_none")]
    menu: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Decoding view: every field optional so missing keys are reported by name.
#[derive(Deserialize)]
struct WireState {
    #[serde(rename = "d", default)]
    tenant: Option<String>,
    #[serde(rename = "p", default)]
    provider: Option<ProviderId>,
    #[serde(rename = "c", default)]
    context: Option<Context>,
    #[serde(rename = "a", default)]
    action: Option<Value>,
    #[serde(rename = "m", default)]
    menu: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl RelayState {
    #[must_use]
    pub fn new(tenant: impl Into<String>, provider: ProviderId) -> Self {
        Self {
            tenant: tenant.into(),
            provider,
            context: Context::new(),
            action: None,
            menu: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: impl Into<Value>) -> Self {
        self.action = present(action.into());
        self
    }

    #[must_use]
    pub fn with_menu(mut self, menu: impl Into<Value>) -> Self {
        self.menu = present(menu.into());
        self
    }

    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    #[must_use]
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Action to open after login, when one was requested.
    #[must_use]
    pub fn action(&self) -> Option<String> {
        navigation_target(self.action.as_ref())
    }

    /// Menu to open after login, when one was requested.
    #[must_use]
    pub fn menu(&self) -> Option<String> {
        navigation_target(self.menu.as_ref())
    }

    /// Keys the codec does not know about, kept as received.
    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Serialize into the opaque token passed to the IdP.
    ///
    /// # Errors
    /// Returns an error if the context holds a value JSON cannot represent.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let document = serde_json::to_vec(self)?;
        Ok(Base64UrlUnpadded::encode_string(&document))
    }

    /// Parse a token produced by [`RelayState::encode`] or a bare JSON document.
    ///
    /// # Errors
    /// Returns [`DecodeError`] when the input is not a relay state document or
    /// lacks the tenant or provider.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DecodeError::Empty);
        }

        let document: Cow<'_, [u8]> = if trimmed.starts_with('{') {
            Cow::Borrowed(trimmed.as_bytes())
        } else {
            Cow::Owned(
                Base64UrlUnpadded::decode_vec(trimmed.trim_end_matches('='))
                    .map_err(|_| DecodeError::Encoding)?,
            )
        };

        let wire: WireState = serde_json::from_slice(&document)?;

        let tenant = wire
            .tenant
            .filter(|tenant| !tenant.trim().is_empty())
            .ok_or(DecodeError::MissingField("d"))?;
        let provider = wire.provider.ok_or(DecodeError::MissingField("p"))?;

        Ok(Self {
            tenant,
            provider,
            context: wire.context.unwrap_or_default(),
            action: wire.action,
            menu: wire.menu,
            extra: wire.extra,
        })
    }
}

/// `null` encodes the same as an absent key.
fn present(value: Value) -> Option<Value> {
    (!value.is_null()).then_some(value)
}

/// A navigation target counts only when truthy; `null`, `false`, `0` and
/// empty values mean "not requested".
fn navigation_target(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) if number.as_f64().is_some_and(|n| n == 0.0) => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Object(fields) if fields.is_empty() => None,
        other => Some(other.to_string()),
    }
}
