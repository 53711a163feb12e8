//! JSON request bodies: plain objects or JSON-RPC 2.0 calls.
//!
//! Browser clients call the JSON endpoints either with the parameters as a
//! plain object or wrapped in a JSON-RPC `call`. The reply mirrors the shape of
//! the request. A body that cannot be parsed is treated as if no parameter had
//! been sent.

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

#[derive(Deserialize)]
#[serde(untagged)]
enum Incoming<T> {
    Call {
        #[allow(dead_code)]
        jsonrpc: String,
        #[serde(default)]
        params: Option<T>,
        #[serde(default)]
        id: Value,
    },
    Plain(T),
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Reply {
    Plain,
    Envelope { id: Value },
}

#[derive(Serialize)]
struct Envelope<'a, R> {
    jsonrpc: &'static str,
    id: &'a Value,
    result: R,
}

impl Reply {
    pub(super) fn respond<R: Serialize>(&self, result: R) -> Response {
        match self {
            Self::Plain => Json(result).into_response(),
            Self::Envelope { id } => Json(Envelope {
                jsonrpc: "2.0",
                id,
                result,
            })
            .into_response(),
        }
    }
}

/// Parse a JSON body into the endpoint parameters and the reply shape.
pub(super) fn parse<T>(body: &[u8]) -> (T, Reply)
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return (T::default(), Reply::Plain);
    }

    match serde_json::from_slice::<Incoming<T>>(body) {
        Ok(Incoming::Call { params, id, .. }) => (params.unwrap_or_default(), Reply::Envelope { id }),
        Ok(Incoming::Plain(params)) => (params, Reply::Plain),
        Err(err) => {
            debug!(error = %err, "unparseable JSON body");
            // still answer in the envelope when the caller clearly spoke JSON-RPC
            let reply = serde_json::from_slice::<Value>(body)
                .ok()
                .filter(|value| value.get("jsonrpc").is_some())
                .map_or(Reply::Plain, |value| Reply::Envelope {
                    id: value.get("id").cloned().unwrap_or(Value::Null),
                });
            (T::default(), reply)
        }
    }
}
