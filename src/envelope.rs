//! JSON-RPC 1.0 envelopes.
//!
//! A request is `{"id": .., "method": .., "params": ..}`. A response carries either a
//! `result` or a non-null `error` object with `code` and `message`. A bare `null` body
//! is accepted as a successful call without a result.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Fault, ResponseFormatError};

/// Longest preview of a malformed payload carried in an error, in characters.
pub const PREVIEW_LIMIT: usize = 256;

/// Call parameters, either by position or by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    /// Encoded as a JSON array.
    Positional(Vec<Value>),
    /// Encoded as a JSON object.
    Named(Map<String, Value>),
}

impl Params {
    /// Combine positional and named arguments, which cannot both be present.
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>) -> Result<Self, Error> {
        match (args.is_empty(), kwargs.is_empty()) {
            (false, false) => Err(Error::InvalidParams(
                "cannot mix positional and named parameters",
            )),
            (true, false) => Ok(Params::Named(kwargs)),
            _ => Ok(Params::Positional(args)),
        }
    }

    /// Whether there are no arguments at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Params::Positional(args) => args.is_empty(),
            Params::Named(kwargs) => kwargs.is_empty(),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::Positional(Vec::new())
    }
}

impl From<Vec<Value>> for Params {
    fn from(args: Vec<Value>) -> Self {
        Params::Positional(args)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(kwargs: Map<String, Value>) -> Self {
        Params::Named(kwargs)
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::default()
    }
}

impl TryFrom<Value> for Params {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(args) => Ok(Params::Positional(args)),
            Value::Object(kwargs) => Ok(Params::Named(kwargs)),
            Value::Null => Ok(Params::default()),
            _ => Err(Error::InvalidParams("params must be an array or an object")),
        }
    }
}

/// A single JSON-RPC request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Request id, unique within one client.
    pub id: u64,
    /// Method name, possibly dot-qualified.
    pub method: String,
    /// Call parameters.
    pub params: Params,
}

impl RequestEnvelope {
    /// Create a request envelope.
    pub fn new(id: u64, method: impl Into<String>, params: Params) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Serialize to a request body.
    pub fn to_bytes(&self) -> Result<Bytes, Error> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(Error::Encode)
    }
}

/// Decode a response body for a call to `method`.
pub fn decode_response(method: &str, body: &[u8]) -> Result<Value, Error> {
    let value: Value = serde_json::from_slice(body).map_err(ResponseFormatError::Json)?;

    let mut response = match value {
        Value::Null => return Ok(Value::Null),
        Value::Object(response) => response,
        other => return Err(malformed(method, &other).into()),
    };

    match response.remove("error") {
        None | Some(Value::Null) => {}
        Some(error) => return Err(fault(method, error)?.into()),
    }

    match response.remove("result") {
        Some(result) => Ok(result),
        None => Err(malformed(method, &Value::Object(response)).into()),
    }
}

fn fault(method: &str, error: Value) -> Result<Fault, ResponseFormatError> {
    let code = error.get("code").and_then(Value::as_i64);
    let message = error.get("message").and_then(Value::as_str);
    match (code, message) {
        (Some(code), Some(message)) => Ok(Fault {
            code,
            message: message.to_owned(),
        }),
        _ => Err(malformed(method, &error)),
    }
}

fn malformed(method: &str, payload: &Value) -> ResponseFormatError {
    ResponseFormatError::Malformed {
        method: method.to_owned(),
        preview: preview(&payload.to_string()),
    }
}

/// Truncate `text` to at most [`PREVIEW_LIMIT`] characters, marking the cut.
pub(crate) fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_LIMIT {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(PREVIEW_LIMIT - 3).collect();
    out.push_str("...");
    out
}
