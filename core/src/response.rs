//! The normalized response envelope every client call resolves to.
//!
//! # Design
//! The backend wraps every body as `{ data?, errors?, meta? }`. `ApiResponse`
//! keeps those three parts plus the raw body and the HTTP status, and is
//! produced for every outcome: success, HTTP error, transport failure, and
//! client-side failure. Callers that prefer `Result` use `into_result` or
//! `error_for_status`.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

pub const NETWORK_ERROR_TITLE: &str = "Network Error";
pub const UNKNOWN_ERROR_TITLE: &str = "Unknown error";

/// One structured error from the server's `errors` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Accepts both `"code": "invalid"` and `"code": 422`.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

impl ErrorItem {
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            detail: Some(detail.into()),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Where a response came from. Lets `error_for_status` tell a synthesized
/// client failure from a genuine server 500.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Server,
    Transport,
    Internal,
}

/// Result of one API call. Never constructed by panicking paths.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    /// True iff the status is 2xx and the transport did not fail.
    pub ok: bool,
    /// Raw HTTP status; 0 when no response was received.
    pub status: u16,
    /// Decoded `data` field, only when the server sent one.
    pub data: Option<T>,
    pub errors: Option<Vec<ErrorItem>>,
    pub meta: Option<Map<String, Value>>,
    /// The body as received. Non-JSON bodies are kept as a JSON string.
    pub raw: Option<Value>,
    origin: Origin,
}

impl<T> ApiResponse<T> {
    /// Response for a call where nothing came back over the wire.
    pub fn network_error(detail: impl Into<String>) -> Self {
        Self::failure(0, ErrorItem::new(NETWORK_ERROR_TITLE, detail), Origin::Transport)
    }

    /// Response for a failure inside the client itself.
    pub fn unknown_error(detail: impl Into<String>) -> Self {
        Self::failure(500, ErrorItem::new(UNKNOWN_ERROR_TITLE, detail), Origin::Internal)
    }

    fn failure(status: u16, error: ErrorItem, origin: Origin) -> Self {
        Self {
            ok: false,
            status,
            data: None,
            errors: Some(vec![error]),
            meta: None,
            raw: None,
            origin,
        }
    }

    /// True when this response came from the server rather than being
    /// synthesized by the client.
    pub fn is_from_server(&self) -> bool {
        self.origin == Origin::Server
    }

    /// `errors[0].detail`, falling back to its title.
    pub fn first_error_message(&self) -> Option<&str> {
        let first = self.errors.as_ref()?.first()?;
        first.detail.as_deref().or(first.title.as_deref())
    }

    /// Message to show the user, or `fallback` when the server gave none.
    pub fn error_message_or(&self, fallback: &str) -> String {
        self.first_error_message().unwrap_or(fallback).to_string()
    }

    /// Numeric `meta` entry such as `total` or `page`.
    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        self.meta.as_ref()?.get(key)?.as_u64()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            ok: self.ok,
            status: self.status,
            data: self.data.map(f),
            errors: self.errors,
            meta: self.meta,
            raw: self.raw,
            origin: self.origin,
        }
    }

    /// `Ok(self)` for success responses, the tagged failure otherwise.
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.ok {
            return Ok(self);
        }
        let status = self.status;
        let detail = self.error_message_or("request failed");
        let errors = self.errors.unwrap_or_default();
        Err(match (self.origin, status) {
            (Origin::Transport, _) => ApiError::Network { detail },
            (Origin::Internal, _) => ApiError::Unexpected { detail },
            (Origin::Server, 401) => ApiError::Unauthorized { errors },
            (Origin::Server, s) if s >= 500 => ApiError::Server { status, errors },
            (Origin::Server, _) => ApiError::Client { status, errors },
        })
    }

    /// The decoded payload, or the tagged failure.
    pub fn into_result(self) -> Result<T, ApiError> {
        let response = self.error_for_status()?;
        let status = response.status;
        response.data.ok_or(ApiError::MissingData { status })
    }
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Normalize a server reply into the envelope shape.
    ///
    /// `data`, `errors` and `meta` are extracted for every status. A non-2xx
    /// reply without server errors gets one synthesized entry. A 2xx reply
    /// whose `data` does not decode as `T` becomes an unknown error.
    pub fn from_http(status: u16, body: &str) -> Self {
        let raw = parse_body(body);
        let ok = (200..300).contains(&status);
        let envelope = raw.as_ref().and_then(Value::as_object);

        let mut errors = envelope
            .and_then(|o| o.get("errors"))
            .and_then(|v| Vec::<ErrorItem>::deserialize(v).ok())
            .filter(|items| !items.is_empty());
        let meta = envelope
            .and_then(|o| o.get("meta"))
            .and_then(Value::as_object)
            .cloned();

        let data = match envelope.and_then(|o| o.get("data")) {
            None | Some(Value::Null) => None,
            Some(value) => match T::deserialize(value) {
                Ok(data) => Some(data),
                Err(err) if ok => {
                    let mut response =
                        Self::unknown_error(format!("failed to decode response data: {err}"));
                    response.meta = meta;
                    response.raw = raw;
                    return response;
                }
                Err(_) => None,
            },
        };

        if !ok && errors.is_none() {
            errors = Some(vec![synthesized_error(status)]);
        }

        Self {
            ok,
            status,
            data,
            errors,
            meta,
            raw,
            origin: Origin::Server,
        }
    }
}

fn parse_body(body: &str) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
}

fn synthesized_error(status: u16) -> ErrorItem {
    let title = if status >= 500 { "Server Error" } else { "Request failed" };
    ErrorItem::new(title, format!("Request failed with status code {status}"))
        .with_code(status.to_string())
}
