//! Unified client error model and mapping helpers.
//! Every failure the gateway, session layer or query coordinator can produce is one
//! of these variants. Errors are `Clone` so a single failed fetch can be handed to
//! every caller that was waiting on the same query key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiError {
    /// No response reached the client.
    Transport { code: String, message: String },
    Unauthorized { code: String, message: String },
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    /// Any other 4xx, typically 400/422 from request validation.
    Validation { code: String, message: String, status: u16 },
    Server { code: String, message: String, status: u16 },
    Decode { code: String, message: String },
    Storage { code: String, message: String },
    Config { code: String, message: String },
}

impl ApiError {
    pub fn code_str(&self) -> &str {
        match self {
            ApiError::Transport { code, .. }
            | ApiError::Unauthorized { code, .. }
            | ApiError::Forbidden { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::Conflict { code, .. }
            | ApiError::Validation { code, .. }
            | ApiError::Server { code, .. }
            | ApiError::Decode { code, .. }
            | ApiError::Storage { code, .. }
            | ApiError::Config { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Transport { message, .. }
            | ApiError::Unauthorized { message, .. }
            | ApiError::Forbidden { message, .. }
            | ApiError::NotFound { message, .. }
            | ApiError::Conflict { message, .. }
            | ApiError::Validation { message, .. }
            | ApiError::Server { message, .. }
            | ApiError::Decode { message, .. }
            | ApiError::Storage { message, .. }
            | ApiError::Config { message, .. } => message.as_str(),
        }
    }

    pub fn transport<S: Into<String>>(code: S, msg: S) -> Self { ApiError::Transport { code: code.into(), message: msg.into() } }
    pub fn unauthorized<S: Into<String>>(code: S, msg: S) -> Self { ApiError::Unauthorized { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { ApiError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { ApiError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { ApiError::Conflict { code: code.into(), message: msg.into() } }
    pub fn validation<S: Into<String>>(code: S, msg: S, status: u16) -> Self { ApiError::Validation { code: code.into(), message: msg.into(), status } }
    pub fn server<S: Into<String>>(code: S, msg: S, status: u16) -> Self { ApiError::Server { code: code.into(), message: msg.into(), status } }
    pub fn decode<S: Into<String>>(code: S, msg: S) -> Self { ApiError::Decode { code: code.into(), message: msg.into() } }
    pub fn storage<S: Into<String>>(code: S, msg: S) -> Self { ApiError::Storage { code: code.into(), message: msg.into() } }
    pub fn config<S: Into<String>>(code: S, msg: S) -> Self { ApiError::Config { code: code.into(), message: msg.into() } }

    /// Classify a non-success backend response. The FastAPI `{"detail": ...}` envelope is
    /// unwrapped when present; otherwise the raw body text is used.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = detail_message(body).unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() { format!("HTTP {}", status) } else { trimmed.to_string() }
        });
        match status {
            401 => ApiError::Unauthorized { code: "unauthorized".into(), message },
            403 => ApiError::Forbidden { code: "forbidden".into(), message },
            404 => ApiError::NotFound { code: "not_found".into(), message },
            409 => ApiError::Conflict { code: "conflict".into(), message },
            400..=499 => ApiError::Validation { code: "validation".into(), message, status },
            _ => ApiError::Server { code: "server_error".into(), message, status },
        }
    }

    /// HTTP status this error was derived from, if it came from a backend response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::Conflict { .. } => Some(409),
            ApiError::Validation { status, .. } | ApiError::Server { status, .. } => Some(*status),
            ApiError::Transport { .. }
            | ApiError::Decode { .. }
            | ApiError::Storage { .. }
            | ApiError::Config { .. } => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool { matches!(self, ApiError::Unauthorized { .. }) }

    /// Only transport failures are worth retrying as-is.
    pub fn is_retryable(&self) -> bool { matches!(self, ApiError::Transport { .. }) }

    /// Reason suitable for showing to a person at the login prompt or on a screen.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized { .. } => "Incorrect username or password".to_string(),
            ApiError::Transport { .. } => "Cannot reach the server, check the connection".to_string(),
            ApiError::Server { .. } => "The server failed to process the request".to_string(),
            ApiError::Forbidden { .. } => "Insufficient permissions".to_string(),
            other => other.message().to_string(),
        }
    }
}

fn detail_message(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    match v.get("detail")? {
        Value::String(s) => Some(s.clone()),
        // request validation errors: [{"loc": [...], "msg": "...", ...}, ...]
        Value::Array(items) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(|it| {
                    let msg = it.get("msg").and_then(|m| m.as_str())?;
                    let loc = it
                        .get("loc")
                        .and_then(|l| l.as_array())
                        .map(|l| l.iter().map(|p| p.as_str().map(str::to_string).unwrap_or_else(|| p.to_string())).collect::<Vec<_>>().join("."));
                    Some(match loc { Some(l) if !l.is_empty() => format!("{}: {}", l, msg), _ => msg.to_string() })
                })
                .collect();
            if msgs.is_empty() { None } else { Some(msgs.join("; ")) }
        }
        other => Some(other.to_string()),
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ApiError::Decode { code: "decode_error".into(), message: err.to_string() };
        }
        if err.is_builder() {
            return ApiError::Config { code: "bad_request".into(), message: err.to_string() };
        }
        ApiError::Transport { code: "transport".into(), message: err.to_string() }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode { code: "decode_error".into(), message: err.to_string() }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Storage { code: "io".into(), message: err.to_string() }
    }
}
