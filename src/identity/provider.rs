use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::session::SessionContext;
use crate::error::ApiError;
use crate::gateway::{Gateway, RequestDescriptor};

pub const LOGIN_PATH: &str = "/api/auth/login";

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

/// Body of a successful `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String { "bearer".to_string() }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailureReason {
    InvalidCredentials,
    Network,
    Server,
    /// Rejected for another reason (validation, malformed response, storage).
    Other,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LoginError {
    pub reason: LoginFailureReason,
    /// Text meant for the person at the login prompt.
    pub message: String,
    #[source]
    pub source: ApiError,
}

impl From<ApiError> for LoginError {
    fn from(err: ApiError) -> Self {
        let reason = match &err {
            ApiError::Unauthorized { .. } => LoginFailureReason::InvalidCredentials,
            ApiError::Transport { .. } => LoginFailureReason::Network,
            ApiError::Server { .. } => LoginFailureReason::Server,
            _ => LoginFailureReason::Other,
        };
        LoginError { reason, message: err.user_message(), source: err }
    }
}

/// Exchanges a username/password for a bearer credential.
pub struct LoginFlow {
    gateway: Arc<Gateway>,
    context: Arc<SessionContext>,
    landing_route: String,
}

impl LoginFlow {
    pub fn new(gateway: Arc<Gateway>, context: Arc<SessionContext>, landing_route: impl Into<String>) -> Self {
        Self { gateway, context, landing_route: landing_route.into() }
    }

    /// On failure the token store is left exactly as it was.
    pub async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, LoginError> {
        if req.username.trim().is_empty() || req.password.is_empty() {
            return Err(ApiError::validation("missing_credentials", "username and password are required", 400).into());
        }
        // anonymous: no stale bearer header, and a 401 here means bad credentials, not an expired session
        let desc = RequestDescriptor::post(LOGIN_PATH)
            .form([("username", req.username.as_str()), ("password", req.password.as_str())])
            .anonymous();
        let resp = match self.gateway.send_json::<LoginResponse>(desc).await {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "login", username = %req.username, error = %e, "login failed");
                return Err(e.into());
            }
        };
        if resp.access_token.is_empty() {
            return Err(ApiError::decode("empty_token", "login response carried no access_token").into());
        }
        if !resp.token_type.eq_ignore_ascii_case("bearer") {
            warn!(target: "login", token_type = %resp.token_type, "unexpected token type, using it as bearer");
        }
        self.context.store_token(&resp.access_token)?;
        info!(target: "login", username = %req.username, "login succeeded");
        self.context.navigate(&self.landing_route);
        Ok(resp)
    }
}
