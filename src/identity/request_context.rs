use super::IdentityClaims;
use crate::error::{AppError, AppResult};

/// Per-call carrier threaded explicitly through the handler chain and dropped when the call ends.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub method: String,
    pub request_id: String,
    /// Set by the auth gate after a successful pass
    pub claims: Option<IdentityClaims>,
    /// Bearer token the claims were read from
    pub token: Option<String>,
}

impl CallContext {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
            claims: None,
            token: None,
        }
    }

    pub fn authenticated(mut self, token: String, claims: IdentityClaims) -> Self {
        self.token = Some(token);
        self.claims = Some(claims);
        self
    }

    /// Claims of the authenticated caller, or a generic rejection when the gate did not run.
    pub fn identity(&self) -> AppResult<&IdentityClaims> {
        self.claims.as_ref().ok_or_else(AppError::unauthenticated)
    }

    pub fn bearer_token(&self) -> AppResult<&str> {
        self.token.as_deref().ok_or_else(AppError::unauthenticated)
    }
}
