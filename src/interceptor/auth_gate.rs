use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{Handler, HandlerFuture, Metadata, Request};
use crate::error::{AppError, AuthError};
use crate::identity::{CallContext, IdentityClaims, RevocationStore, TokenCodec};

pub const AUTHORIZATION: &str = "authorization";
pub const BEARER: &str = "Bearer";

/// Extract the bearer token from `authorization: Bearer <token>`.
/// The scheme is case-sensitive; the token may be empty and is left to validation.
pub fn bearer_token(metadata: &Metadata) -> Result<&str, AuthError> {
    let header = match metadata.get(AUTHORIZATION) {
        Some(h) if !h.is_empty() => h,
        _ => return Err(AuthError::MissingToken),
    };
    let Some((scheme, token)) = header.split_once(' ') else {
        return Err(AuthError::MalformedHeader);
    };
    if scheme != BEARER {
        return Err(AuthError::WrongScheme);
    }
    Ok(token)
}

/// Rejects every call whose bearer token is missing, revoked or invalid; forwards the rest
/// with the caller's claims attached to the call context.
pub struct AuthGate<H> {
    inner: H,
    codec: Arc<TokenCodec>,
    revocations: RevocationStore,
    public_methods: Vec<String>,
}

impl<H> AuthGate<H> {
    pub fn new(inner: H, codec: Arc<TokenCodec>, revocations: RevocationStore) -> Self {
        Self { inner, codec, revocations, public_methods: Vec::new() }
    }

    pub fn with_public_methods(mut self, methods: Vec<String>) -> Self {
        self.public_methods = methods;
        self
    }

    pub fn is_public(&self, method: &str) -> bool {
        self.public_methods.iter().any(|m| m == method)
    }

    /// Run the header, revocation and token checks against an explicit clock.
    pub fn authenticate(&self, metadata: &Metadata, now: DateTime<Utc>) -> Result<(String, IdentityClaims), AuthError> {
        let token = bearer_token(metadata)?;
        if self.revocations.is_revoked_at(token, now) {
            return Err(AuthError::Revoked);
        }
        let claims = self.codec.validate(token, now)?;
        Ok((token.to_string(), claims))
    }
}

impl<H: Handler> Handler for AuthGate<H> {
    fn call(&self, ctx: CallContext, req: Request) -> HandlerFuture {
        if self.is_public(&req.method) {
            tracing::debug!(target: "auth", method = %req.method, request_id = %ctx.request_id, "auth.public");
            return self.inner.call(ctx, req);
        }
        match self.authenticate(&req.metadata, Utc::now()) {
            Ok((token, claims)) => {
                tracing::debug!(target: "auth", method = %req.method, request_id = %ctx.request_id, sub = %claims.sub, "auth.admit");
                self.inner.call(ctx.authenticated(token, claims), req)
            }
            Err(reason) => {
                tracing::warn!(target: "auth", method = %req.method, request_id = %ctx.request_id, reason = reason.code_str(), "auth.reject");
                let err: AppError = reason.into();
                Box::pin(async move { Err::<Value, AppError>(err) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md(v: &str) -> Metadata { Metadata::new().with(AUTHORIZATION, v) }

    #[test]
    fn public_methods_match_exactly() {
        let codec = Arc::new(TokenCodec::new(&crate::config::AuthConfig::new("k")));
        let gate = AuthGate::new((), codec, RevocationStore::new())
            .with_public_methods(vec!["/auth.AuthService/Login".to_string()]);
        assert!(gate.is_public("/auth.AuthService/Login"));
        assert!(!gate.is_public("/auth.AuthService/login"));
        assert!(!gate.is_public("/auth.AuthService/Logout"));
    }

    #[test]
    fn header_parsing_decisions() {
        assert_eq!(bearer_token(&Metadata::new()), Err(AuthError::MissingToken));
        assert_eq!(bearer_token(&md("")), Err(AuthError::MissingToken));
        assert_eq!(bearer_token(&md("garbage")), Err(AuthError::MalformedHeader));
        assert_eq!(bearer_token(&md("Basic abc")), Err(AuthError::WrongScheme));
        assert_eq!(bearer_token(&md("bearer abc")), Err(AuthError::WrongScheme));
        assert_eq!(bearer_token(&md("Bearer ")), Ok(""));
        assert_eq!(bearer_token(&md("Bearer a.b.c")), Ok("a.b.c"));
    }
}
