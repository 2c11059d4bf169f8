//! Per-call handler chain.
//!
//! Every stage implements [`Handler`]; decorators wrap a "next" handler and are themselves
//! handlers, so ordering is explicit at construction:
//!
//! ```text
//! FailureBoundary -> AuthGate -> business handler
//! ```
//!
//! Dropping the future returned by [`Handler::call`] cancels the call. Authentication is decided
//! before the inner future is created, so cancellation never leaves partial auth state behind.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::config::AuthConfig;
use crate::error::AppResult;
use crate::identity::{CallContext, RevocationStore, TokenCodec};

pub mod auth_gate;
pub mod failure_boundary;

pub use auth_gate::{AuthGate, AUTHORIZATION, BEARER};
pub use failure_boundary::FailureBoundary;

/// Request-scoped transport metadata. Keys are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct Metadata(HashMap<String, String>);

impl Metadata {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    /// Fully qualified RPC method, e.g. `/auth.AuthService/Login`
    pub method: String,
    pub metadata: Metadata,
    pub payload: Value,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Self { method: method.into(), metadata: Metadata::new(), payload: Value::Null }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_metadata(AUTHORIZATION, format!("{} {}", BEARER, token))
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

pub type HandlerFuture = BoxFuture<'static, AppResult<Value>>;

pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: CallContext, req: Request) -> HandlerFuture;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call(&self, ctx: CallContext, req: Request) -> HandlerFuture { (**self).call(ctx, req) }
}

/// Handler backed by an async closure. See [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(CallContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Value>> + Send + 'static,
{
    HandlerFn(f)
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(CallContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Value>> + Send + 'static,
{
    fn call(&self, ctx: CallContext, req: Request) -> HandlerFuture { Box::pin((self.0)(ctx, req)) }
}

/// Wrap `inner` in the standard chain: failure boundary outermost, then the auth gate.
pub fn guarded<H: Handler>(
    cfg: &AuthConfig,
    codec: Arc<TokenCodec>,
    revocations: RevocationStore,
    inner: H,
) -> FailureBoundary<AuthGate<H>> {
    let gate = AuthGate::new(inner, codec, revocations).with_public_methods(cfg.public_methods.clone());
    FailureBoundary::new(gate, cfg.error_policy)
}
