use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::claims::{Identity, IdentityClaims, ROLE_CUSTOMER};
use super::request_context::CallContext;
use super::revocation::RevocationStore;
use super::token::TokenCodec;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub full_name: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Stored credentials. Persistence lives outside this crate.
pub trait CredentialStore: Send + Sync {
    fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;
    /// Fails if a user with the same email already exists.
    fn insert_user(&self, user: UserRecord) -> Result<()>;
    fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()>;
}

#[derive(Default, Clone)]
pub struct InMemoryCredentials {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl InMemoryCredentials {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&self, user: UserRecord) {
        self.users.write().insert(user.email.to_lowercase(), user);
    }
}

impl CredentialStore for InMemoryCredentials {
    fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.read().get(&email.to_lowercase()).cloned())
    }

    fn insert_user(&self, user: UserRecord) -> Result<()> {
        let mut users = self.users.write();
        let key = user.email.to_lowercase();
        if users.contains_key(&key) {
            anyhow::bail!("user '{}' already exists", user.email);
        }
        users.insert(key, user);
        Ok(())
    }

    fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        let mut users = self.users.write();
        let Some(user) = users.values_mut().find(|u| u.id == user_id) else {
            anyhow::bail!("user id '{}' not found", user_id);
        };
        user.password_hash = password_hash.to_string();
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub access_token: String,
    pub claims: IdentityClaims,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirmation: String,
}

fn bad_request(msg: &str) -> AppError { AppError::exec("bad_request", msg) }

/// Registration, login, logout, password change and profile lookup on top of the codec and
/// revocation store.
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
    revocations: RevocationStore,
}

impl AuthService {
    pub fn new(credentials: Arc<dyn CredentialStore>, codec: Arc<TokenCodec>, revocations: RevocationStore) -> Self {
        Self { credentials, codec, revocations }
    }

    /// Create a customer account. Returns the new user id.
    pub fn register(&self, req: &RegisterRequest, now: DateTime<Utc>) -> AppResult<String> {
        if req.password != req.password_confirmation {
            return Err(bad_request("Password and Confirm Password not match"));
        }
        if self.credentials.find_by_email(&req.email)?.is_some() {
            tracing::info!(target: "auth", email = %req.email, "auth.register rejected: user_exists");
            return Err(bad_request("User already exist"));
        }
        let user = UserRecord {
            id: uuid::Uuid::new_v4().to_string(),
            email: req.email.clone(),
            full_name: req.full_name.clone(),
            password_hash: crate::security::hash_password(&req.password)?,
            role: ROLE_CUSTOMER.to_string(),
            created_at: now,
        };
        let id = user.id.clone();
        self.credentials.insert_user(user)?;
        tracing::info!(target: "auth", sub = %id, "auth.register");
        Ok(id)
    }

    pub fn login(&self, req: &LoginRequest, now: DateTime<Utc>) -> AppResult<LoginResponse> {
        let Some(user) = self.credentials.find_by_email(&req.email)? else {
            tracing::info!(target: "auth", email = %req.email, "auth.login rejected: user_not_registered");
            return Err(AppError::unauthenticated());
        };
        if !crate::security::verify_password(&user.password_hash, &req.password) {
            tracing::info!(target: "auth", email = %req.email, "auth.login rejected: invalid_credentials");
            return Err(AppError::unauthenticated());
        }
        let identity = Identity {
            subject: user.id.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role.clone(),
        };
        let issued = self.codec.issue(&identity, now)?;
        tracing::info!(target: "auth", sub = %issued.claims.sub, "auth.login");
        Ok(LoginResponse { access_token: issued.token, claims: issued.claims })
    }

    /// Revoke the caller's current token for the rest of its lifetime.
    pub fn logout(&self, ctx: &CallContext, now: DateTime<Utc>) -> AppResult<()> {
        let token = ctx.bearer_token()?;
        let claims = ctx.identity()?;
        let written = self.revocations.revoke_claims(token, claims, now);
        tracing::info!(target: "auth", sub = %claims.sub, revoked = written, "auth.logout");
        Ok(())
    }

    /// Replace the caller's password after checking the old one. Existing tokens stay valid.
    pub fn change_password(&self, ctx: &CallContext, req: &ChangePasswordRequest) -> AppResult<()> {
        if req.new_password != req.new_password_confirmation {
            return Err(bad_request("New Password and Confirm Password not match"));
        }
        let claims = ctx.identity()?;
        let Some(user) = self.credentials.find_by_email(&claims.email)? else {
            return Err(bad_request("User is not registered"));
        };
        if !crate::security::verify_password(&user.password_hash, &req.old_password) {
            tracing::info!(target: "auth", sub = %claims.sub, "auth.change_password rejected: invalid_credentials");
            return Err(AppError::unauthenticated());
        }
        let hash = crate::security::hash_password(&req.new_password)?;
        self.credentials.update_password(&user.id, &hash)?;
        tracing::info!(target: "auth", sub = %claims.sub, "auth.change_password");
        Ok(())
    }

    pub fn profile(&self, ctx: &CallContext) -> AppResult<IdentityClaims> {
        ctx.identity().cloned()
    }
}
