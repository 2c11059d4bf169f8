//! Session token issuance and validation (compact JWS, HMAC-SHA family).
//!
//! The codec holds only immutable configuration and is shared across calls without locking.
//! Validation takes `now` explicitly so expiry can be checked against simulated time; the
//! library's own wall-clock `exp` check is disabled.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::config::AuthConfig;
use crate::error::AuthError;

use super::claims::{Identity, IdentityClaims};

pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: IdentityClaims,
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    session_ttl: chrono::Duration,
    issuer: String,
}

impl TokenCodec {
    pub fn new(cfg: &AuthConfig) -> Self {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        Self {
            encoding: EncodingKey::from_secret(&cfg.secret),
            decoding: DecodingKey::from_secret(&cfg.secret),
            validation,
            session_ttl: cfg.session_ttl,
            issuer: cfg.issuer.clone(),
        }
    }

    /// Stamp `iat = now`, `exp = now + ttl` and sign. Sub-second precision of `now` is dropped.
    pub fn issue(&self, identity: &Identity, now: DateTime<Utc>) -> Result<IssuedToken> {
        let iat = now.timestamp();
        let claims = IdentityClaims {
            sub: identity.subject.clone(),
            iss: self.issuer.clone(),
            iat,
            exp: iat + self.session_ttl.num_seconds(),
            email: identity.email.clone(),
            full_name: identity.full_name.clone(),
            role: identity.role.clone(),
        };
        let token = jsonwebtoken::encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding)
            .with_context(|| format!("signing session token for subject {}", claims.sub))?;
        tracing::debug!(target: "auth", sub = %claims.sub, exp = claims.exp, "token.issue");
        Ok(IssuedToken { token, claims })
    }

    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<IdentityClaims, AuthError> {
        if token.split('.').count() != 3 {
            return Err(AuthError::Malformed);
        }
        // Reject foreign algorithms (none, RS*, ES*) before any key material is involved.
        match declared_algorithm(token) {
            None => return Err(AuthError::Malformed),
            Some(alg) if !is_accepted(&alg) => return Err(AuthError::AlgorithmMismatch),
            Some(_) => {}
        }
        let data = jsonwebtoken::decode::<IdentityClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidAlgorithm => AuthError::AlgorithmMismatch,
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                _ => AuthError::Malformed,
            })?;
        if data.claims.is_expired_at(now) {
            return Err(AuthError::Expired);
        }
        Ok(data.claims)
    }
}

fn declared_algorithm(token: &str) -> Option<String> {
    let header = token.split('.').next()?;
    let bytes = URL_SAFE_NO_PAD.decode(header).ok()?;
    let v: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    v.get("alg")?.as_str().map(str::to_string)
}

fn is_accepted(alg: &str) -> bool {
    alg.parse::<Algorithm>().map(|a| ACCEPTED_ALGORITHMS.contains(&a)).unwrap_or(false)
}
