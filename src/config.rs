//! Process-wide authentication settings, read once at startup and passed explicitly
//! into the token codec, revocation sweeper and interceptors.

use std::env;
use std::fmt;
use std::time::Duration;

use anyhow::{Result, anyhow};

pub const DEFAULT_ISSUER: &str = "ecommerce-furniture";
pub const SESSION_TTL_HOURS: i64 = 24;
pub const LOGIN_METHOD: &str = "/auth.AuthService/Login";
pub const REGISTER_METHOD: &str = "/auth.AuthService/Register";

/// How the outermost boundary reports errors returned by the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Authentication failures stay `Unauthenticated`; everything else becomes internal.
    #[default]
    Distinguish,
    /// Every returned error becomes a generic internal failure.
    Collapse,
}

impl ErrorPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "distinguish" => Some(ErrorPolicy::Distinguish),
            "collapse" => Some(ErrorPolicy::Collapse),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: Vec<u8>,
    pub session_ttl: chrono::Duration,
    pub issuer: String,
    /// Interval of the background revocation sweep
    pub sweep_interval: Duration,
    /// Methods forwarded without a bearer token (login, register)
    pub public_methods: Vec<String>,
    pub error_policy: ErrorPolicy,
}

impl AuthConfig {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            session_ttl: chrono::Duration::hours(SESSION_TTL_HOURS),
            issuer: DEFAULT_ISSUER.to_string(),
            sweep_interval: Duration::from_secs(5),
            public_methods: vec![LOGIN_METHOD.to_string(), REGISTER_METHOD.to_string()],
            error_policy: ErrorPolicy::default(),
        }
    }

    /// Load from the environment. `JWT_SECRET_KEY` is required.
    pub fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET_KEY").map_err(|_| anyhow!("JWT_SECRET_KEY is not set"))?;
        if secret.is_empty() {
            return Err(anyhow!("JWT_SECRET_KEY is empty"));
        }
        let mut cfg = Self::new(secret.into_bytes());
        if let Some(secs) = parse_u64_env("TOKENGATE_SWEEP_INTERVAL_SEC") {
            if secs > 0 { cfg.sweep_interval = Duration::from_secs(secs); }
        }
        if let Ok(raw) = env::var("TOKENGATE_ERROR_POLICY") {
            cfg.error_policy = ErrorPolicy::parse(&raw)
                .ok_or_else(|| anyhow!("invalid TOKENGATE_ERROR_POLICY '{}': expected distinguish|collapse", raw))?;
        }
        Ok(cfg)
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self { self.issuer = issuer.into(); self }
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self { self.sweep_interval = interval; self }
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self { self.error_policy = policy; self }
    pub fn with_public_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.public_methods = methods.into_iter().map(Into::into).collect();
        self
    }
}

// Never print the secret.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &format_args!("<{} bytes redacted>", self.secret.len()))
            .field("session_ttl_secs", &self.session_ttl.num_seconds())
            .field("issuer", &self.issuer)
            .field("sweep_interval", &self.sweep_interval)
            .field("public_methods", &self.public_methods)
            .field("error_policy", &self.error_policy)
            .finish()
    }
}

fn parse_u64_env(name: &str) -> Option<u64> {
    match env::var(name) {
        Ok(val) => val.trim().parse::<u64>().ok(),
        Err(_) => None,
    }
}
