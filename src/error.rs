//! Unified error model for the authentication layer.
//! `AuthError` is the internal reason a call was rejected; `AppError` is what flows through
//! the handler chain; `Status` is the only thing a caller ever sees.

use std::fmt::{Display, Formatter};

/// Reason a token or authorization header was rejected. Logged server-side only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("authorization metadata missing or empty")]
    MissingToken,
    #[error("authorization header is not '<scheme> <token>'")]
    MalformedHeader,
    #[error("authorization scheme is not Bearer")]
    WrongScheme,
    #[error("token could not be parsed")]
    Malformed,
    #[error("token declares an unexpected signing algorithm")]
    AlgorithmMismatch,
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token has been revoked")]
    Revoked,
}

impl AuthError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedHeader => "malformed_header",
            AuthError::WrongScheme => "wrong_scheme",
            AuthError::Malformed => "malformed_token",
            AuthError::AlgorithmMismatch => "algorithm_mismatch",
            AuthError::BadSignature => "bad_signature",
            AuthError::Expired => "expired",
            AuthError::Revoked => "revoked",
        }
    }
}

pub const UNAUTHENTICATED: &str = "unauthenticated";
pub const INTERNAL_MESSAGE: &str = "Internal Server Error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    Auth { code: String, message: String },
    Exec { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Auth { code, .. }
            | AppError::Exec { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Auth { message, .. }
            | AppError::Exec { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn exec<S: Into<String>>(code: S, msg: S) -> Self { AppError::Exec { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// The generic rejection every authentication failure collapses into.
    pub fn unauthenticated() -> Self { AppError::auth(UNAUTHENTICATED, UNAUTHENTICATED) }

    pub fn is_auth(&self) -> bool { matches!(self, AppError::Auth { .. }) }

    /// Map to the caller-facing status code.
    pub fn status_code(&self) -> Code {
        match self {
            AppError::Auth { .. } => Code::Unauthenticated,
            AppError::Exec { .. } | AppError::Internal { .. } => Code::Internal,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

// The specific reason never leaves the process; callers only learn "unauthenticated".
impl From<AuthError> for AppError {
    fn from(_: AuthError) -> Self { AppError::unauthenticated() }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Exec { code: "exec_error".into(), message: err.to_string() }
    }
}

/// Caller-facing outcome codes, numbered as in gRPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    Internal = 13,
    Unauthenticated = 16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self { Self { code, message: message.into() } }
    pub fn unauthenticated() -> Self { Self::new(Code::Unauthenticated, UNAUTHENTICATED) }
    pub fn internal() -> Self { Self::new(Code::Internal, INTERNAL_MESSAGE) }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "status {:?} ({}): {}", self.code, self.code as i32, self.message)
    }
}

impl std::error::Error for Status {}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self { Status::new(err.status_code(), err.message()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(AppError::auth("x", "y").status_code(), Code::Unauthenticated);
        assert_eq!(AppError::exec("exec_error", "fail").status_code(), Code::Internal);
        assert_eq!(AppError::internal("internal", "panic").status_code(), Code::Internal);
        assert_eq!(Code::Unauthenticated as i32, 16);
        assert_eq!(Code::Internal as i32, 13);
    }

    #[test]
    fn auth_reasons_collapse_to_generic_unauthenticated() {
        for reason in [
            AuthError::MissingToken,
            AuthError::MalformedHeader,
            AuthError::WrongScheme,
            AuthError::Malformed,
            AuthError::AlgorithmMismatch,
            AuthError::BadSignature,
            AuthError::Expired,
            AuthError::Revoked,
        ] {
            let app: AppError = reason.into();
            assert_eq!(app.code_str(), UNAUTHENTICATED);
            assert_eq!(app.message(), UNAUTHENTICATED);
            assert!(!app.to_string().contains(reason.code_str()));
        }
    }

    #[test]
    fn anyhow_maps_to_exec() {
        let app: AppError = anyhow::anyhow!("db down").into();
        assert_eq!(app.code_str(), "exec_error");
        assert_eq!(app.message(), "db down");
    }
}
