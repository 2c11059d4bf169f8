use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_CUSTOMER: &str = "customer";

/// A user whose credentials have been verified, about to be issued a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
}

/// Claims carried inside a session token. Created once at issuance, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub iss: String,
    /// Issued-at, unix seconds
    pub iat: i64,
    /// Expires-at, unix seconds
    pub exp: i64,
    pub email: String,
    pub full_name: String,
    pub role: String,
}

impl IdentityClaims {
    pub fn issued_at(&self) -> DateTime<Utc> { to_datetime(self.iat) }
    pub fn expires_at(&self) -> DateTime<Utc> { to_datetime(self.exp) }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { now.timestamp() >= self.exp }

    pub fn is_admin(&self) -> bool { self.role == ROLE_ADMIN }
}

fn to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(iat: i64, exp: i64) -> IdentityClaims {
        IdentityClaims {
            sub: "u-1".into(),
            iss: "issuer".into(),
            iat,
            exp,
            email: "a@b.c".into(),
            full_name: "A B".into(),
            role: ROLE_CUSTOMER.into(),
        }
    }

    #[test]
    fn expiry_is_exclusive_of_exp() {
        let c = sample(1_000, 2_000);
        assert!(!c.is_expired_at(Utc.timestamp_opt(1_999, 0).unwrap()));
        assert!(c.is_expired_at(Utc.timestamp_opt(2_000, 0).unwrap()));
        assert_eq!(c.expires_at().timestamp(), 2_000);
        assert_eq!(c.issued_at().timestamp(), 1_000);
        assert!(!c.is_admin());
    }

    #[test]
    fn json_field_names() {
        let v = serde_json::to_value(sample(1, 2)).unwrap();
        for k in ["sub", "iss", "iat", "exp", "email", "full_name", "role"] {
            assert!(v.get(k).is_some(), "missing {k}");
        }
        assert_eq!(v["iat"], serde_json::json!(1));
    }
}
