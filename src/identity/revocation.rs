use std::collections::HashMap as StdHashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::claims::IdentityClaims;

#[derive(Debug, Clone)]
struct Entry {
    /// Remaining token lifetime at the moment of revocation
    ttl: chrono::Duration,
    expires_at: DateTime<Utc>,
}

/// In-memory set of tokens rejected before their natural expiry.
/// Clones share the same map. Entries live exactly as long as the token would have.
#[derive(Clone, Default)]
pub struct RevocationStore {
    map: Arc<RwLock<StdHashMap<String, Entry>>>,
}

impl RevocationStore {
    pub fn new() -> Self { Self::default() }

    /// Revoke `token` until `expires_at`. A token already past expiry is ignored.
    /// Returns true if an entry was written.
    pub fn revoke(&self, token: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if expires_at <= now {
            tracing::debug!(target: "revocation", "revoke skipped: token already expired");
            return false;
        }
        let ttl = expires_at - now;
        let ent = Entry { ttl, expires_at: now + ttl };
        self.map.write().insert(token.to_string(), ent);
        tracing::debug!(target: "revocation", ttl_secs = ttl.num_seconds(), "revoke");
        true
    }

    pub fn revoke_claims(&self, token: &str, claims: &IdentityClaims, now: DateTime<Utc>) -> bool {
        self.revoke(token, claims.expires_at(), now)
    }

    pub fn is_revoked(&self, token: &str) -> bool { self.is_revoked_at(token, Utc::now()) }

    /// Lookup against an explicit clock. An entry found expired is removed.
    pub fn is_revoked_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        {
            let r = self.map.read();
            match r.get(token) {
                None => return false,
                Some(ent) if now < ent.expires_at => return true,
                Some(_) => {}
            }
        }
        let mut w = self.map.write();
        // Re-check under the write lock; a concurrent revoke may have refreshed the entry.
        if let Some(ent) = w.get(token) {
            if now < ent.expires_at { return true; }
            tracing::trace!(target: "revocation", ttl_secs = ent.ttl.num_seconds(), "evict on read");
            w.remove(token);
        }
        false
    }

    /// Remove expired entries. Returns number removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut w = self.map.write();
        let before = w.len();
        w.retain(|_, ent| now < ent.expires_at);
        before - w.len()
    }

    pub fn len(&self) -> usize { self.map.read().len() }
    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }

    /// Start a background task that sweeps on a fixed interval. Must be called inside a tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = store.sweep(Utc::now());
                if removed > 0 { tracing::debug!(target: "revocation", removed = removed, "revocation_sweep"); }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

    #[test]
    fn revoked_until_expiry_then_evicted() {
        let s = RevocationStore::new();
        assert!(s.revoke("tok", t(200), t(100)));
        assert!(s.is_revoked_at("tok", t(100)));
        assert!(s.is_revoked_at("tok", t(199)));
        assert_eq!(s.len(), 1);
        assert!(!s.is_revoked_at("tok", t(200)));
        assert!(s.is_empty());
    }

    #[test]
    fn pre_expired_revoke_is_noop() {
        let s = RevocationStore::new();
        assert!(!s.revoke("tok", t(100), t(100)));
        assert!(!s.revoke("tok", t(50), t(100)));
        assert!(!s.is_revoked_at("tok", t(10)));
        assert!(s.is_empty());
    }

    #[test]
    fn ttl_tracks_token_expiry() {
        let s = RevocationStore::new();
        s.revoke("a", t(1_000), t(400));
        let ent = s.map.read().get("a").cloned().unwrap();
        assert_eq!(ent.ttl, chrono::Duration::seconds(600));
        assert_eq!(ent.expires_at, t(1_000));
    }

    #[test]
    fn exact_token_match_only() {
        let s = RevocationStore::new();
        s.revoke("abc", t(100), t(0));
        assert!(!s.is_revoked_at("abcd", t(1)));
        assert!(!s.is_revoked_at("ab", t(1)));
        assert!(!s.is_revoked_at("", t(1)));
    }

    #[test]
    fn sweep_removes_only_expired() {
        let s = RevocationStore::new();
        s.revoke("short", t(10), t(0));
        s.revoke("long", t(100), t(0));
        assert_eq!(s.sweep(t(50)), 1);
        assert_eq!(s.len(), 1);
        assert!(s.is_revoked_at("long", t(50)));
        assert_eq!(s.sweep(t(100)), 1);
        assert!(s.is_empty());
    }

    #[test]
    fn clones_share_state() {
        let a = RevocationStore::new();
        let b = a.clone();
        a.revoke("x", t(10), t(0));
        assert!(b.is_revoked_at("x", t(5)));
    }

    #[tokio::test]
    async fn background_sweeper_purges() {
        let s = RevocationStore::new();
        let now = Utc::now();
        s.revoke("gone", now + chrono::Duration::milliseconds(20), now);
        s.revoke("kept", now + chrono::Duration::hours(1), now);
        let h = s.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.abort();
        assert_eq!(s.len(), 1);
        assert!(s.is_revoked("kept"));
    }
}
