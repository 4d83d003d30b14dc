//! Login Throttle
//!
//! Failed-login tracking per `(client IP, identifier)` pair:
//!
//! ```text
//! LT:<ip>_<identifier>  failure counter, TTL re-armed on every failure (inactivity window)
//! LW:<ip>_<identifier>  lockout deadline (unix millis), TTL = lockout window
//! ```
//!
//! Identifiers are trimmed and lowercased, matching the case-insensitive user
//! lookup. Once an identifier resolves to an account, the password grant also
//! tracks the account itself under `#<user id>`, so every spelling that
//! reaches the same user shares one budget.
//!
//! Reaching the threshold writes the lock key and clears the counter, so the
//! first attempt after the lockout starts from zero. Reads go to the primary
//! and any store failure refuses the attempt.

use chrono::{DateTime, TimeZone, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};
use warden_db::kv::keys;
use warden_db::{Clock, CredentialStore};

use crate::config::ThrottleConfig;
use crate::error::{AuthError, AuthResult};
use crate::token::chrono_ttl;
use crate::types::LoginThrottleStatus;

/// Brute-force guard in front of every password check
#[derive(Clone)]
pub struct LoginThrottle {
    store: CredentialStore,
    clock: Arc<dyn Clock>,
    config: ThrottleConfig,
}

impl LoginThrottle {
    pub fn new(store: CredentialStore, clock: Arc<dyn Clock>, config: ThrottleConfig) -> Self {
        Self { store, clock, config }
    }

    /// `<ip>_<identifier>`, identifier trimmed and lowercased
    pub fn build_key(ip: &str, identifier: &str) -> String {
        format!("{}_{}", ip, identifier.trim().to_ascii_lowercase())
    }

    /// Throttle identity of a resolved account
    pub fn account_identity(user_id: i64) -> String {
        format!("#{}", user_id)
    }

    fn count_key(&self, key: &str) -> String {
        self.store.key(keys::THROTTLE_COUNT, key)
    }

    fn wait_key(&self, key: &str) -> String {
        self.store.key(keys::THROTTLE_WAIT, key)
    }

    async fn wait_until(&self, key: &str) -> AuthResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.store.get_primary(&self.wait_key(key)).await? else {
            return Ok(None);
        };
        let millis: i64 = raw
            .parse()
            .map_err(|_| AuthError::Internal(format!("malformed throttle deadline for {}", key)))?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(Some)
            .ok_or_else(|| AuthError::Internal(format!("throttle deadline out of range for {}", key)))
    }

    /// Gate a login attempt without recording anything
    pub async fn check(&self, identifier: &str, ip: &str) -> AuthResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let key = Self::build_key(ip, identifier);
        let wait_until = match self.wait_until(&key).await {
            Ok(wait_until) => wait_until,
            Err(e) => {
                error!(throttle_key = %key, error = %e, "Throttle state unavailable, refusing login");
                return Err(AuthError::ThrottleUnavailable);
            }
        };

        let now = self.clock.now();
        match wait_until {
            Some(until) if now <= until => {
                let remaining = (until - now).to_std().unwrap_or_default();
                debug!(throttle_key = %key, "Login attempt rejected by throttle");
                Err(AuthError::account_locked(remaining))
            }
            _ => Ok(()),
        }
    }

    /// Whether a login attempt may proceed
    pub async fn can_attempt(&self, identifier: &str, ip: &str) -> bool {
        self.check(identifier, ip).await.is_ok()
    }

    /// Record a failed attempt. Returns `true` when this failure triggered a lockout.
    pub async fn on_failure(&self, identifier: &str, ip: &str) -> AuthResult<bool> {
        if !self.config.enabled {
            return Ok(false);
        }

        let key = Self::build_key(ip, identifier);
        let count = self
            .store
            .incr_with_ttl(&self.count_key(&key), self.config.inactivity_window)
            .await?;

        if count < i64::from(self.config.max_failures) {
            debug!(throttle_key = %key, count, "Login failure recorded");
            return Ok(false);
        }

        let wait_until = self.clock.now() + chrono_ttl(self.config.lockout_window)?;
        self.store
            .set_ex(
                &self.wait_key(&key),
                &wait_until.timestamp_millis().to_string(),
                self.config.lockout_window,
            )
            .await?;
        self.store.delete(&self.count_key(&key)).await?;

        warn!(
            throttle_key = %key,
            count,
            wait_until = %wait_until,
            "Login locked after repeated failures"
        );

        Ok(true)
    }

    /// Clear all throttle state for the pair
    pub async fn on_success(&self, identifier: &str, ip: &str) -> AuthResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let key = Self::build_key(ip, identifier);
        self.store.delete(&self.count_key(&key)).await?;
        self.store.delete(&self.wait_key(&key)).await?;
        Ok(())
    }

    /// Read-only view of both keys; `None` when the pair has no state
    pub async fn status(&self, identifier: &str, ip: &str) -> AuthResult<Option<LoginThrottleStatus>> {
        let key = Self::build_key(ip, identifier);

        let count = match self.store.get_primary(&self.count_key(&key)).await? {
            Some(raw) => Some(
                raw.parse::<i64>()
                    .map_err(|_| AuthError::Internal(format!("malformed throttle counter for {}", key)))?,
            ),
            None => None,
        };
        let wait_until = self.wait_until(&key).await?;

        if count.is_none() && wait_until.is_none() {
            return Ok(None);
        }

        Ok(Some(LoginThrottleStatus {
            key,
            count: count.unwrap_or(0),
            wait_until,
        }))
    }
}

/// Extract client IP from request headers
pub fn extract_client_ip(headers: &axum::http::HeaderMap, peer_addr: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let forwarded_for = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    // Priority: CF > X-Real-IP > X-Forwarded-For > peer addr
    header("CF-Connecting-IP")
        .or_else(|| header("X-Real-IP"))
        .or(forwarded_for)
        .or_else(|| peer_addr.map(|a| a.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{failing_store, Fixture};
    use axum::http::{HeaderMap, HeaderValue};
    use std::time::Duration;

    const IP: &str = "1.2.3.4";

    fn throttle(fx: &Fixture) -> LoginThrottle {
        LoginThrottle::new(fx.store.clone(), fx.clock(), ThrottleConfig::default())
    }

    #[tokio::test]
    async fn test_locks_after_threshold() {
        let fx = Fixture::new();
        let throttle = throttle(&fx);

        assert!(!throttle.on_failure("bob", IP).await.unwrap());
        assert!(!throttle.on_failure("bob", IP).await.unwrap());
        assert!(throttle.can_attempt("bob", IP).await);

        assert!(throttle.on_failure("bob", IP).await.unwrap());
        assert!(!throttle.can_attempt("bob", IP).await);

        let err = throttle.check("bob", IP).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked { retry_after: 600 }));
    }

    #[tokio::test]
    async fn test_keys_are_per_ip_and_identifier() {
        let fx = Fixture::new();
        let throttle = throttle(&fx);

        for _ in 0..3 {
            throttle.on_failure("bob", IP).await.unwrap();
        }

        assert!(!throttle.can_attempt("bob", IP).await);
        assert!(throttle.can_attempt("bob", "5.6.7.8").await);
        assert!(throttle.can_attempt("alice", IP).await);
    }

    #[tokio::test]
    async fn test_identifier_case_and_padding_share_a_key() {
        let fx = Fixture::new();
        let throttle = throttle(&fx);

        throttle.on_failure("bob@example.com", IP).await.unwrap();
        throttle.on_failure("BOB@example.com", IP).await.unwrap();
        assert!(throttle.on_failure(" Bob@Example.COM ", IP).await.unwrap());

        assert!(!throttle.can_attempt("bOb@eXample.com", IP).await);
        assert_eq!(LoginThrottle::build_key(IP, "  BOB "), "1.2.3.4_bob");
    }

    #[tokio::test]
    async fn test_success_clears_state() {
        let fx = Fixture::new();
        let throttle = throttle(&fx);

        for _ in 0..3 {
            throttle.on_failure("bob", IP).await.unwrap();
        }
        throttle.on_success("bob", IP).await.unwrap();

        assert!(throttle.can_attempt("bob", IP).await);
        assert_eq!(throttle.status("bob", IP).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lock_lifts_and_counter_restarts() {
        let fx = Fixture::new();
        let throttle = throttle(&fx);

        for _ in 0..3 {
            throttle.on_failure("bob", IP).await.unwrap();
        }

        fx.clock.advance(Duration::from_secs(9 * 60));
        assert!(!throttle.can_attempt("bob", IP).await);

        fx.clock.advance(Duration::from_secs(61));
        assert!(throttle.can_attempt("bob", IP).await);

        // a single failure after the lockout does not re-lock
        assert!(!throttle.on_failure("bob", IP).await.unwrap());
        assert!(throttle.can_attempt("bob", IP).await);
        let status = throttle.status("bob", IP).await.unwrap().unwrap();
        assert_eq!(status.count, 1);
        assert_eq!(status.wait_until, None);
    }

    #[tokio::test]
    async fn test_counter_expires_after_inactivity() {
        let fx = Fixture::new();
        let throttle = throttle(&fx);

        throttle.on_failure("bob", IP).await.unwrap();
        throttle.on_failure("bob", IP).await.unwrap();

        fx.clock.advance(Duration::from_secs(11 * 60));
        assert_eq!(throttle.status("bob", IP).await.unwrap(), None);

        assert!(!throttle.on_failure("bob", IP).await.unwrap());
    }

    #[tokio::test]
    async fn test_status_reports_deadline() {
        let fx = Fixture::new();
        let throttle = throttle(&fx);
        let start = fx.clock.now();

        for _ in 0..3 {
            throttle.on_failure("bob", IP).await.unwrap();
        }

        let status = throttle.status("bob", IP).await.unwrap().unwrap();
        assert_eq!(status.key, "1.2.3.4_bob");
        assert_eq!(status.count, 0);
        let until = status.wait_until.unwrap();
        assert_eq!(
            until.timestamp_millis(),
            (start + chrono::Duration::minutes(10)).timestamp_millis()
        );
        assert!(status.is_locked_at(fx.clock.now()));
    }

    #[tokio::test]
    async fn test_fails_closed_on_store_outage() {
        let fx = Fixture::new();
        let throttle = LoginThrottle::new(failing_store(), fx.clock(), ThrottleConfig::default());

        assert!(!throttle.can_attempt("bob", IP).await);
        assert!(matches!(
            throttle.check("bob", IP).await,
            Err(AuthError::ThrottleUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_disabled_throttle_never_locks() {
        let fx = Fixture::new();
        let config = ThrottleConfig {
            enabled: false,
            ..ThrottleConfig::default()
        };
        let throttle = LoginThrottle::new(fx.store.clone(), fx.clock(), config);

        for _ in 0..10 {
            throttle.on_failure("bob", IP).await.unwrap();
        }
        assert!(throttle.can_attempt("bob", IP).await);
    }

    #[test]
    fn test_extract_client_ip_priority() {
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers, Some(peer)), "10.0.0.1");
        assert_eq!(extract_client_ip(&headers, None), "unknown");

        headers.insert("X-Forwarded-For", HeaderValue::from_static("203.0.113.7, 10.0.0.2"));
        assert_eq!(extract_client_ip(&headers, Some(peer)), "203.0.113.7");

        headers.insert("X-Real-IP", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(extract_client_ip(&headers, Some(peer)), "198.51.100.4");

        headers.insert("CF-Connecting-IP", HeaderValue::from_static("192.0.2.9"));
        assert_eq!(extract_client_ip(&headers, Some(peer)), "192.0.2.9");
    }
}
