//! Session Adapter
//!
//! Cookie-backed alternative to bearer tokens. The cookie carries a random
//! session id; the store holds `{ uid }` under `SS:<digest(id)>` with the
//! session max-age as TTL.
//!
//! Resolution never fails the request: a store outage, a stale cookie or a
//! user that is gone, blocked or inactive all leave the request anonymous, with a
//! removal cookie where the client holds a dead session.

use axum::http::{header::COOKIE, HeaderMap};
use std::sync::Arc;
use tracing::{debug, error, info};
use warden_db::kv::keys;
use warden_db::{Clock, CredentialStore, UserRecord, UserRepository};

use crate::config::SessionConfig;
use crate::error::AuthResult;
use crate::token::{digest, generate_token, short_id};
use crate::types::{AuthMethod, AuthenticatedUser, SessionData};

/// Result of resolving a request's session cookie
#[derive(Debug, Default)]
pub struct SessionOutcome {
    pub user: Option<AuthenticatedUser>,
    /// `Set-Cookie` value to attach to the response
    pub set_cookie: Option<String>,
}

/// A freshly written session
#[derive(Debug)]
pub struct EstablishedSession {
    pub id: String,
    /// `Set-Cookie` value carrying the new id
    pub cookie: String,
}

/// Resolves, establishes and destroys cookie sessions
#[derive(Clone)]
pub struct SessionAdapter {
    store: CredentialStore,
    users: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionAdapter {
    pub fn new(
        store: CredentialStore,
        users: Arc<dyn UserRepository>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            users,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn key(&self, session_id: &str) -> String {
        self.store.key(keys::SESSION, &digest(session_id))
    }

    /// Session id from the `Cookie` header
    pub fn session_id(&self, headers: &HeaderMap) -> Option<String> {
        let prefix = format!("{}=", self.config.cookie_name);
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .map(str::trim)
            .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// Resolve the request's session to a principal
    pub async fn authenticate(&self, headers: &HeaderMap) -> SessionOutcome {
        let Some(session_id) = self.session_id(headers) else {
            return SessionOutcome::default();
        };
        let key = self.key(&session_id);

        let data = match self.store.get_json::<SessionData>(&key).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!("Stale session cookie");
                return SessionOutcome {
                    user: None,
                    set_cookie: Some(self.removal_cookie()),
                };
            }
            Err(e) => {
                error!(error = %e, "Session lookup failed, continuing anonymous");
                return SessionOutcome::default();
            }
        };

        let user = match self.users.find_by_id(data.uid).await {
            Ok(Some(user)) if user.can_sign_in() => user,
            Ok(_) => {
                info!(user_id = data.uid, "Destroying session of missing, blocked or inactive user");
                return SessionOutcome {
                    user: None,
                    set_cookie: Some(self.destroy_logged(&session_id).await),
                };
            }
            Err(e) => {
                error!(user_id = data.uid, error = %e, "Session owner lookup failed, continuing anonymous");
                return SessionOutcome::default();
            }
        };

        let mut set_cookie = None;
        if self.config.resave {
            match self.store.set_json(&key, &data, self.config.max_age).await {
                Ok(()) => set_cookie = Some(self.cookie(&session_id)),
                Err(e) => error!(user_id = user.id, error = %e, "Failed to slide session expiry"),
            }
        }

        SessionOutcome {
            user: Some(AuthenticatedUser::from_record(&user, AuthMethod::Session)),
            set_cookie,
        }
    }

    /// Start a session for `user`, discarding `previous` if given
    pub async fn establish(&self, user: &UserRecord, previous: Option<&str>) -> AuthResult<EstablishedSession> {
        if let Some(previous) = previous {
            self.store.delete(&self.key(previous)).await?;
        }

        let id = generate_token(self.config.token_length);
        let data = SessionData {
            uid: user.id,
            created_at: self.clock.now(),
        };
        self.store.set_json(&self.key(&id), &data, self.config.max_age).await?;

        info!(user_id = user.id, session = %short_id(&digest(&id)), "Session established");

        Ok(EstablishedSession {
            cookie: self.cookie(&id),
            id,
        })
    }

    /// Delete the session and return a removal cookie
    pub async fn destroy(&self, session_id: &str) -> AuthResult<String> {
        self.store.delete(&self.key(session_id)).await?;
        Ok(self.removal_cookie())
    }

    async fn destroy_logged(&self, session_id: &str) -> String {
        if let Err(e) = self.store.delete(&self.key(session_id)).await {
            error!(error = %e, "Failed to delete session");
        }
        self.removal_cookie()
    }

    fn attributes(&self, max_age: u64) -> String {
        let mut attrs = format!("Path={}; SameSite=Lax; Max-Age={}", self.config.cookie_path, max_age);
        if self.config.http_only {
            attrs.push_str("; HttpOnly");
        }
        if self.config.secure {
            attrs.push_str("; Secure");
        }
        attrs
    }

    /// `Set-Cookie` value for a live session
    pub fn cookie(&self, session_id: &str) -> String {
        format!(
            "{}={}; {}",
            self.config.cookie_name,
            session_id,
            self.attributes(self.config.max_age.as_secs())
        )
    }

    /// `Set-Cookie` value that clears the session cookie
    pub fn removal_cookie(&self) -> String {
        format!("{}=; {}", self.config.cookie_name, self.attributes(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{failing_store, Fixture};
    use axum::http::HeaderValue;
    use std::time::Duration;

    fn adapter(fx: &Fixture) -> SessionAdapter {
        SessionAdapter::new(
            fx.store.clone(),
            Arc::new(fx.directory.clone()),
            fx.clock(),
            SessionConfig::default(),
        )
    }

    fn cookie_headers(adapter: &SessionAdapter, id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("theme=dark; {}={}", adapter.config().cookie_name, id);
        headers.insert(COOKIE, HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_establish_then_authenticate() {
        let fx = Fixture::new();
        let user = fx.user(3, "carol", None).await;
        let sessions = adapter(&fx);

        let session = sessions.establish(&user, None).await.unwrap();
        assert!(session.cookie.starts_with("warden.sid="));
        assert!(session.cookie.contains("HttpOnly"));
        assert!(session.cookie.contains("Max-Age=604800"));
        assert!(!session.cookie.contains("Secure"));

        let outcome = sessions.authenticate(&cookie_headers(&sessions, &session.id)).await;
        let principal = outcome.user.unwrap();
        assert_eq!(principal.user_id, 3);
        assert_eq!(principal.auth_method, AuthMethod::Session);
        // resave slides the cookie
        assert_eq!(outcome.set_cookie, Some(session.cookie));
    }

    #[tokio::test]
    async fn test_resave_slides_expiry() {
        let fx = Fixture::new();
        let user = fx.user(3, "carol", None).await;
        let sessions = adapter(&fx);
        let session = sessions.establish(&user, None).await.unwrap();
        let headers = cookie_headers(&sessions, &session.id);

        fx.clock.advance(Duration::from_secs(6 * 24 * 60 * 60));
        assert!(sessions.authenticate(&headers).await.user.is_some());

        fx.clock.advance(Duration::from_secs(6 * 24 * 60 * 60));
        assert!(sessions.authenticate(&headers).await.user.is_some());
    }

    #[tokio::test]
    async fn test_without_resave_session_expires() {
        let fx = Fixture::new();
        let user = fx.user(3, "carol", None).await;
        let config = SessionConfig {
            resave: false,
            ..SessionConfig::default()
        };
        let sessions = SessionAdapter::new(fx.store.clone(), Arc::new(fx.directory.clone()), fx.clock(), config);
        let session = sessions.establish(&user, None).await.unwrap();
        let headers = cookie_headers(&sessions, &session.id);

        let outcome = sessions.authenticate(&headers).await;
        assert!(outcome.user.is_some());
        assert!(outcome.set_cookie.is_none());

        fx.clock.advance(Duration::from_secs(8 * 24 * 60 * 60));
        let outcome = sessions.authenticate(&headers).await;
        assert!(outcome.user.is_none());
        assert_eq!(outcome.set_cookie, Some(sessions.removal_cookie()));
    }

    #[tokio::test]
    async fn test_blocked_user_destroys_session() {
        let fx = Fixture::new();
        let user = fx.user(3, "carol", None).await;
        let sessions = adapter(&fx);
        let session = sessions.establish(&user, None).await.unwrap();

        fx.directory.set_blocked(3, true).await.unwrap();
        let outcome = sessions.authenticate(&cookie_headers(&sessions, &session.id)).await;

        assert!(outcome.user.is_none());
        assert!(outcome.set_cookie.unwrap().contains("Max-Age=0"));
        assert!(fx.kv.is_empty().await);
    }

    #[tokio::test]
    async fn test_inactive_user_destroys_session() {
        let fx = Fixture::new();
        let user = fx.user(3, "carol", None).await;
        let sessions = adapter(&fx);
        let session = sessions.establish(&user, None).await.unwrap();

        fx.directory.insert_user(UserRecord { active: false, ..user }, None).await;
        let outcome = sessions.authenticate(&cookie_headers(&sessions, &session.id)).await;

        assert!(outcome.user.is_none());
        assert!(outcome.set_cookie.unwrap().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_establish_rotates_previous_session() {
        let fx = Fixture::new();
        let user = fx.user(3, "carol", None).await;
        let sessions = adapter(&fx);

        let first = sessions.establish(&user, None).await.unwrap();
        let second = sessions.establish(&user, Some(&first.id)).await.unwrap();

        assert_ne!(first.id, second.id);
        assert!(sessions.authenticate(&cookie_headers(&sessions, &first.id)).await.user.is_none());
        assert!(sessions.authenticate(&cookie_headers(&sessions, &second.id)).await.user.is_some());
    }

    #[tokio::test]
    async fn test_destroy_returns_removal_cookie() {
        let fx = Fixture::new();
        let user = fx.user(3, "carol", None).await;
        let sessions = adapter(&fx);
        let session = sessions.establish(&user, None).await.unwrap();

        let cookie = sessions.destroy(&session.id).await.unwrap();
        assert_eq!(cookie, "warden.sid=; Path=/; SameSite=Lax; Max-Age=0; HttpOnly");
        assert!(sessions.authenticate(&cookie_headers(&sessions, &session.id)).await.user.is_none());
    }

    #[tokio::test]
    async fn test_store_outage_is_anonymous() {
        let fx = Fixture::new();
        let sessions = SessionAdapter::new(
            failing_store(),
            Arc::new(fx.directory.clone()),
            fx.clock(),
            SessionConfig::default(),
        );

        let outcome = sessions.authenticate(&cookie_headers(&sessions, "abc")).await;
        assert!(outcome.user.is_none());
        assert!(outcome.set_cookie.is_none());
    }

    #[test]
    fn test_session_id_ignores_other_cookies() {
        let fx = Fixture::new();
        let sessions = adapter(&fx);

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("warden.sidx=nope; warden.sid="));
        assert_eq!(sessions.session_id(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("a=1;warden.sid=xyz"));
        assert_eq!(sessions.session_id(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_secure_cookie_attribute() {
        let fx = Fixture::new();
        let config = SessionConfig {
            secure: true,
            ..SessionConfig::default()
        };
        let sessions = SessionAdapter::new(fx.store.clone(), Arc::new(fx.directory.clone()), fx.clock(), config);
        assert!(sessions.cookie("abc").ends_with("; HttpOnly; Secure"));
    }
}
