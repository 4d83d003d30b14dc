//! Authentication Middleware for Axum
//!
//! - Resolves the request's principal: bearer token first, session cookie second
//! - Leaves anonymous requests alone; handlers decide if auth is required
//! - Answers with the error response when a presented credential is bad
//! - Forwards the session adapter's `Set-Cookie` to the response

use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{header::SET_COOKIE, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::debug;

use crate::bearer::{extract_bearer, BearerTokenManager};
use crate::error::{AuthError, ErrorResponse};
use crate::session::SessionAdapter;
use crate::throttle::extract_client_ip;
use crate::types::AuthenticatedUser;

/// Paths that skip authentication entirely
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &["/health", "/public"];

/// Authentication middleware layer
#[derive(Clone)]
pub struct AuthLayer {
    bearer: Arc<BearerTokenManager>,
    session: Arc<SessionAdapter>,
    public_paths: Arc<Vec<String>>,
}

impl AuthLayer {
    pub fn new(bearer: Arc<BearerTokenManager>, session: Arc<SessionAdapter>) -> Self {
        Self {
            bearer,
            session,
            public_paths: Arc::new(DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect()),
        }
    }

    /// Replace the public path list. A path matches itself and everything below it.
    pub fn with_public_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.public_paths = Arc::new(paths.into_iter().map(Into::into).collect());
        self
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            bearer: self.bearer.clone(),
            session: self.session.clone(),
            public_paths: self.public_paths.clone(),
        }
    }
}

/// Authentication middleware service
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    bearer: Arc<BearerTokenManager>,
    session: Arc<SessionAdapter>,
    public_paths: Arc<Vec<String>>,
}

fn is_public(public_paths: &[String], path: &str) -> bool {
    public_paths.iter().any(|p| {
        path == p || (path.starts_with(p.as_str()) && path[p.len()..].starts_with('/'))
    })
}

impl<S> Service<Request> for AuthMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let bearer = self.bearer.clone();
        let session = self.session.clone();
        let public = is_public(&self.public_paths, req.uri().path());
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if public {
                return inner.call(req).await;
            }

            match authenticate_request(req.headers(), &bearer, &session).await {
                Ok(resolved) => {
                    let (mut parts, body) = req.into_parts();
                    if let Some(user) = resolved.user {
                        parts.extensions.insert(user);
                    }
                    let req = Request::from_parts(parts, body);

                    let mut response = inner.call(req).await?;
                    if let Some(cookie) = resolved.set_cookie {
                        // A handler that set the session cookie itself (login, logout) wins
                        let cookie_prefix = format!("{}=", session.config().cookie_name);
                        let handler_set = response
                            .headers()
                            .get_all(SET_COOKIE)
                            .iter()
                            .filter_map(|v| v.to_str().ok())
                            .any(|v| v.starts_with(&cookie_prefix));
                        if !handler_set {
                            if let Ok(value) = HeaderValue::from_str(&cookie) {
                                response.headers_mut().append(SET_COOKIE, value);
                            }
                        }
                    }
                    Ok(response)
                }
                Err(e) => Ok(auth_error_response(e)),
            }
        })
    }
}

struct ResolvedAuth {
    user: Option<AuthenticatedUser>,
    set_cookie: Option<String>,
}

/// Bearer token first; an unknown or expired token falls through to the session
async fn authenticate_request(
    headers: &HeaderMap,
    bearer: &BearerTokenManager,
    session: &SessionAdapter,
) -> Result<ResolvedAuth, AuthError> {
    if let Some(token) = extract_bearer(headers) {
        if let Some(user) = bearer.validate(token).await? {
            return Ok(ResolvedAuth {
                user: Some(user),
                set_cookie: None,
            });
        }
        debug!("Bearer token did not resolve, trying session");
    }

    let outcome = session.authenticate(headers).await;
    Ok(ResolvedAuth {
        user: outcome.user,
        set_cookie: outcome.set_cookie,
    })
}

/// Create error response for authentication errors
pub fn auth_error_response(error: AuthError) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let response = ErrorResponse::from(&error);

    let mut res = Response::builder()
        .status(status)
        .header("Content-Type", "application/json");

    // Add Retry-After header for lockouts
    if let Some(retry_after) = response.retry_after {
        res = res.header("Retry-After", retry_after.to_string());
    }

    res.body(Body::from(serde_json::to_string(&response).unwrap_or_default()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

// =============================================================================
// Axum Extractors
// =============================================================================

/// Extractor for authenticated user (optional)
/// Returns None if no valid authentication is present
pub struct OptionalUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalUser(parts.extensions.get::<AuthenticatedUser>().cloned()))
    }
}

/// Extractor for required authenticated user
/// Returns 401 if not authenticated
pub struct RequireAuth(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(RequireAuth)
            .ok_or_else(|| auth_error_response(AuthError::Unauthenticated))
    }
}

/// Client address for throttle keys; works with or without `ConnectInfo`
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(extract_client_ip(&parts.headers, peer)))
    }
}

/// Helper middleware function for routes that require authentication
pub async fn require_auth_middleware(req: Request, next: Next) -> Result<Response, Response> {
    if req.extensions().get::<AuthenticatedUser>().is_none() {
        return Err(auth_error_response(AuthError::Unauthenticated));
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BearerConfig, SessionConfig};
    use crate::testing::Fixture;
    use axum::{http::header::AUTHORIZATION, routing::get, Router};
    use tower::ServiceExt;

    async fn whoami(OptionalUser(user): OptionalUser) -> String {
        user.map(|u| u.username).unwrap_or_else(|| "anonymous".to_string())
    }

    async fn private(RequireAuth(user): RequireAuth) -> String {
        user.user_id.to_string()
    }

    struct Harness {
        fx: Fixture,
        bearer: Arc<BearerTokenManager>,
        session: Arc<SessionAdapter>,
        router: Router,
    }

    fn harness() -> Harness {
        let fx = Fixture::new();
        let users = Arc::new(fx.directory.clone());
        let bearer = Arc::new(BearerTokenManager::new(
            fx.store.clone(),
            users.clone(),
            fx.clock(),
            BearerConfig::default(),
        ));
        let session = Arc::new(SessionAdapter::new(
            fx.store.clone(),
            users,
            fx.clock(),
            SessionConfig::default(),
        ));
        let router = Router::new()
            .route("/whoami", get(whoami))
            .route("/private", get(private))
            .route("/health", get(|| async { "ok" }))
            .layer(AuthLayer::new(bearer.clone(), session.clone()));

        Harness {
            fx,
            bearer,
            session,
            router,
        }
    }

    async fn call(router: &Router, uri: &str, headers: &[(&str, String)]) -> (StatusCode, HeaderMap, String) {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        let response = router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_anonymous_request_passes_through() {
        let h = harness();
        let (status, _, body) = call(&h.router, "/whoami", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");

        let (status, _, _) = call(&h.router, "/private", &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bearer_token_resolves_user() {
        let h = harness();
        let user = h.fx.user(1, "bob", None).await;
        let tokens = h.bearer.issue(&user).await.unwrap();

        let auth = (AUTHORIZATION.as_str(), format!("Bearer {}", tokens.access_token));
        let (status, _, body) = call(&h.router, "/whoami", &[auth]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "bob");
    }

    #[tokio::test]
    async fn test_unknown_bearer_falls_back_to_session() {
        let h = harness();
        let user = h.fx.user(1, "bob", None).await;
        let session = h.session.establish(&user, None).await.unwrap();

        let headers = [
            (AUTHORIZATION.as_str(), "Bearer not-a-token".to_string()),
            ("cookie", format!("warden.sid={}", session.id)),
        ];
        let (status, response_headers, body) = call(&h.router, "/whoami", &headers).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "bob");
        assert!(response_headers.get(SET_COOKIE).is_some());
    }

    #[tokio::test]
    async fn test_blocked_bearer_owner_is_forbidden() {
        let h = harness();
        let user = h.fx.user(1, "bob", None).await;
        let tokens = h.bearer.issue(&user).await.unwrap();
        h.fx.directory.set_blocked(1, true).await.unwrap();

        let auth = (AUTHORIZATION.as_str(), format!("Bearer {}", tokens.access_token));
        let (status, _, body) = call(&h.router, "/whoami", &[auth]).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("ACCOUNT_BLOCKED"));
    }

    #[tokio::test]
    async fn test_public_path_skips_authentication() {
        let h = harness();
        let user = h.fx.user(1, "bob", None).await;
        let tokens = h.bearer.issue(&user).await.unwrap();
        h.fx.directory.set_blocked(1, true).await.unwrap();

        let auth = (AUTHORIZATION.as_str(), format!("Bearer {}", tokens.access_token));
        let (status, _, _) = call(&h.router, "/health", &[auth]).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_public_path_matching() {
        let paths = vec!["/health".to_string(), "/public".to_string()];
        assert!(is_public(&paths, "/health"));
        assert!(is_public(&paths, "/public/logo.png"));
        assert!(!is_public(&paths, "/publicity"));
        assert!(!is_public(&paths, "/auth/current"));
    }

    #[test]
    fn test_locked_response_carries_retry_after() {
        let response = auth_error_response(AuthError::AccountLocked { retry_after: 42 });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "42");
    }
}
