/// Request authentication for Axum
///
/// Credentials are read from `Authorization: Bearer <token>` first and from
/// the `access_token` cookie second (the web frontend forwards the cookie).
/// After successful validation an [`AuthContext`] is stored in the request
/// extensions, where handlers pick it up as an extractor.
///
/// # Example
///
/// ```no_run
/// use axum::{Router, routing::get, middleware};
/// use readhub_shared::auth::middleware::{require_auth, AuthContext};
///
/// async fn me(auth: AuthContext) -> String {
///     format!("Hello, reader {}!", auth.user_id)
/// }
///
/// let secret = "your-jwt-secret".to_string();
/// let app: Router = Router::new()
///     .route("/me", get(me))
///     .layer(middleware::from_fn(move |req, next| {
///         require_auth(secret.clone(), req, next)
///     }));
/// ```

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

use super::jwt::{validate_access_token, JwtError};
use crate::domain::UserId;
use crate::models::user::UserRole;

/// Name of the cookie carrying the access token
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Authenticated caller, stored in request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: UserId,
    pub role: UserRole,
}

impl AuthContext {
    pub fn new(user_id: UserId, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Optional authentication for public routes that personalize output
///
/// Always succeeds; holds `None` for anonymous callers.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuth(pub Option<AuthContext>);

/// Error type for authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No token in header or cookie
    #[error("Missing credentials")]
    MissingCredentials,

    /// Authorization header present but not a bearer token
    #[error("{0}")]
    InvalidFormat(String),

    /// Token validation failed
    #[error("{0}")]
    InvalidToken(String),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            JwtError::InvalidIssuer => AuthError::InvalidToken("Invalid token issuer".to_string()),
            other => AuthError::InvalidToken(format!("Invalid token: {}", other)),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AuthError::MissingCredentials => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AuthError::InvalidFormat(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AuthError::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
        };

        let body = Json(serde_json::json!({
            "error": code,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Reads a cookie value from the `Cookie` header(s)
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// Extracts the raw access token from the request headers
///
/// Returns `Ok(None)` when no credentials are present at all.
pub fn extract_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| AuthError::InvalidFormat("Authorization header is not valid ASCII".to_string()))?;

        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?;

        return Ok(Some(token));
    }

    Ok(cookie_value(headers, ACCESS_TOKEN_COOKIE))
}

/// Authenticates a request from its headers
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<AuthContext, AuthError> {
    let token = extract_token(headers)?.ok_or(AuthError::MissingCredentials)?;
    let claims = validate_access_token(token, secret)?;
    Ok(AuthContext::new(claims.sub, claims.role))
}

/// Middleware that rejects unauthenticated requests
pub async fn require_auth(secret: String, mut req: Request, next: Next) -> Result<Response, AuthError> {
    let context = authenticate(req.headers(), &secret)?;
    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

/// Middleware that attaches an [`AuthContext`] when valid credentials exist
///
/// Invalid or expired tokens are ignored so public pages keep working for
/// readers whose session lapsed.
pub async fn optional_auth(secret: String, mut req: Request, next: Next) -> Response {
    match authenticate(req.headers(), &secret) {
        Ok(context) => {
            req.extensions_mut().insert(context);
        }
        Err(AuthError::MissingCredentials) => {}
        Err(e) => tracing::debug!(error = %e, "Ignoring invalid credentials on public route"),
    }
    next.run(req).await
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .ok_or(AuthError::MissingCredentials)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuth
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuth(parts.extensions.get::<AuthContext>().copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{create_token, issue_token_pair, Claims, TokenType};
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn headers_with(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer_token() {
        let headers = headers_with(header::AUTHORIZATION, "Bearer abc.def.ghi");
        assert_eq!(extract_token(&headers).unwrap(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_rejects_non_bearer() {
        let headers = headers_with(header::AUTHORIZATION, "Basic dXNlcjpwYXNz");
        assert!(matches!(extract_token(&headers), Err(AuthError::InvalidFormat(_))));

        let headers = headers_with(header::AUTHORIZATION, "Bearer ");
        assert!(extract_token(&headers).is_err());
    }

    #[test]
    fn test_extract_from_cookie() {
        let headers = headers_with(header::COOKIE, "theme=dark; access_token=tok123; lang=en");
        assert_eq!(extract_token(&headers).unwrap(), Some("tok123"));
    }

    #[test]
    fn test_extract_none() {
        assert_eq!(extract_token(&HeaderMap::new()).unwrap(), None);

        let headers = headers_with(header::COOKIE, "access_token=");
        assert_eq!(extract_token(&headers).unwrap(), None);
    }

    #[test]
    fn test_authenticate() {
        let user_id = UserId::new();
        let (access, refresh) = issue_token_pair(user_id, UserRole::Admin, SECRET).unwrap();

        let headers = headers_with(header::AUTHORIZATION, &format!("Bearer {}", access));
        let context = authenticate(&headers, SECRET).unwrap();
        assert_eq!(context.user_id, user_id);
        assert!(context.is_admin());

        let headers = headers_with(header::AUTHORIZATION, &format!("Bearer {}", refresh));
        assert!(matches!(authenticate(&headers, SECRET), Err(AuthError::InvalidToken(_))));

        assert!(matches!(
            authenticate(&HeaderMap::new(), SECRET),
            Err(AuthError::MissingCredentials)
        ));
    }

    #[test]
    fn test_authenticate_expired() {
        let claims = Claims::with_expiration(
            UserId::new(),
            UserRole::Reader,
            TokenType::Access,
            chrono::Duration::seconds(-10),
        );
        let token = create_token(&claims, SECRET).unwrap();
        let headers = headers_with(header::COOKIE, &format!("access_token={}", token));

        match authenticate(&headers, SECRET) {
            Err(AuthError::InvalidToken(msg)) => assert_eq!(msg, "Token expired"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_auth_error_into_response() {
        assert_eq!(AuthError::MissingCredentials.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::InvalidFormat("x".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::InvalidToken("x".to_string()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
