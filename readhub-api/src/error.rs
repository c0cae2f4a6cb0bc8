/// Error handling for the API server
///
/// Every handler returns [`ApiResult`]. Errors from the shared crate convert
/// into [`ApiError`] with `?`, which renders as
/// `{ "error": code, "message": text, "details"?: [...] }` with the matching
/// HTTP status.
///
/// # Example
///
/// ```
/// use readhub_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler(found: bool) -> ApiResult<Json<serde_json::Value>> {
///     if !found {
///         return Err(ApiError::NotFound("Book not found".to_string()));
///     }
///     Ok(Json(json!({ "ok": true })))
/// }
/// ```

use axum::{
    extract::multipart::MultipartError,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use readhub_shared::{
    auth::{authorization::AuthzError, jwt::JwtError, middleware::AuthError, password::PasswordError},
    domain::{IdError, ValueError},
    models::{
        comment::CommentError, follow::FollowError, reading::ReadingError, unique_violation,
    },
    onboarding::OnboardingError,
    pagination::CursorError,
    storage::StorageError,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::ValidationErrors;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// 400
    BadRequest(String),

    /// 401
    Unauthorized(String),

    /// 403
    Forbidden(String),

    /// 404
    NotFound(String),

    /// 409, e.g. duplicate email
    Conflict(String),

    /// 413
    PayloadTooLarge(String),

    /// 422
    ValidationError(Vec<ValidationErrorDetail>),

    /// 429
    RateLimitExceeded {
        retry_after: u64,
        message: String,
    },

    /// 500, details are logged and not returned
    InternalError(String),

    /// 503
    ServiceUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine readable code, e.g. `not_found`
    pub error: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation failure
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail::new(field, message)])
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{} not found", what))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::ValidationError(_) => "validation_error",
            ApiError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            ApiError::InternalError(_) => "internal_error",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::RateLimitExceeded { message, .. } => write!(f, "Rate limit exceeded: {}", message),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let retry_after = match &self {
            ApiError::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        };

        let (message, details) = match self {
            ApiError::ValidationError(errors) => ("Request validation failed".to_string(), Some(errors)),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                ("An internal error occurred".to_string(), None)
            }
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::RateLimitExceeded { message: msg, .. } => (msg, None),
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message,
            details,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

/// Conflict message for a violated unique constraint
fn conflict_message(constraint: &str) -> String {
    match constraint {
        "users_email_key" => "Email already registered".to_string(),
        "users_username_key" => "Username already taken".to_string(),
        "genres_slug_key" => "Genre already exists".to_string(),
        "books_slug_key" => "A book with this slug already exists".to_string(),
        "chapters_book_number_key" => "Chapter number already exists in this book".to_string(),
        other => format!("Constraint violation: {}", other),
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(constraint) = unique_violation(&err) {
            return ApiError::Conflict(conflict_message(&constraint));
        }

        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::PoolTimedOut => {
                ApiError::ServiceUnavailable("Database is busy, try again".to_string())
            }
            other => ApiError::InternalError(format!("Database error: {}", other)),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => ApiError::Unauthorized("Missing credentials".to_string()),
            AuthError::InvalidFormat(msg) => ApiError::BadRequest(msg),
            AuthError::InvalidToken(msg) => ApiError::Unauthorized(msg),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer => ApiError::Unauthorized("Invalid token issuer".to_string()),
            JwtError::CreateError(msg) => ApiError::InternalError(format!("Token creation failed: {}", msg)),
            other => ApiError::Unauthorized(format!("Invalid token: {}", other)),
        }
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ValueError> for ApiError {
    fn from(err: ValueError) -> Self {
        match err {
            ValueError::InvalidSlug(_) => ApiError::invalid("slug", err.to_string()),
            ValueError::InvalidUsername(_) => ApiError::invalid("username", err.to_string()),
            ValueError::UnknownTarget(_) | ValueError::UnsupportedTarget(_) => {
                ApiError::BadRequest(err.to_string())
            }
        }
    }
}

impl From<CursorError> for ApiError {
    fn from(err: CursorError) -> Self {
        ApiError::BadRequest(format!("Invalid cursor: {}", err))
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Empty | StorageError::UnsupportedType(_) => {
                ApiError::invalid("file", err.to_string())
            }
            StorageError::TooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            StorageError::InvalidNamespace(_) | StorageError::ForeignUrl(_) | StorageError::Io(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err))
    }
}

impl From<OnboardingError> for ApiError {
    fn from(err: OnboardingError) -> Self {
        match err {
            OnboardingError::AlreadyCompleted | OnboardingError::CannotGoBack(_) => {
                ApiError::Conflict(err.to_string())
            }
            OnboardingError::MissingGenres
            | OnboardingError::TooManyGenres
            | OnboardingError::UnknownGenre(_) => ApiError::invalid("genres", err.to_string()),
            OnboardingError::MissingReadingGoal | OnboardingError::InvalidReadingGoal(_) => {
                ApiError::invalid("reading_goal", err.to_string())
            }
        }
    }
}

impl From<CommentError> for ApiError {
    fn from(err: CommentError) -> Self {
        match err {
            CommentError::NotCommentable(_) => ApiError::BadRequest(err.to_string()),
            CommentError::TargetNotFound | CommentError::ParentNotFound => {
                ApiError::NotFound(err.to_string())
            }
            CommentError::ParentMismatch | CommentError::NestedReply => {
                ApiError::invalid("parent_id", err.to_string())
            }
            CommentError::Deleted => ApiError::Conflict(err.to_string()),
            CommentError::Database(e) => e.into(),
        }
    }
}

impl From<FollowError> for ApiError {
    fn from(err: FollowError) -> Self {
        match err {
            FollowError::SelfFollow => ApiError::BadRequest(err.to_string()),
            FollowError::UserNotFound => ApiError::NotFound(err.to_string()),
            FollowError::Database(e) => e.into(),
        }
    }
}

impl From<ReadingError> for ApiError {
    fn from(err: ReadingError) -> Self {
        match err {
            ReadingError::BookNotFound => ApiError::NotFound(err.to_string()),
            ReadingError::ChapterNotInBook => ApiError::invalid("chapter_id", err.to_string()),
            ReadingError::Database(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readhub_shared::domain::TargetKind;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::not_found("User");
        assert_eq!(err.to_string(), "Not found: User not found");
    }

    #[test]
    fn test_validation_error() {
        let err = ApiError::ValidationError(vec![
            ValidationErrorDetail::new("email", "Invalid email format"),
            ValidationErrorDetail::new("password", "Password too short"),
        ]);
        assert_eq!(err.to_string(), "Validation failed: 2 errors");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError::RateLimitExceeded {
            retry_after: 42,
            message: "slow down".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "42");
    }

    #[test]
    fn test_shared_error_mapping() {
        assert_eq!(ApiError::from(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(CursorError::Malformed).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(IdError::Malformed("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(AuthzError::AdminRequired).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(AuthError::MissingCredentials).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(JwtError::Expired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(StorageError::TooLarge { max: 10 }).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(StorageError::UnsupportedType("text/html".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(OnboardingError::AlreadyCompleted).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(OnboardingError::TooManyGenres).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(CommentError::NotCommentable(TargetKind::Comment)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(CommentError::NestedReply).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::from(FollowError::SelfFollow).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(ReadingError::BookNotFound).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflict_messages() {
        assert_eq!(conflict_message("users_email_key"), "Email already registered");
        assert_eq!(conflict_message("other_key"), "Constraint violation: other_key");
    }

    #[test]
    fn test_internal_error_is_hidden() {
        let response = ApiError::InternalError("secret detail".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
