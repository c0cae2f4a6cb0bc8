/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Create an account and get tokens
/// - `POST /v1/auth/login` - Exchange credentials for tokens
/// - `POST /v1/auth/refresh` - Exchange a refresh token for an access token
/// - `GET /v1/auth/me` - The signed-in reader

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, http::StatusCode, Json};
use readhub_shared::{
    auth::{jwt, middleware::AuthContext, password},
    domain::Username,
    gamification::LevelInfo,
    models::user::{CreateUser, User},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 3, max = 30, message = "Username must be 3 to 30 characters"))]
    pub username: String,

    /// Checked for strength after the length check
    #[validate(length(min = 8, max = 128, message = "Password must be 8 to 128 characters"))]
    pub password: String,

    #[validate(length(max = 100, message = "Display name must be at most 100 characters"))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Tokens plus the account they belong to
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,

    /// Valid for 24 hours
    pub access_token: String,

    /// Valid for 30 days
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub level: LevelInfo,
}

/// Register a new reader
///
/// ```text
/// POST /v1/auth/register
///
/// { "email": "ada@example.com", "username": "ada", "password": "Sup3rSecret" }
/// ```
///
/// # Errors
///
/// - `409 Conflict`: email or username taken
/// - `422 Unprocessable Entity`: validation failed
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;
    let username = Username::parse(&req.username)?;
    password::validate_password_strength(&req.password)
        .map_err(|message| ApiError::invalid("password", message))?;

    let password_hash = password::hash_password(&req.password)?;

    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email.trim().to_lowercase(),
            username: username.into(),
            password_hash,
            display_name: super::non_empty(req.display_name),
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");

    let (access_token, refresh_token) =
        jwt::issue_token_pair(user.id, user.role, state.jwt_secret())?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user,
            access_token,
            refresh_token,
        }),
    ))
}

/// Log in with email and password
///
/// Unknown email and wrong password give the same `401`.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let user = User::find_by_email(&state.db, req.email.trim())
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
        return Err(ApiError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    User::update_last_login(&state.db, user.id).await?;

    let (access_token, refresh_token) =
        jwt::issue_token_pair(user.id, user.role, state.jwt_secret())?;

    Ok(Json(AuthResponse {
        user,
        access_token,
        refresh_token,
    }))
}

/// Issue a new access token
///
/// The role is reloaded so a promotion or demotion takes effect on the next
/// refresh.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let claims = jwt::validate_refresh_token(&req.refresh_token, state.jwt_secret())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

    let access_token = jwt::issue_access_token(user.id, user.role, state.jwt_secret())?;

    Ok(Json(RefreshResponse { access_token }))
}

pub async fn me(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<MeResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let level = user.level();
    Ok(Json(MeResponse { user, level }))
}
