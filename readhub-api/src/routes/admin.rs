/// Admin endpoints: analytics, user roles, job queue
///
/// Every handler starts with `require_admin`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use readhub_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    domain::UserId,
    models::{
        analytics::{Analytics, DailyCount, JobStateCount, Overview, TopBook},
        job::{Job, JobState},
        user::{User, UserRole},
    },
    pagination::{OffsetPage, OffsetParams},
};
use serde::{Deserialize, Serialize};

const DEFAULT_SIGNUP_DAYS: i32 = 30;
const TOP_BOOKS: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub days: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub overview: Overview,
    pub signups_per_day: Vec<DailyCount>,
    pub top_books_by_likes: Vec<TopBook>,
    pub top_books_by_readers: Vec<TopBook>,
    pub jobs: Vec<JobStateCount>,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    pub state: Option<JobState>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn analytics(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<AnalyticsResponse>> {
    require_admin(&auth)?;
    let days = query.days.unwrap_or(DEFAULT_SIGNUP_DAYS);

    let (overview, signups_per_day, top_books_by_likes, top_books_by_readers, jobs) = tokio::try_join!(
        Analytics::overview(&state.db),
        Analytics::signups_per_day(&state.db, days),
        Analytics::top_books_by_likes(&state.db, TOP_BOOKS),
        Analytics::top_books_by_readers(&state.db, TOP_BOOKS),
        Analytics::jobs_by_state(&state.db),
    )?;

    Ok(Json(AnalyticsResponse {
        overview,
        signups_per_day,
        top_books_by_likes,
        top_books_by_readers,
        jobs,
    }))
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<OffsetParams>,
) -> ApiResult<Json<OffsetPage<User>>> {
    require_admin(&auth)?;

    let users = User::list(&state.db, params.per_page(), params.offset()).await?;
    let total = User::count(&state.db).await?;

    Ok(Json(OffsetPage::new(users, total, &params)))
}

/// Promote or demote a user
///
/// Admins cannot change their own role, so the last admin cannot lock
/// everyone out.
pub async fn set_role(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<SetRoleRequest>,
) -> ApiResult<Json<User>> {
    require_admin(&auth)?;
    let id = UserId::parse(&id)?;

    if id == auth.user_id {
        return Err(ApiError::Forbidden("You cannot change your own role".to_string()));
    }

    let user = User::set_role(&state.db, id, req.role)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    tracing::info!(user_id = %id, role = req.role.as_str(), admin = %auth.user_id, "Role changed");
    Ok(Json(user))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<JobsQuery>,
) -> ApiResult<Json<OffsetPage<Job>>> {
    require_admin(&auth)?;

    let params = OffsetParams {
        page: query.page,
        per_page: query.per_page,
    };
    let jobs = Job::list(&state.db, query.state, params.per_page(), params.offset()).await?;
    let total = Job::count(&state.db, query.state).await?;

    Ok(Json(OffsetPage::new(jobs, total, &params)))
}
