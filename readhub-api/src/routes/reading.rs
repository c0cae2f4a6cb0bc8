/// Reading progress and reading lists
///
/// # Endpoints
///
/// - `PUT /v1/reading/progress` - Move the bookmark in a book
/// - `GET /v1/reading/progress/:book_id` - Bookmark for one book
/// - `GET /v1/reading/continue` - Books in progress, most recent first
/// - `GET /v1/reading/list?status=` - Shelf contents
/// - `PUT /v1/reading/list/:book_id` - Shelve a book
/// - `DELETE /v1/reading/list/:book_id` - Remove from the shelf
///
/// Moving a book to `completed` awards the finish-book XP the first time
/// only; shelving it elsewhere and back does not pay again.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    hooks::{self, RewardSummary},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use readhub_shared::{
    auth::middleware::AuthContext,
    domain::{BookId, ChapterId},
    gamification::XpEvent,
    models::reading::{
        ContinueReading, ProgressUpdate, Reading, ReadingListEntry, ReadingProgress, ReadingStatus,
    },
    pagination::{Page, PageQuery},
};
use serde::{Deserialize, Serialize};

const DEFAULT_CONTINUE_LIMIT: i64 = 10;
const MAX_CONTINUE_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub book_id: BookId,
    pub chapter_id: Option<ChapterId>,
    /// Clamped to 0..=100
    #[serde(default)]
    pub percent: i32,
}

#[derive(Debug, Deserialize)]
pub struct ContinueQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<ReadingStatus>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: ReadingStatus,
}

#[derive(Debug, Serialize)]
pub struct ShelvedBook {
    pub entry: ReadingListEntry,
    pub previous_status: Option<ReadingStatus>,
    #[serde(flatten)]
    pub rewards: RewardSummary,
}

pub async fn update_progress(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ProgressRequest>,
) -> ApiResult<Json<ReadingProgress>> {
    let progress = Reading::upsert_progress(
        &state.db,
        auth.user_id,
        ProgressUpdate {
            book_id: req.book_id,
            chapter_id: req.chapter_id,
            percent: req.percent,
        },
    )
    .await?;

    Ok(Json(progress))
}

pub async fn get_progress(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(book_id): Path<String>,
) -> ApiResult<Json<ReadingProgress>> {
    let book_id = BookId::parse(&book_id)?;
    let progress = Reading::get_progress(&state.db, auth.user_id, book_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Reading progress"))?;
    Ok(Json(progress))
}

pub async fn continue_reading(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ContinueQuery>,
) -> ApiResult<Json<Vec<ContinueReading>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_CONTINUE_LIMIT)
        .clamp(1, MAX_CONTINUE_LIMIT);
    Ok(Json(
        Reading::continue_reading(&state.db, auth.user_id, limit).await?,
    ))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<ReadingListEntry>>> {
    let page = PageQuery {
        limit: query.limit,
        cursor: query.cursor,
    }
    .into_request()?;

    Ok(Json(
        Reading::list(&state.db, auth.user_id, query.status, &page).await?,
    ))
}

pub async fn set_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(book_id): Path<String>,
    Json(req): Json<SetStatusRequest>,
) -> ApiResult<Json<ShelvedBook>> {
    let book_id = BookId::parse(&book_id)?;

    let change = Reading::set_list_status(&state.db, auth.user_id, book_id, req.status).await?;

    let rewards = if change.first_finish {
        hooks::reward(&state, auth.user_id, XpEvent::FinishBook).await
    } else {
        RewardSummary::default()
    };

    Ok(Json(ShelvedBook {
        entry: change.entry,
        previous_status: change.previous,
        rewards,
    }))
}

pub async fn remove(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(book_id): Path<String>,
) -> ApiResult<StatusCode> {
    let book_id = BookId::parse(&book_id)?;

    if !Reading::remove_from_list(&state.db, auth.user_id, book_id).await? {
        return Err(ApiError::not_found("Reading list entry"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_status_request() {
        let req: SetStatusRequest =
            serde_json::from_value(serde_json::json!({ "status": "want_to_read" })).unwrap();
        assert_eq!(req.status, ReadingStatus::WantToRead);
        assert!(serde_json::from_value::<SetStatusRequest>(serde_json::json!({ "status": "done" })).is_err());
    }

    #[test]
    fn test_progress_request_defaults() {
        let req: ProgressRequest = serde_json::from_value(serde_json::json!({
            "book_id": BookId::new()
        }))
        .unwrap();
        assert_eq!(req.percent, 0);
        assert!(req.chapter_id.is_none());
    }
}
