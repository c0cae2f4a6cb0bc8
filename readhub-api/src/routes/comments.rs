/// Comments on books, chapters and posts
///
/// # Endpoints
///
/// - `GET /v1/comments?target_kind=&target_id=` - Top-level comments, newest first
/// - `GET /v1/comments/:id/replies` - Replies, oldest first
/// - `POST /v1/comments` - Comment or reply
/// - `PATCH /v1/comments/:id` - Edit (author only)
/// - `DELETE /v1/comments/:id` - Soft delete (author or admin)

use super::parse_target;
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
    auth::{
        authorization::{require_owner, require_owner_or_admin},
        middleware::AuthContext,
    },
    domain::{CommentId, TargetKind},
    gamification::XpEvent,
    models::comment::{Comment, CreateComment},
    pagination::{Page, PageQuery},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct ListCommentsQuery {
    pub target_kind: String,
    pub target_id: String,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    pub parent_id: Option<CommentId>,

    #[validate(length(min = 1, max = 5000, message = "Comment must be 1 to 5000 characters"))]
    pub body: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 5000, message = "Comment must be 1 to 5000 characters"))]
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedComment {
    pub comment: Comment,
    #[serde(flatten)]
    pub rewards: RewardSummary,
}

fn check_body(body: &str) -> ApiResult<()> {
    if body.trim().is_empty() {
        return Err(ApiError::invalid("body", "Comment must not be blank"));
    }
    Ok(())
}

pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<ListCommentsQuery>,
) -> ApiResult<Json<Page<Comment>>> {
    let (kind, target_id) = parse_target(&query.target_kind, &query.target_id)?;
    let page = PageQuery {
        limit: query.limit,
        cursor: query.cursor,
    }
    .into_request()?;

    Ok(Json(
        Comment::list_for_target(&state.db, kind, target_id, &page).await?,
    ))
}

pub async fn list_replies(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Comment>>> {
    let id = CommentId::parse(&id)?;
    let page = page.into_request()?;

    if Comment::find(&state.db, id).await?.is_none() {
        return Err(ApiError::not_found("Comment"));
    }

    Ok(Json(Comment::list_replies(&state.db, id, &page).await?))
}

pub async fn create_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<CreatedComment>)> {
    req.validate()?;
    check_body(&req.body)?;

    let comment = Comment::create(
        &state.db,
        CreateComment {
            user_id: auth.user_id,
            target_kind: req.target_kind,
            target_id: req.target_id,
            parent_id: req.parent_id,
            body: req.body,
        },
    )
    .await?;

    let rewards = hooks::reward(&state, auth.user_id, XpEvent::Comment).await;

    tracing::debug!(
        comment_id = %comment.id,
        target_kind = %comment.target_kind,
        target_id = %comment.target_id,
        "Comment created"
    );

    Ok((StatusCode::CREATED, Json(CreatedComment { comment, rewards })))
}

pub async fn update_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<UpdateCommentRequest>,
) -> ApiResult<Json<Comment>> {
    let id = CommentId::parse(&id)?;
    req.validate()?;
    check_body(&req.body)?;

    let existing = Comment::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))?;
    require_owner(&auth, existing.user_id)?;

    let comment = Comment::update(&state.db, id, &req.body)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))?;

    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = CommentId::parse(&id)?;

    let existing = Comment::find(&state.db, id)
        .await?
        .filter(|c| !c.deleted)
        .ok_or_else(|| ApiError::not_found("Comment"))?;
    require_owner_or_admin(&auth, existing.user_id)?;

    Comment::soft_delete(&state.db, id).await?;

    tracing::debug!(comment_id = %id, by = %auth.user_id, "Comment deleted");
    Ok(StatusCode::NO_CONTENT)
}
