/// Short posts and the follower feed

use super::users::resolve_user;
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
    auth::{authorization::require_owner_or_admin, middleware::AuthContext},
    domain::{BookId, PostId},
    gamification::XpEvent,
    models::{
        book::Book,
        post::{CreatePost, Post},
    },
    pagination::{Page, PageQuery},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 2000, message = "Post must be 1 to 2000 characters"))]
    pub body: String,

    /// Book the post is about
    pub book_id: Option<BookId>,
}

#[derive(Debug, Serialize)]
pub struct CreatedPost {
    pub post: Post,
    #[serde(flatten)]
    pub rewards: RewardSummary,
}

pub async fn list_by_user(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Post>>> {
    let page = page.into_request()?;
    let user = resolve_user(&state, &user).await?;
    Ok(Json(Post::list_by_user(&state.db, user.id, &page).await?))
}

pub async fn create_post(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<CreatedPost>)> {
    req.validate()?;
    let body = req.body.trim().to_string();
    if body.is_empty() {
        return Err(ApiError::invalid("body", "Post must not be blank"));
    }

    if let Some(book_id) = req.book_id {
        if Book::find_by_id(&state.db, book_id).await?.is_none() {
            return Err(ApiError::invalid("book_id", "Book not found"));
        }
    }

    let post = Post::create(
        &state.db,
        CreatePost {
            user_id: auth.user_id,
            body,
            book_id: req.book_id,
        },
    )
    .await?;

    let rewards = hooks::reward(&state, auth.user_id, XpEvent::Post).await;

    Ok((StatusCode::CREATED, Json(CreatedPost { post, rewards })))
}

pub async fn delete_post(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = PostId::parse(&id)?;

    let post = Post::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post"))?;
    require_owner_or_admin(&auth, post.user_id)?;

    Post::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Posts by the people the caller follows, plus their own
pub async fn feed(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Post>>> {
    let page = page.into_request()?;
    Ok(Json(Post::feed(&state.db, auth.user_id, &page).await?))
}
