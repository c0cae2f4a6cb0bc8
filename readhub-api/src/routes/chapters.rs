/// Chapter endpoints
///
/// Reading a chapter while signed in records the read, extends the daily
/// streak and awards first-read XP. Writes are admin only; `import` hands a
/// URL to the worker's scraper instead of taking content inline.

use super::{books::find_visible, non_empty};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    hooks::{self, ReadingReward},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use readhub_shared::{
    auth::{
        authorization::require_admin,
        middleware::{AuthContext, MaybeAuth},
    },
    domain::ChapterId,
    models::{
        book::Book,
        chapter::{Chapter, ChapterSummary, CreateChapter, Neighbours, UpdateChapter},
        job::{Job, JobKind, ScrapePayload},
    },
};
use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChapterRequest {
    /// Next free number when absent
    #[validate(range(min = 1, message = "Chapter numbers start at 1"))]
    pub number: Option<i32>,

    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 500000, message = "Content must be 1 to 500000 characters"))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateChapterRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 500000, message = "Content must be 1 to 500000 characters"))]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ImportChapterRequest {
    #[validate(url(message = "A valid URL is required"))]
    pub url: String,

    #[validate(range(min = 1, message = "Chapter numbers start at 1"))]
    pub chapter_number: Option<i32>,

    /// Overrides the scraped title
    #[validate(length(max = 255, message = "Title must be at most 255 characters"))]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookRef {
    pub id: readhub_shared::domain::BookId,
    pub slug: String,
    pub title: String,
}

impl From<&Book> for BookRef {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            slug: book.slug.clone(),
            title: book.title.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChapterView {
    pub chapter: Chapter,
    pub book: BookRef,
    #[serde(flatten)]
    pub neighbours: Neighbours,
    /// Present when the reader is signed in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<ReadingReward>,
}

/// Scraping only follows http(s) links
fn parse_import_url(raw: &str) -> ApiResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|_| ApiError::invalid("url", "A valid URL is required"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ApiError::invalid(
            "url",
            format!("Unsupported URL scheme: {}", other),
        )),
    }
}

pub async fn list_chapters(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    Path(book): Path<String>,
) -> ApiResult<Json<Vec<ChapterSummary>>> {
    let admin = auth.as_ref().map(AuthContext::is_admin).unwrap_or(false);
    let book = find_visible(&state, &book, admin).await?;
    Ok(Json(Chapter::list_for_book(&state.db, book.id).await?))
}

/// Chapter text with prev/next numbers
pub async fn read_chapter(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    Path((book, number)): Path<(String, i32)>,
) -> ApiResult<Json<ChapterView>> {
    let admin = auth.as_ref().map(AuthContext::is_admin).unwrap_or(false);
    let book = find_visible(&state, &book, admin).await?;

    let chapter = Chapter::find_by_number(&state.db, book.id, number)
        .await?
        .ok_or_else(|| ApiError::not_found("Chapter"))?;
    let neighbours = Chapter::neighbours(&state.db, book.id, number).await?;

    let reading = match auth {
        Some(auth) => Some(hooks::reward_reading(&state, auth.user_id, chapter.id, book.id).await),
        None => None,
    };

    Ok(Json(ChapterView {
        chapter,
        book: BookRef::from(&book),
        neighbours,
        reading,
    }))
}

pub async fn create_chapter(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(book): Path<String>,
    Json(req): Json<CreateChapterRequest>,
) -> ApiResult<(StatusCode, Json<Chapter>)> {
    require_admin(&auth)?;
    req.validate()?;
    let book = find_visible(&state, &book, true).await?;

    let chapter = Chapter::create(
        &state.db,
        CreateChapter {
            book_id: book.id,
            number: req.number,
            title: req.title.trim().to_string(),
            content: req.content,
            source_url: None,
        },
    )
    .await?;

    hooks::invalidate_books(&state).await;

    tracing::info!(book_id = %book.id, chapter_id = %chapter.id, number = chapter.number, "Chapter created");
    Ok((StatusCode::CREATED, Json(chapter)))
}

/// Queue a scrape of `url` into a new chapter
pub async fn import_chapter(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(book): Path<String>,
    Json(req): Json<ImportChapterRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    require_admin(&auth)?;
    req.validate()?;
    let url = parse_import_url(&req.url)?;
    let book = find_visible(&state, &book, true).await?;

    let job = Job::enqueue(
        &state.db,
        JobKind::Scrape,
        &ScrapePayload {
            book_id: book.id,
            url: url.to_string(),
            chapter_number: req.chapter_number,
            title: non_empty(req.title),
            requested_by: Some(auth.user_id),
        },
    )
    .await?;

    tracing::info!(book_id = %book.id, job_id = %job.id, url = %url, "Chapter import queued");
    Ok((StatusCode::ACCEPTED, Json(job)))
}

pub async fn update_chapter(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<UpdateChapterRequest>,
) -> ApiResult<Json<Chapter>> {
    require_admin(&auth)?;
    let id = ChapterId::parse(&id)?;
    req.validate()?;

    let chapter = Chapter::update(
        &state.db,
        id,
        UpdateChapter {
            title: req.title.map(|t| t.trim().to_string()),
            content: req.content,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Chapter"))?;

    hooks::invalidate_books(&state).await;
    Ok(Json(chapter))
}

pub async fn delete_chapter(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_admin(&auth)?;
    let id = ChapterId::parse(&id)?;

    let book_id = Chapter::delete(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chapter"))?;

    hooks::invalidate_books(&state).await;
    tracing::info!(book_id = %book_id, chapter_id = %id, "Chapter deleted");
    Ok(StatusCode::NO_CONTENT)
}
