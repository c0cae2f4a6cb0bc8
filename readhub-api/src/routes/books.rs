/// Book catalogue endpoints
///
/// # Endpoints
///
/// - `GET /v1/books` - Filtered, cursor-paged listing
/// - `GET /v1/books/search/semantic?q=` - Similarity search over book embeddings
/// - `GET /v1/books/:book` - Detail by slug or id
/// - `POST /v1/books` - Create (admin)
/// - `PATCH /v1/books/:book` - Update (admin)
/// - `DELETE /v1/books/:book` - Delete (admin)
/// - `POST /v1/books/:book/cover` - Upload a cover image (admin, multipart)
///
/// Drafts are visible to admins only. Detail and first-page listings are
/// cached; every write drops the whole book cache.

use super::{non_empty, read_file_field, users::discard_file};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    hooks,
};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use readhub_shared::{
    auth::{
        authorization::require_admin,
        middleware::{AuthContext, MaybeAuth},
    },
    cache::{jittered_ttl, keys, DEFAULT_TTL_SECS},
    domain::BookId,
    models::{
        book::{Book, BookFilter, BookStatus, CreateBook, UpdateBook},
        chapter::Chapter,
        embedding::BookEmbedding,
        genre::Genre,
    },
    pagination::{Page, PageQuery},
    search, storage,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Most results a semantic search returns
pub const MAX_SEARCH_RESULTS: usize = 50;

/// Similarity below which a book is not a match
pub const MIN_SEARCH_SCORE: f32 = 0.05;

#[derive(Debug, Default, Deserialize)]
pub struct ListBooksQuery {
    pub genre: Option<String>,
    pub status: Option<BookStatus>,
    pub q: Option<String>,
    /// Admins only
    pub drafts: Option<bool>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SemanticSearchQuery {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 255, message = "Author must be 1 to 255 characters"))]
    pub author: String,

    #[serde(default)]
    #[validate(length(max = 10000, message = "Description must be at most 10000 characters"))]
    pub description: String,

    /// Defaults to draft
    pub status: Option<BookStatus>,

    /// Genre slugs; each must exist
    #[serde(default)]
    #[validate(length(max = 10, message = "At most 10 genres"))]
    pub genres: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateBookRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 255, message = "Author must be 1 to 255 characters"))]
    pub author: Option<String>,

    #[validate(length(max = 10000, message = "Description must be at most 10000 characters"))]
    pub description: Option<String>,

    pub status: Option<BookStatus>,

    #[validate(length(max = 10, message = "At most 10 genres"))]
    pub genres: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDetail {
    #[serde(flatten)]
    pub book: Book,
    pub chapter_count: i64,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub book: Book,
    pub score: f32,
}

fn is_admin(auth: &Option<AuthContext>) -> bool {
    auth.as_ref().map(AuthContext::is_admin).unwrap_or(false)
}

/// Loads a book by id or slug, hiding drafts from non-admins
pub(crate) async fn find_visible(state: &AppState, raw: &str, admin: bool) -> ApiResult<Book> {
    let book = match BookId::parse(raw) {
        Ok(id) => Book::find_by_id(&state.db, id).await?,
        Err(_) => Book::find_by_slug(&state.db, raw).await?,
    };

    book.filter(|b| admin || b.status != BookStatus::Draft)
        .ok_or_else(|| ApiError::not_found("Book"))
}

/// Rejects genre slugs that are not in the catalogue
async fn check_genres(state: &AppState, genres: &[String]) -> ApiResult<Vec<String>> {
    let mut wanted: Vec<String> = genres
        .iter()
        .map(|g| g.trim().to_lowercase())
        .filter(|g| !g.is_empty())
        .collect();
    wanted.sort();
    wanted.dedup();

    if wanted.is_empty() {
        return Ok(wanted);
    }

    let known = Genre::find_by_slugs(&state.db, &wanted).await?;
    if let Some(missing) = wanted
        .iter()
        .find(|slug| !known.iter().any(|g| &g.slug == *slug))
    {
        return Err(ApiError::invalid("genres", format!("Unknown genre: {}", missing)));
    }

    Ok(wanted)
}

pub async fn list_books(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    Query(query): Query<ListBooksQuery>,
) -> ApiResult<Json<Page<Book>>> {
    let page = PageQuery {
        limit: query.limit,
        cursor: query.cursor,
    }
    .into_request()?;

    let filter = BookFilter {
        genre: non_empty(query.genre).map(|g| g.to_lowercase()),
        status: query.status,
        query: non_empty(query.q),
        include_drafts: query.drafts.unwrap_or(false) && is_admin(&auth),
    };

    let cache_key = (page.cursor.is_none() && filter.query.is_none() && !filter.include_drafts)
        .then(|| {
            keys::book_list(
                filter.genre.as_deref(),
                filter.status.map(|s| s.as_str()),
                page.limit,
            )
        });

    if let (Some(cache), Some(key)) = (&state.cache, &cache_key) {
        if let Some(books) = cache.get_json::<Page<Book>>(key).await {
            return Ok(Json(books));
        }
    }

    let books = Book::list(&state.db, &filter, &page).await?;

    if let (Some(cache), Some(key)) = (&state.cache, &cache_key) {
        cache.set_json(key, &books, jittered_ttl(DEFAULT_TTL_SECS)).await;
    }

    Ok(Json(books))
}

pub async fn get_book(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    Path(book): Path<String>,
) -> ApiResult<Json<BookDetail>> {
    let by_slug = BookId::parse(&book).is_err();

    if by_slug {
        if let Some(cache) = &state.cache {
            if let Some(detail) = cache.get_json::<BookDetail>(&keys::book(&book)).await {
                return Ok(Json(detail));
            }
        }
    }

    let book = find_visible(&state, &book, is_admin(&auth)).await?;
    let chapter_count = Chapter::count_for_book(&state.db, book.id).await?;
    let detail = BookDetail {
        book,
        chapter_count,
    };

    // Drafts are never cached so they cannot leak to readers
    if by_slug && detail.book.status != BookStatus::Draft {
        if let Some(cache) = &state.cache {
            cache
                .set_json(&keys::book(&detail.book.slug), &detail, jittered_ttl(DEFAULT_TTL_SECS))
                .await;
        }
    }

    Ok(Json(detail))
}

pub async fn create_book(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateBookRequest>,
) -> ApiResult<(StatusCode, Json<Book>)> {
    require_admin(&auth)?;
    req.validate()?;
    let genres = check_genres(&state, &req.genres).await?;

    let slug = Book::available_slug(&state.db, &req.title).await?;
    let book = Book::create(
        &state.db,
        &slug,
        CreateBook {
            title: req.title,
            author: req.author,
            description: req.description.trim().to_string(),
            status: req.status.unwrap_or(BookStatus::Draft),
            genres,
            created_by: Some(auth.user_id),
        },
    )
    .await?;

    hooks::invalidate_books(&state).await;
    hooks::enqueue_embed(&state, book.id).await;

    tracing::info!(book_id = %book.id, slug = %book.slug, "Book created");
    Ok((StatusCode::CREATED, Json(book)))
}

pub async fn update_book(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(book): Path<String>,
    Json(req): Json<UpdateBookRequest>,
) -> ApiResult<Json<Book>> {
    require_admin(&auth)?;
    let book_id = BookId::parse(&book)?;
    req.validate()?;

    let genres = match &req.genres {
        Some(genres) => Some(check_genres(&state, genres).await?),
        None => None,
    };

    let book = Book::update(
        &state.db,
        book_id,
        UpdateBook {
            title: req.title,
            author: req.author,
            description: req.description.map(|d| d.trim().to_string()),
            status: req.status,
            genres,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Book"))?;

    hooks::invalidate_books(&state).await;
    hooks::enqueue_embed(&state, book.id).await;

    Ok(Json(book))
}

pub async fn delete_book(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(book): Path<String>,
) -> ApiResult<StatusCode> {
    require_admin(&auth)?;
    let book_id = BookId::parse(&book)?;

    let book = Book::find_by_id(&state.db, book_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book"))?;

    if !Book::delete(&state.db, book_id).await? {
        return Err(ApiError::not_found("Book"));
    }

    if let Some(cover) = &book.cover_url {
        discard_file(&state, cover).await;
    }
    hooks::invalidate_books(&state).await;

    tracing::info!(book_id = %book_id, admin = %auth.user_id, "Book deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the cover with an uploaded image (multipart field `file`)
pub async fn upload_cover(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(book): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<Book>> {
    require_admin(&auth)?;
    let book_id = BookId::parse(&book)?;

    let (bytes, content_type) = read_file_field(&mut multipart).await?;
    if !storage::is_image(&content_type) {
        return Err(ApiError::invalid("file", "Cover must be a PNG, JPEG, WebP or GIF image"));
    }

    let stored = state.storage.save(&bytes, &content_type, "covers").await?;

    let previous = match Book::set_cover(&state.db, book_id, Some(stored.url.clone())).await {
        Ok(Some(previous)) => previous,
        Ok(None) => {
            discard_file(&state, &stored.url).await;
            return Err(ApiError::not_found("Book"));
        }
        Err(e) => {
            discard_file(&state, &stored.url).await;
            return Err(e.into());
        }
    };

    if let Some(old) = previous {
        discard_file(&state, &old).await;
    }
    hooks::invalidate_books(&state).await;

    let book = Book::find_by_id(&state.db, book_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Book"))?;
    Ok(Json(book))
}

/// Books ranked by similarity to a free-text query
pub async fn semantic_search(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    Query(query): Query<SemanticSearchQuery>,
) -> ApiResult<Json<Vec<SearchHit>>> {
    let text = non_empty(query.q).ok_or_else(|| ApiError::invalid("q", "A search query is required"))?;
    let limit = query.limit.unwrap_or(10).clamp(1, MAX_SEARCH_RESULTS);

    let vector = state.embedder.embed(&text);
    let embeddings =
        BookEmbedding::all(&state.db, state.embedder.model(), is_admin(&auth)).await?;

    let ranked = search::rank(
        &vector,
        embeddings
            .iter()
            .map(|e| (e.book_id.as_uuid(), e.vector.as_slice())),
        limit,
        MIN_SEARCH_SCORE,
    );

    let ids: Vec<BookId> = ranked.iter().map(|hit| BookId::from(hit.id)).collect();
    let mut books = Book::find_many(&state.db, &ids).await?;

    let hits = ranked
        .iter()
        .filter_map(|hit| {
            let index = books.iter().position(|b| b.id.as_uuid() == hit.id)?;
            Some(SearchHit {
                book: books.swap_remove(index),
                score: hit.score,
            })
        })
        .collect();

    Ok(Json(hits))
}
