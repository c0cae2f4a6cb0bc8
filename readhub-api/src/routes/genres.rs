/// Genre catalogue
///
/// Listing is public and cached; creating and deleting need an admin.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    hooks,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use readhub_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    cache::{jittered_ttl, keys, DEFAULT_TTL_SECS},
    domain::{slugify, GenreSlug},
    models::genre::{CreateGenre, Genre},
};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGenreRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be 1 to 50 characters"))]
    pub name: String,

    /// Derived from the name when absent
    pub slug: Option<String>,
}

pub async fn list_genres(State(state): State<AppState>) -> ApiResult<Json<Vec<Genre>>> {
    if let Some(cache) = &state.cache {
        if let Some(genres) = cache.get_json::<Vec<Genre>>(&keys::genres()).await {
            return Ok(Json(genres));
        }
    }

    let genres = Genre::list(&state.db).await?;

    if let Some(cache) = &state.cache {
        cache
            .set_json(&keys::genres(), &genres, jittered_ttl(DEFAULT_TTL_SECS))
            .await;
    }

    Ok(Json(genres))
}

pub async fn create_genre(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateGenreRequest>,
) -> ApiResult<(StatusCode, Json<Genre>)> {
    require_admin(&auth)?;
    req.validate()?;

    let name = req.name.trim().to_string();
    let slug = match req.slug.as_deref().map(str::trim) {
        Some(slug) if !slug.is_empty() => GenreSlug::parse(slug)?,
        _ => GenreSlug::parse(&slugify(&name))?,
    };

    let genre = Genre::create(&state.db, CreateGenre { slug, name }).await?;
    hooks::invalidate_genres(&state).await;

    tracing::info!(slug = %genre.slug, admin = %auth.user_id, "Genre created");
    Ok((StatusCode::CREATED, Json(genre)))
}

pub async fn delete_genre(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> ApiResult<StatusCode> {
    require_admin(&auth)?;

    if !Genre::delete(&state.db, &slug).await? {
        return Err(ApiError::not_found("Genre"));
    }

    hooks::invalidate_genres(&state).await;
    // Cached books carry their genre list
    hooks::invalidate_books(&state).await;

    tracing::info!(slug = %slug, admin = %auth.user_id, "Genre deleted");
    Ok(StatusCode::NO_CONTENT)
}
