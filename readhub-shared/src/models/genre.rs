/// Genre model
///
/// Genres are a small admin-managed list addressed by slug in URLs and in
/// readers' onboarding choices.

use crate::domain::{GenreId, GenreSlug};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Genre {
    pub id: GenreId,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateGenre {
    pub slug: GenreSlug,
    pub name: String,
}

impl Genre {
    /// # Errors
    ///
    /// Unique violation on `genres_slug_key` if the slug exists.
    pub async fn create(pool: &PgPool, data: CreateGenre) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Genre>(
            r#"
            INSERT INTO genres (slug, name)
            VALUES ($1, $2)
            RETURNING id, slug, name, created_at
            "#,
        )
        .bind(data.slug.as_str())
        .bind(data.name.trim())
        .fetch_one(pool)
        .await
    }

    /// All genres ordered by name
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Genre>("SELECT id, slug, name, created_at FROM genres ORDER BY name, slug")
            .fetch_all(pool)
            .await
    }

    /// Just the slugs, for validating onboarding picks
    pub async fn slugs(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT slug FROM genres ORDER BY slug")
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Genre>("SELECT id, slug, name, created_at FROM genres WHERE slug = $1")
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    /// Genres whose slugs are in `slugs`; unknown slugs are ignored
    pub async fn find_by_slugs(pool: &PgPool, slugs: &[String]) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Genre>(
            "SELECT id, slug, name, created_at FROM genres WHERE slug = ANY($1) ORDER BY name",
        )
        .bind(slugs)
        .fetch_all(pool)
        .await
    }

    /// Deletes by slug; book links cascade
    pub async fn delete(pool: &PgPool, slug: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM genres WHERE slug = $1")
            .bind(slug)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
