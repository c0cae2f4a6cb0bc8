/// Book model and catalogue queries
///
/// Books are created by admins, addressed publicly by slug, and linked to
/// genres through `book_genres`. Drafts are only listed for admins.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE books (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     slug VARCHAR(100) NOT NULL UNIQUE,
///     title VARCHAR(255) NOT NULL,
///     author VARCHAR(255) NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     cover_url VARCHAR(512),
///     status book_status NOT NULL DEFAULT 'draft',
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use super::genre::Genre;
use crate::domain::{slugify, BookId, UserId};
use crate::pagination::{Cursor, Keyed, Page, PageRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

const BOOK_SELECT: &str = r#"
    SELECT b.id, b.slug, b.title, b.author, b.description, b.cover_url, b.status,
           b.created_by, b.created_at, b.updated_at,
           COALESCE(
               (SELECT array_agg(g.slug::text ORDER BY g.slug)
                FROM book_genres bg JOIN genres g ON g.id = bg.genre_id
                WHERE bg.book_id = b.id),
               '{}'::text[]
           ) AS genres
    FROM books b
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "book_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Draft,
    Published,
    Completed,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Draft => "draft",
            BookStatus::Published => "published",
            BookStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    pub id: BookId,
    pub slug: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub cover_url: Option<String>,
    pub status: BookStatus,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Genre slugs, sorted
    pub genres: Vec<String>,
}

impl Keyed for Book {
    fn cursor(&self) -> Cursor {
        Cursor::new(self.created_at, self.id.as_uuid())
    }
}

#[derive(Debug, Clone)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
    pub description: String,
    pub status: BookStatus,
    /// Genre slugs; unknown slugs are ignored
    pub genres: Vec<String>,
    pub created_by: Option<UserId>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBook {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub status: Option<BookStatus>,
    /// Replaces the genre set when present
    pub genres: Option<Vec<String>>,
}

/// Listing filters
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    pub genre: Option<String>,
    pub status: Option<BookStatus>,
    /// Case-insensitive substring of title or author
    pub query: Option<String>,
    pub include_drafts: bool,
}

/// Escapes `%`, `_` and `\` and wraps the text for `ILIKE`
pub fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl Book {
    /// First free slug derived from `title` (`dune`, `dune-2`, `dune-3`, ...)
    pub async fn available_slug(pool: &PgPool, title: &str) -> Result<String, sqlx::Error> {
        let base = slugify(title);
        let taken: Vec<String> = sqlx::query_scalar(
            "SELECT slug FROM books WHERE slug = $1 OR slug LIKE $1 || '-%'",
        )
        .bind(&base)
        .fetch_all(pool)
        .await?;

        if !taken.contains(&base) {
            return Ok(base);
        }

        let mut n = 2u32;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Creates a book and its genre links in one transaction
    pub async fn create(pool: &PgPool, slug: &str, data: CreateBook) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let id: BookId = sqlx::query_scalar(
            r#"
            INSERT INTO books (slug, title, author, description, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(slug)
        .bind(data.title.trim())
        .bind(data.author.trim())
        .bind(data.description)
        .bind(data.status)
        .bind(data.created_by)
        .fetch_one(&mut *tx)
        .await?;

        link_genres(&mut tx, id, &data.genres).await?;

        let book = sqlx::query_as::<_, Book>(&format!("{BOOK_SELECT} WHERE b.id = $1"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(book)
    }

    pub async fn find_by_id(pool: &PgPool, id: BookId) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Book>(&format!("{BOOK_SELECT} WHERE b.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Book>(&format!("{BOOK_SELECT} WHERE b.slug = $1"))
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_many(pool: &PgPool, ids: &[BookId]) -> Result<Vec<Self>, sqlx::Error> {
        let ids: Vec<uuid::Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        sqlx::query_as::<_, Book>(&format!("{BOOK_SELECT} WHERE b.id = ANY($1)"))
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Newest first, filtered, one cursor page
    pub async fn list(
        pool: &PgPool,
        filter: &BookFilter,
        page: &PageRequest,
    ) -> Result<Page<Self>, sqlx::Error> {
        let query = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(like_pattern);

        let rows = sqlx::query_as::<_, Book>(&format!(
            r#"
            {BOOK_SELECT}
            WHERE ($1::text IS NULL OR EXISTS (
                      SELECT 1 FROM book_genres bg JOIN genres g ON g.id = bg.genre_id
                      WHERE bg.book_id = b.id AND g.slug = $1))
              AND ($2::book_status IS NULL OR b.status = $2)
              AND ($3::text IS NULL OR b.title ILIKE $3 OR b.author ILIKE $3)
              AND ($4 OR b.status <> 'draft')
              AND ($5::timestamptz IS NULL OR (b.created_at, b.id) < ($5, $6))
            ORDER BY b.created_at DESC, b.id DESC
            LIMIT $7
            "#
        ))
        .bind(filter.genre.as_deref())
        .bind(filter.status)
        .bind(query)
        .bind(filter.include_drafts)
        .bind(page.after_time())
        .bind(page.after_id())
        .bind(page.fetch_limit())
        .fetch_all(pool)
        .await?;

        Ok(Page::from_rows(rows, page))
    }

    /// Every book id, oldest first, for rebuilding embeddings
    pub async fn all_ids(pool: &PgPool) -> Result<Vec<BookId>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM books ORDER BY created_at")
            .fetch_all(pool)
            .await
    }

    /// Applies the present fields; the slug is kept so links stay valid
    pub async fn update(
        pool: &PgPool,
        id: BookId,
        data: UpdateBook,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let mut query = String::from("UPDATE books SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.title.is_some() {
            bind_count += 1;
            query.push_str(&format!(", title = ${}", bind_count));
        }
        if data.author.is_some() {
            bind_count += 1;
            query.push_str(&format!(", author = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }
        if data.status.is_some() {
            bind_count += 1;
            query.push_str(&format!(", status = ${}", bind_count));
        }
        query.push_str(" WHERE id = $1");

        let mut q = sqlx::query(&query).bind(id);
        if let Some(title) = data.title {
            q = q.bind(title.trim().to_string());
        }
        if let Some(author) = data.author {
            q = q.bind(author.trim().to_string());
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(status) = data.status {
            q = q.bind(status);
        }

        if q.execute(&mut *tx).await?.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(genres) = data.genres {
            sqlx::query("DELETE FROM book_genres WHERE book_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            link_genres(&mut tx, id, &genres).await?;
        }

        let book = sqlx::query_as::<_, Book>(&format!("{BOOK_SELECT} WHERE b.id = $1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(book)
    }

    /// Sets or clears the cover, returning the previous URL
    pub async fn set_cover(
        pool: &PgPool,
        id: BookId,
        cover_url: Option<String>,
    ) -> Result<Option<Option<String>>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            UPDATE books b
            SET cover_url = $2, updated_at = NOW()
            FROM (SELECT id, cover_url FROM books WHERE id = $1 FOR UPDATE) old
            WHERE b.id = old.id
            RETURNING old.cover_url
            "#,
        )
        .bind(id)
        .bind(cover_url)
        .fetch_optional(pool)
        .await
    }

    /// Deletes the book; chapters, links and progress cascade
    pub async fn delete(pool: &PgPool, id: BookId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn genres_for(pool: &PgPool, id: BookId) -> Result<Vec<Genre>, sqlx::Error> {
        sqlx::query_as::<_, Genre>(
            r#"
            SELECT g.id, g.slug, g.name, g.created_at
            FROM genres g
            JOIN book_genres bg ON bg.genre_id = g.id
            WHERE bg.book_id = $1
            ORDER BY g.name
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(pool)
            .await
    }
}

async fn link_genres(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: BookId,
    slugs: &[String],
) -> Result<(), sqlx::Error> {
    if slugs.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO book_genres (book_id, genre_id)
        SELECT $1, id FROM genres WHERE slug = ANY($2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(id)
    .bind(slugs)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
