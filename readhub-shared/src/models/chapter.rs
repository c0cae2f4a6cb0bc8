/// Chapter model
///
/// Chapters are numbered from 1 within a book (`UNIQUE (book_id, number)`).
/// Listings return [`ChapterSummary`] rows without the content body.

use crate::domain::{BookId, ChapterId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

const CHAPTER_COLUMNS: &str =
    "id, book_id, number, title, content, word_count, source_url, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chapter {
    pub id: ChapterId,
    pub book_id: BookId,
    pub number: i32,
    pub title: String,
    pub content: String,
    pub word_count: i32,
    /// Page the chapter was imported from
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChapterSummary {
    pub id: ChapterId,
    pub number: i32,
    pub title: String,
    pub word_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Numbers of the surrounding chapters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Neighbours {
    pub prev: Option<i32>,
    pub next: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct CreateChapter {
    pub book_id: BookId,
    /// Next free number when `None`
    pub number: Option<i32>,
    pub title: String,
    pub content: String,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateChapter {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Whitespace-separated word count, saturating at `i32::MAX`
pub fn word_count(text: &str) -> i32 {
    i32::try_from(text.split_whitespace().count()).unwrap_or(i32::MAX)
}

impl Chapter {
    /// # Errors
    ///
    /// Unique violation on `chapters_book_number_key` if the number is taken,
    /// foreign key violation if the book does not exist.
    pub async fn create(pool: &PgPool, data: CreateChapter) -> Result<Self, sqlx::Error> {
        let words = word_count(&data.content);

        sqlx::query_as::<_, Chapter>(&format!(
            r#"
            INSERT INTO chapters (book_id, number, title, content, word_count, source_url)
            VALUES (
                $1,
                COALESCE($2, (SELECT COALESCE(MAX(number), 0) + 1 FROM chapters WHERE book_id = $1)),
                $3, $4, $5, $6
            )
            RETURNING {CHAPTER_COLUMNS}
            "#
        ))
        .bind(data.book_id)
        .bind(data.number)
        .bind(data.title.trim())
        .bind(data.content)
        .bind(words)
        .bind(data.source_url)
        .fetch_one(pool)
        .await
    }

    pub async fn find(pool: &PgPool, id: ChapterId) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Chapter>(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_number(
        pool: &PgPool,
        book_id: BookId,
        number: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Chapter>(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE book_id = $1 AND number = $2"
        ))
        .bind(book_id)
        .bind(number)
        .fetch_optional(pool)
        .await
    }

    /// Table of contents
    pub async fn list_for_book(
        pool: &PgPool,
        book_id: BookId,
    ) -> Result<Vec<ChapterSummary>, sqlx::Error> {
        sqlx::query_as::<_, ChapterSummary>(
            r#"
            SELECT id, number, title, word_count, created_at
            FROM chapters
            WHERE book_id = $1
            ORDER BY number
            "#,
        )
        .bind(book_id)
        .fetch_all(pool)
        .await
    }

    /// Previous and next existing numbers (gaps are skipped)
    pub async fn neighbours(
        pool: &PgPool,
        book_id: BookId,
        number: i32,
    ) -> Result<Neighbours, sqlx::Error> {
        sqlx::query_as::<_, Neighbours>(
            r#"
            SELECT
                (SELECT MAX(number) FROM chapters WHERE book_id = $1 AND number < $2) AS prev,
                (SELECT MIN(number) FROM chapters WHERE book_id = $1 AND number > $2) AS next
            "#,
        )
        .bind(book_id)
        .bind(number)
        .fetch_one(pool)
        .await
    }

    /// Applies the present fields; `word_count` follows the content
    pub async fn update(
        pool: &PgPool,
        id: ChapterId,
        data: UpdateChapter,
    ) -> Result<Option<Self>, sqlx::Error> {
        let words = data.content.as_deref().map(word_count);

        sqlx::query_as::<_, Chapter>(&format!(
            r#"
            UPDATE chapters
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                word_count = COALESCE($4, word_count),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CHAPTER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.title.map(|t| t.trim().to_string()))
        .bind(data.content)
        .bind(words)
        .fetch_optional(pool)
        .await
    }

    /// Deletes the chapter, returning its book
    pub async fn delete(pool: &PgPool, id: ChapterId) -> Result<Option<BookId>, sqlx::Error> {
        sqlx::query_scalar("DELETE FROM chapters WHERE id = $1 RETURNING book_id")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn count_for_book(pool: &PgPool, book_id: BookId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chapters WHERE book_id = $1")
            .bind(book_id)
            .fetch_one(pool)
            .await
    }

    pub fn summary(&self) -> ChapterSummary {
        ChapterSummary {
            id: self.id,
            number: self.number,
            title: self.title.clone(),
            word_count: self.word_count,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("  one\ttwo\n\nthree  "), 3);
    }
}
