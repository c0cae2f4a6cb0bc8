/// Reading progress, chapter reads and reading lists
///
/// - `reading_progress`: one row per (user, book) with the last chapter
///   opened and a percentage through it
/// - `chapter_reads`: first time a user opened each chapter, feeding XP and
///   achievements
/// - `reading_list`: per-book shelf status
/// - `finished_books`: first time a user marked each book completed, kept
///   when the shelf status later changes

use crate::domain::{BookId, ChapterId, UserId};
use crate::pagination::{Cursor, Keyed, Page, PageRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reading_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    WantToRead,
    Reading,
    Completed,
    Dropped,
}

#[derive(Debug, thiserror::Error)]
pub enum ReadingError {
    #[error("Book not found")]
    BookNotFound,

    #[error("Chapter does not belong to this book")]
    ChapterNotInBook,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ReadingProgress {
    pub user_id: UserId,
    pub book_id: BookId,
    pub chapter_id: Option<ChapterId>,
    pub chapter_number: i32,
    pub percent: i16,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A "continue reading" card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ContinueReading {
    pub book_id: BookId,
    pub book_slug: String,
    pub book_title: String,
    pub cover_url: Option<String>,
    pub chapter_id: Option<ChapterId>,
    pub chapter_number: i32,
    pub percent: i16,
    pub total_chapters: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ReadingListEntry {
    pub book_id: BookId,
    pub book_slug: String,
    pub book_title: String,
    pub author: String,
    pub cover_url: Option<String>,
    pub status: ReadingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Keyed for ReadingListEntry {
    fn cursor(&self) -> Cursor {
        Cursor::new(self.updated_at, self.book_id.as_uuid())
    }
}

/// Result of shelving a book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfChange {
    pub entry: ReadingListEntry,
    pub previous: Option<ReadingStatus>,
    /// The book was marked completed for the first time ever
    pub first_finish: bool,
}

/// Progress update
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    pub book_id: BookId,
    pub chapter_id: Option<ChapterId>,
    /// Clamped to 0..=100
    pub percent: i32,
}

/// Clamps a percentage to 0..=100
pub fn clamp_percent(percent: i32) -> i16 {
    // The clamped value always fits.
    i16::try_from(percent.clamp(0, 100)).unwrap_or(100)
}

pub struct Reading;

impl Reading {
    /// Creates or moves the user's bookmark in a book
    ///
    /// Without a chapter the stored chapter is kept (chapter 1 for a new
    /// row). A first bookmark also shelves the book as `reading`.
    pub async fn upsert_progress(
        pool: &PgPool,
        user_id: UserId,
        update: ProgressUpdate,
    ) -> Result<ReadingProgress, ReadingError> {
        let mut tx = pool.begin().await?;

        let book_exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM books WHERE id = $1)")
            .bind(update.book_id)
            .fetch_one(&mut *tx)
            .await?;
        if !book_exists {
            return Err(ReadingError::BookNotFound);
        }

        let chapter_number: Option<i32> = match update.chapter_id {
            Some(chapter_id) => {
                let number: Option<i32> = sqlx::query_scalar(
                    "SELECT number FROM chapters WHERE id = $1 AND book_id = $2",
                )
                .bind(chapter_id)
                .bind(update.book_id)
                .fetch_optional(&mut *tx)
                .await?;
                Some(number.ok_or(ReadingError::ChapterNotInBook)?)
            }
            None => None,
        };

        let progress = sqlx::query_as::<_, ReadingProgress>(
            r#"
            INSERT INTO reading_progress (user_id, book_id, chapter_id, chapter_number, percent)
            VALUES ($1, $2, $3, COALESCE($4, 1), $5)
            ON CONFLICT (user_id, book_id) DO UPDATE
            SET chapter_id = COALESCE(EXCLUDED.chapter_id, reading_progress.chapter_id),
                chapter_number = COALESCE($4, reading_progress.chapter_number),
                percent = EXCLUDED.percent,
                updated_at = NOW()
            RETURNING user_id, book_id, chapter_id, chapter_number, percent, started_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(update.book_id)
        .bind(update.chapter_id)
        .bind(chapter_number)
        .bind(clamp_percent(update.percent))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO reading_list (user_id, book_id, status)
            VALUES ($1, $2, 'reading')
            ON CONFLICT (user_id, book_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(update.book_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(progress)
    }

    pub async fn get_progress(
        pool: &PgPool,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Option<ReadingProgress>, sqlx::Error> {
        sqlx::query_as::<_, ReadingProgress>(
            r#"
            SELECT user_id, book_id, chapter_id, chapter_number, percent, started_at, updated_at
            FROM reading_progress
            WHERE user_id = $1 AND book_id = $2
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(pool)
        .await
    }

    /// Most recently touched books, skipping those shelved as completed
    pub async fn continue_reading(
        pool: &PgPool,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<ContinueReading>, sqlx::Error> {
        sqlx::query_as::<_, ContinueReading>(
            r#"
            SELECT rp.book_id, b.slug AS book_slug, b.title AS book_title, b.cover_url,
                   rp.chapter_id, rp.chapter_number, rp.percent,
                   (SELECT COUNT(*) FROM chapters c WHERE c.book_id = rp.book_id) AS total_chapters,
                   rp.updated_at
            FROM reading_progress rp
            JOIN books b ON b.id = rp.book_id
            LEFT JOIN reading_list rl ON rl.user_id = rp.user_id AND rl.book_id = rp.book_id
            WHERE rp.user_id = $1
              AND (rl.status IS NULL OR rl.status <> 'completed')
            ORDER BY rp.updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Records the first read of a chapter; `true` if it was new
    pub async fn record_chapter_read(
        pool: &PgPool,
        user_id: UserId,
        chapter_id: ChapterId,
        book_id: BookId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO chapter_reads (user_id, chapter_id, book_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, chapter_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(chapter_id)
        .bind(book_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Shelves a book, returning the entry, the status it replaced and
    /// whether this is the first time the reader finished it
    pub async fn set_list_status(
        pool: &PgPool,
        user_id: UserId,
        book_id: BookId,
        status: ReadingStatus,
    ) -> Result<ShelfChange, ReadingError> {
        let mut tx = pool.begin().await?;

        let book_exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM books WHERE id = $1)")
            .bind(book_id)
            .fetch_one(&mut *tx)
            .await?;
        if !book_exists {
            return Err(ReadingError::BookNotFound);
        }

        let previous: Option<ReadingStatus> = sqlx::query_scalar(
            "SELECT status FROM reading_list WHERE user_id = $1 AND book_id = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO reading_list (user_id, book_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, book_id) DO UPDATE
            SET status = EXCLUDED.status, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(status)
        .execute(&mut *tx)
        .await?;

        let first_finish = if status == ReadingStatus::Completed {
            sqlx::query(
                r#"
                INSERT INTO finished_books (user_id, book_id)
                VALUES ($1, $2)
                ON CONFLICT (user_id, book_id) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(book_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0
        } else {
            false
        };

        let entry = sqlx::query_as::<_, ReadingListEntry>(
            r#"
            SELECT rl.book_id, b.slug AS book_slug, b.title AS book_title, b.author, b.cover_url,
                   rl.status, rl.created_at, rl.updated_at
            FROM reading_list rl
            JOIN books b ON b.id = rl.book_id
            WHERE rl.user_id = $1 AND rl.book_id = $2
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ShelfChange {
            entry,
            previous,
            first_finish,
        })
    }

    pub async fn remove_from_list(
        pool: &PgPool,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM reading_list WHERE user_id = $1 AND book_id = $2")
            .bind(user_id)
            .bind(book_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Shelf contents, most recently changed first
    pub async fn list(
        pool: &PgPool,
        user_id: UserId,
        status: Option<ReadingStatus>,
        page: &PageRequest,
    ) -> Result<Page<ReadingListEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ReadingListEntry>(
            r#"
            SELECT rl.book_id, b.slug AS book_slug, b.title AS book_title, b.author, b.cover_url,
                   rl.status, rl.created_at, rl.updated_at
            FROM reading_list rl
            JOIN books b ON b.id = rl.book_id
            WHERE rl.user_id = $1
              AND ($2::reading_status IS NULL OR rl.status = $2)
              AND ($3::timestamptz IS NULL OR (rl.updated_at, rl.book_id) < ($3, $4))
            ORDER BY rl.updated_at DESC, rl.book_id DESC
            LIMIT $5
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(page.after_time())
        .bind(page.after_id())
        .bind(page.fetch_limit())
        .fetch_all(pool)
        .await?;

        Ok(Page::from_rows(rows, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_percent() {
        assert_eq!(clamp_percent(-5), 0);
        assert_eq!(clamp_percent(42), 42);
        assert_eq!(clamp_percent(250), 100);
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&ReadingStatus::WantToRead).unwrap(),
            "\"want_to_read\""
        );
        let status: ReadingStatus = serde_json::from_str("\"dropped\"").unwrap();
        assert_eq!(status, ReadingStatus::Dropped);
    }
}
