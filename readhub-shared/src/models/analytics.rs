/// Admin dashboard aggregates
///
/// Read-only queries over the whole database. Each function is a single
/// statement so the dashboard endpoint can run them concurrently.

use super::job::JobState;
use crate::domain::BookId;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;

/// Longest window `signups_per_day` accepts
pub const MAX_SIGNUP_DAYS: i32 = 365;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Overview {
    pub users: i64,
    pub books: i64,
    pub chapters: i64,
    pub comments: i64,
    pub likes: i64,
    pub posts: i64,
    pub new_users_7d: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TopBook {
    pub book_id: BookId,
    pub slug: String,
    pub title: String,
    pub score: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStateCount {
    pub state: JobState,
    pub count: i64,
}

pub struct Analytics;

impl Analytics {
    pub async fn overview(pool: &PgPool) -> Result<Overview, sqlx::Error> {
        sqlx::query_as::<_, Overview>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS users,
                (SELECT COUNT(*) FROM books) AS books,
                (SELECT COUNT(*) FROM chapters) AS chapters,
                (SELECT COUNT(*) FROM comments WHERE NOT deleted) AS comments,
                (SELECT COUNT(*) FROM likes) AS likes,
                (SELECT COUNT(*) FROM posts) AS posts,
                (SELECT COUNT(*) FROM users WHERE created_at >= NOW() - INTERVAL '7 days') AS new_users_7d
            "#,
        )
        .fetch_one(pool)
        .await
    }

    /// One row per day for the last `days` days (UTC), zero-filled
    pub async fn signups_per_day(pool: &PgPool, days: i32) -> Result<Vec<DailyCount>, sqlx::Error> {
        let days = days.clamp(1, MAX_SIGNUP_DAYS);

        sqlx::query_as::<_, DailyCount>(
            r#"
            SELECT d.day, COUNT(u.id) AS count
            FROM (
                SELECT generate_series(
                    (NOW() AT TIME ZONE 'UTC')::date - ($1::int - 1),
                    (NOW() AT TIME ZONE 'UTC')::date,
                    INTERVAL '1 day'
                )::date AS day
            ) d
            LEFT JOIN users u ON (u.created_at AT TIME ZONE 'UTC')::date = d.day
            GROUP BY d.day
            ORDER BY d.day
            "#,
        )
        .bind(days)
        .fetch_all(pool)
        .await
    }

    pub async fn top_books_by_likes(pool: &PgPool, limit: i64) -> Result<Vec<TopBook>, sqlx::Error> {
        sqlx::query_as::<_, TopBook>(
            r#"
            SELECT b.id AS book_id, b.slug, b.title, COUNT(l.user_id) AS score
            FROM books b
            JOIN likes l ON l.target_kind = 'book' AND l.target_id = b.id
            GROUP BY b.id
            ORDER BY score DESC, b.title
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Books ranked by distinct readers who opened at least one chapter
    pub async fn top_books_by_readers(pool: &PgPool, limit: i64) -> Result<Vec<TopBook>, sqlx::Error> {
        sqlx::query_as::<_, TopBook>(
            r#"
            SELECT b.id AS book_id, b.slug, b.title, COUNT(DISTINCT cr.user_id) AS score
            FROM books b
            JOIN chapter_reads cr ON cr.book_id = b.id
            GROUP BY b.id
            ORDER BY score DESC, b.title
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn jobs_by_state(pool: &PgPool) -> Result<Vec<JobStateCount>, sqlx::Error> {
        let rows = super::job::Job::counts_by_state(pool).await?;
        Ok(rows
            .into_iter()
            .map(|(state, count)| JobStateCount { state, count })
            .collect())
    }
}
