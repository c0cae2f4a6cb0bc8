/// Short posts and the home feed
///
/// A post is a short status update, optionally about a book. The feed is
/// the reader's own posts plus those of everyone they follow.

use crate::domain::{BookId, PostId, UserId};
use crate::pagination::{Cursor, Keyed, Page, PageRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

const POST_SELECT: &str = r#"
    SELECT p.id, p.user_id, p.body, p.book_id, p.created_at,
           u.username AS author_username, u.avatar_url AS author_avatar_url,
           b.slug AS book_slug,
           (SELECT COUNT(*) FROM likes l
            WHERE l.target_kind = 'post' AND l.target_id = p.id) AS like_count,
           (SELECT COUNT(*) FROM comments c
            WHERE c.target_kind = 'post' AND c.target_id = p.id AND NOT c.deleted) AS comment_count
    FROM posts p
    JOIN users u ON u.id = p.user_id
    LEFT JOIN books b ON b.id = p.book_id
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    pub body: String,
    pub book_id: Option<BookId>,
    pub created_at: DateTime<Utc>,
    pub author_username: String,
    pub author_avatar_url: Option<String>,
    pub book_slug: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
}

impl Keyed for Post {
    fn cursor(&self) -> Cursor {
        Cursor::new(self.created_at, self.id.as_uuid())
    }
}

#[derive(Debug, Clone)]
pub struct CreatePost {
    pub user_id: UserId,
    pub body: String,
    pub book_id: Option<BookId>,
}

impl Post {
    /// # Errors
    ///
    /// Foreign key violation if `book_id` does not exist.
    pub async fn create(pool: &PgPool, data: CreatePost) -> Result<Self, sqlx::Error> {
        let id: PostId = sqlx::query_scalar(
            "INSERT INTO posts (user_id, body, book_id) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(data.user_id)
        .bind(data.body.trim())
        .bind(data.book_id)
        .fetch_one(pool)
        .await?;

        Self::find(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find(pool: &PgPool, id: PostId) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Post>(&format!("{POST_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Deletes the post along with its likes and comments
    ///
    /// Ownership is checked by the caller.
    pub async fn delete(pool: &PgPool, id: PostId) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM likes WHERE target_kind = 'post' AND target_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM comments WHERE target_kind = 'post' AND target_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed > 0)
    }

    pub async fn list_by_user(
        pool: &PgPool,
        user_id: UserId,
        page: &PageRequest,
    ) -> Result<Page<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, Post>(&format!(
            r#"
            {POST_SELECT}
            WHERE p.user_id = $1
              AND ($2::timestamptz IS NULL OR (p.created_at, p.id) < ($2, $3))
            ORDER BY p.created_at DESC, p.id DESC
            LIMIT $4
            "#
        ))
        .bind(user_id)
        .bind(page.after_time())
        .bind(page.after_id())
        .bind(page.fetch_limit())
        .fetch_all(pool)
        .await?;

        Ok(Page::from_rows(rows, page))
    }

    /// Own posts and posts by followed users, newest first
    pub async fn feed(
        pool: &PgPool,
        user_id: UserId,
        page: &PageRequest,
    ) -> Result<Page<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, Post>(&format!(
            r#"
            {POST_SELECT}
            WHERE (p.user_id = $1
                   OR p.user_id IN (SELECT followee_id FROM follows WHERE follower_id = $1))
              AND ($2::timestamptz IS NULL OR (p.created_at, p.id) < ($2, $3))
            ORDER BY p.created_at DESC, p.id DESC
            LIMIT $4
            "#
        ))
        .bind(user_id)
        .bind(page.after_time())
        .bind(page.after_id())
        .bind(page.fetch_limit())
        .fetch_all(pool)
        .await?;

        Ok(Page::from_rows(rows, page))
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(pool)
            .await
    }
}
