/// Follow graph
///
/// `follows (follower_id, followee_id)` with a check constraint against
/// self-follows. Follower and following lists page newest first by the time
/// the follow happened.

use crate::domain::UserId;
use crate::pagination::{Cursor, Keyed, Page, PageRequest};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum FollowError {
    #[error("You cannot follow yourself")]
    SelfFollow,

    #[error("User not found")]
    UserNotFound,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FollowState {
    pub following: bool,
    /// Followers of the followee after the toggle
    pub followers: i64,
}

/// A user in a follower/following list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FollowEntry {
    pub user_id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub followed_at: DateTime<Utc>,
}

impl Keyed for FollowEntry {
    fn cursor(&self) -> Cursor {
        Cursor::new(self.followed_at, self.user_id.as_uuid())
    }
}

pub struct Follow;

impl Follow {
    /// Follows `followee`, or unfollows if already following
    pub async fn toggle(
        pool: &PgPool,
        follower: UserId,
        followee: UserId,
    ) -> Result<FollowState, FollowError> {
        if follower == followee {
            return Err(FollowError::SelfFollow);
        }

        let mut tx = pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(followee)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(FollowError::UserNotFound);
        }

        let removed = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(follower)
            .bind(followee)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let following = if removed > 0 {
            false
        } else {
            sqlx::query(
                r#"
                INSERT INTO follows (follower_id, followee_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(follower)
            .bind(followee)
            .execute(&mut *tx)
            .await?;
            true
        };

        let followers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE followee_id = $1")
            .bind(followee)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(FollowState {
            following,
            followers,
        })
    }

    pub async fn is_following(
        pool: &PgPool,
        follower: UserId,
        followee: UserId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2)",
        )
        .bind(follower)
        .bind(followee)
        .fetch_one(pool)
        .await
    }

    /// People following `user_id`
    pub async fn followers(
        pool: &PgPool,
        user_id: UserId,
        page: &PageRequest,
    ) -> Result<Page<FollowEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, FollowEntry>(
            r#"
            SELECT u.id AS user_id, u.username, u.display_name, u.avatar_url,
                   f.created_at AS followed_at
            FROM follows f
            JOIN users u ON u.id = f.follower_id
            WHERE f.followee_id = $1
              AND ($2::timestamptz IS NULL OR (f.created_at, u.id) < ($2, $3))
            ORDER BY f.created_at DESC, u.id DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(page.after_time())
        .bind(page.after_id())
        .bind(page.fetch_limit())
        .fetch_all(pool)
        .await?;

        Ok(Page::from_rows(rows, page))
    }

    /// People `user_id` follows
    pub async fn following(
        pool: &PgPool,
        user_id: UserId,
        page: &PageRequest,
    ) -> Result<Page<FollowEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, FollowEntry>(
            r#"
            SELECT u.id AS user_id, u.username, u.display_name, u.avatar_url,
                   f.created_at AS followed_at
            FROM follows f
            JOIN users u ON u.id = f.followee_id
            WHERE f.follower_id = $1
              AND ($2::timestamptz IS NULL OR (f.created_at, u.id) < ($2, $3))
            ORDER BY f.created_at DESC, u.id DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(page.after_time())
        .bind(page.after_id())
        .bind(page.fetch_limit())
        .fetch_all(pool)
        .await?;

        Ok(Page::from_rows(rows, page))
    }

    /// `(followers, following)` for a user
    pub async fn counts(pool: &PgPool, user_id: UserId) -> Result<(i64, i64), sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM follows WHERE followee_id = $1),
                (SELECT COUNT(*) FROM follows WHERE follower_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }
}
