/// Likes on books, chapters, comments and posts
///
/// One row per `(user_id, target_kind, target_id)`; liking again removes the
/// like. The primary key makes concurrent toggles safe.

use crate::domain::{TargetKind, UserId};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Like state of a target as seen by one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeState {
    pub liked: bool,
    pub count: i64,
}

pub struct Like;

impl Like {
    /// Likes the target, or unlikes it if already liked
    ///
    /// Target existence is checked by the caller.
    pub async fn toggle(
        pool: &PgPool,
        user_id: UserId,
        kind: TargetKind,
        target_id: Uuid,
    ) -> Result<LikeState, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM likes WHERE user_id = $1 AND target_kind = $2 AND target_id = $3",
        )
        .bind(user_id)
        .bind(kind)
        .bind(target_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let liked = if removed > 0 {
            false
        } else {
            sqlx::query(
                r#"
                INSERT INTO likes (user_id, target_kind, target_id)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(kind)
            .bind(target_id)
            .execute(&mut *tx)
            .await?;
            true
        };

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM likes WHERE target_kind = $1 AND target_id = $2",
        )
        .bind(kind)
        .bind(target_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(LikeState { liked, count })
    }

    /// Count plus whether `user_id` (if any) likes the target
    pub async fn status(
        pool: &PgPool,
        user_id: Option<UserId>,
        kind: TargetKind,
        target_id: Uuid,
    ) -> Result<LikeState, sqlx::Error> {
        let (count, liked): (i64, bool) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(BOOL_OR(user_id = $3), FALSE)
            FROM likes
            WHERE target_kind = $1 AND target_id = $2
            "#,
        )
        .bind(kind)
        .bind(target_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(LikeState { liked, count })
    }

    pub async fn count(pool: &PgPool, kind: TargetKind, target_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE target_kind = $1 AND target_id = $2")
            .bind(kind)
            .bind(target_id)
            .fetch_one(pool)
            .await
    }

    pub async fn total(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM likes")
            .fetch_one(pool)
            .await
    }
}
