/// Comments with one level of threaded replies
///
/// A comment targets a book, chapter or post. Replies point at a top-level
/// comment of the same target through `parent_id`; replies to replies are
/// rejected. Deleting is soft: the body is replaced and `deleted` set so
/// the thread keeps its shape.
///
/// Top-level comments page newest first; replies page oldest first.

use super::target;
use crate::domain::{CommentId, TargetKind, UserId};
use crate::pagination::{Cursor, Keyed, Page, PageRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Body stored in place of a deleted comment
pub const DELETED_BODY: &str = "[deleted]";

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.user_id, c.target_kind, c.target_id, c.parent_id, c.body,
           c.edited, c.deleted, c.created_at, c.updated_at,
           u.username AS author_username, u.avatar_url AS author_avatar_url,
           (SELECT COUNT(*) FROM comments r WHERE r.parent_id = c.id) AS reply_count,
           (SELECT COUNT(*) FROM likes l
            WHERE l.target_kind = 'comment' AND l.target_id = c.id) AS like_count
    FROM comments c
    JOIN users u ON u.id = c.user_id
"#;

#[derive(Debug, thiserror::Error)]
pub enum CommentError {
    #[error("Comments on {0} are not allowed")]
    NotCommentable(TargetKind),

    #[error("Comment target not found")]
    TargetNotFound,

    #[error("Parent comment not found")]
    ParentNotFound,

    #[error("Parent comment belongs to a different target")]
    ParentMismatch,

    #[error("Replies cannot be nested")]
    NestedReply,

    #[error("Deleted comments cannot be edited")]
    Deleted,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: CommentId,
    pub user_id: UserId,
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    pub parent_id: Option<CommentId>,
    pub body: String,
    pub edited: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_username: String,
    pub author_avatar_url: Option<String>,
    pub reply_count: i64,
    pub like_count: i64,
}

impl Keyed for Comment {
    fn cursor(&self) -> Cursor {
        Cursor::new(self.created_at, self.id.as_uuid())
    }
}

#[derive(Debug, Clone)]
pub struct CreateComment {
    pub user_id: UserId,
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    pub parent_id: Option<CommentId>,
    pub body: String,
}

impl Comment {
    /// Validates target and parent, then inserts
    pub async fn create(pool: &PgPool, data: CreateComment) -> Result<Self, CommentError> {
        let kind = data
            .target_kind
            .require_commentable()
            .map_err(|_| CommentError::NotCommentable(data.target_kind))?;

        if !target::exists(pool, kind, data.target_id).await? {
            return Err(CommentError::TargetNotFound);
        }

        if let Some(parent_id) = data.parent_id {
            let parent = Self::find(pool, parent_id)
                .await?
                .filter(|p| !p.deleted)
                .ok_or(CommentError::ParentNotFound)?;
            check_parent(&parent, kind, data.target_id)?;
        }

        let id: CommentId = sqlx::query_scalar(
            r#"
            INSERT INTO comments (user_id, target_kind, target_id, parent_id, body)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(data.user_id)
        .bind(kind)
        .bind(data.target_id)
        .bind(data.parent_id)
        .bind(data.body.trim())
        .fetch_one(pool)
        .await?;

        Self::find(pool, id)
            .await?
            .ok_or(CommentError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn find(pool: &PgPool, id: CommentId) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Top-level comments on a target, newest first
    pub async fn list_for_target(
        pool: &PgPool,
        kind: TargetKind,
        target_id: Uuid,
        page: &PageRequest,
    ) -> Result<Page<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, Comment>(&format!(
            r#"
            {COMMENT_SELECT}
            WHERE c.target_kind = $1 AND c.target_id = $2 AND c.parent_id IS NULL
              AND ($3::timestamptz IS NULL OR (c.created_at, c.id) < ($3, $4))
            ORDER BY c.created_at DESC, c.id DESC
            LIMIT $5
            "#
        ))
        .bind(kind)
        .bind(target_id)
        .bind(page.after_time())
        .bind(page.after_id())
        .bind(page.fetch_limit())
        .fetch_all(pool)
        .await?;

        Ok(Page::from_rows(rows, page))
    }

    /// Replies to a comment, oldest first
    pub async fn list_replies(
        pool: &PgPool,
        parent_id: CommentId,
        page: &PageRequest,
    ) -> Result<Page<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, Comment>(&format!(
            r#"
            {COMMENT_SELECT}
            WHERE c.parent_id = $1
              AND ($2::timestamptz IS NULL OR (c.created_at, c.id) > ($2, $3))
            ORDER BY c.created_at, c.id
            LIMIT $4
            "#
        ))
        .bind(parent_id)
        .bind(page.after_time())
        .bind(page.after_id())
        .bind(page.fetch_limit())
        .fetch_all(pool)
        .await?;

        Ok(Page::from_rows(rows, page))
    }

    /// Replaces the body and marks the comment edited
    ///
    /// Ownership is checked by the caller.
    pub async fn update(pool: &PgPool, id: CommentId, body: &str) -> Result<Option<Self>, CommentError> {
        let updated: Option<bool> = sqlx::query_scalar(
            r#"
            UPDATE comments
            SET body = CASE WHEN deleted THEN body ELSE $2 END,
                edited = edited OR NOT deleted,
                updated_at = CASE WHEN deleted THEN updated_at ELSE NOW() END
            WHERE id = $1
            RETURNING NOT deleted
            "#,
        )
        .bind(id)
        .bind(body.trim())
        .fetch_optional(pool)
        .await?;

        match updated {
            None => Ok(None),
            Some(false) => Err(CommentError::Deleted),
            Some(true) => Ok(Self::find(pool, id).await?),
        }
    }

    /// Soft delete; replies stay attached
    pub async fn soft_delete(pool: &PgPool, id: CommentId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE comments
            SET body = $2, deleted = TRUE, updated_at = NOW()
            WHERE id = $1 AND NOT deleted
            "#,
        )
        .bind(id)
        .bind(DELETED_BODY)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn reply_count(pool: &PgPool, id: CommentId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE parent_id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE NOT deleted")
            .fetch_one(pool)
            .await
    }
}

/// A reply's parent must be a top-level comment on the same target
fn check_parent(parent: &Comment, kind: TargetKind, target_id: Uuid) -> Result<(), CommentError> {
    if parent.parent_id.is_some() {
        return Err(CommentError::NestedReply);
    }
    if parent.target_kind != kind || parent.target_id != target_id {
        return Err(CommentError::ParentMismatch);
    }
    Ok(())
}
