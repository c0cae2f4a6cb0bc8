/// Lookups shared by polymorphic targets (likes and comments)
///
/// A target is a `(TargetKind, Uuid)` pair pointing into `books`,
/// `chapters`, `comments` or `posts`.

use crate::domain::{TargetKind, UserId};
use sqlx::PgPool;
use uuid::Uuid;

fn table(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Book => "books",
        TargetKind::Chapter => "chapters",
        TargetKind::Comment => "comments",
        TargetKind::Post => "posts",
    }
}

/// Whether the target row exists (soft-deleted comments count as missing)
pub async fn exists(pool: &PgPool, kind: TargetKind, id: Uuid) -> Result<bool, sqlx::Error> {
    let filter = if kind == TargetKind::Comment {
        " AND NOT deleted"
    } else {
        ""
    };

    sqlx::query_scalar(&format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1{})",
        table(kind),
        filter
    ))
    .bind(id)
    .fetch_one(pool)
    .await
}

/// Author of user-generated targets; books and chapters have none
pub async fn owner(pool: &PgPool, kind: TargetKind, id: Uuid) -> Result<Option<UserId>, sqlx::Error> {
    match kind {
        TargetKind::Comment | TargetKind::Post => {
            sqlx::query_scalar(&format!("SELECT user_id FROM {} WHERE id = $1", table(kind)))
                .bind(id)
                .fetch_optional(pool)
                .await
        }
        TargetKind::Book | TargetKind::Chapter => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables() {
        assert_eq!(table(TargetKind::Book), "books");
        assert_eq!(table(TargetKind::Comment), "comments");
    }
}
