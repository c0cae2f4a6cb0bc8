/// Stored book vectors for semantic search

use crate::domain::BookId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct BookEmbedding {
    pub book_id: BookId,
    pub vector: Vec<f32>,
    pub model: String,
    pub updated_at: DateTime<Utc>,
}

impl BookEmbedding {
    pub async fn upsert(
        pool: &PgPool,
        book_id: BookId,
        vector: &[f32],
        model: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO book_embeddings (book_id, vector, model)
            VALUES ($1, $2, $3)
            ON CONFLICT (book_id) DO UPDATE
            SET vector = EXCLUDED.vector, model = EXCLUDED.model, updated_at = NOW()
            "#,
        )
        .bind(book_id)
        .bind(vector)
        .bind(model)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Every vector produced by `model`, for ranking
    ///
    /// Draft books are excluded unless `include_drafts`.
    pub async fn all(
        pool: &PgPool,
        model: &str,
        include_drafts: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BookEmbedding>(
            r#"
            SELECT e.book_id, e.vector, e.model, e.updated_at
            FROM book_embeddings e
            JOIN books b ON b.id = e.book_id
            WHERE e.model = $1 AND ($2 OR b.status <> 'draft')
            "#,
        )
        .bind(model)
        .bind(include_drafts)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, book_id: BookId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM book_embeddings WHERE book_id = $1")
            .bind(book_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
