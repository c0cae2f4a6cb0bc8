/// Text-to-speech requests
///
/// A record is created when a reader asks for a chapter's audio and is
/// filled in by the worker: `pending -> processing -> completed | failed`.
/// A transient failure that will be retried moves it back to `pending`.
/// Audio is stored as an ordered list of segments, one file per text chunk.

use crate::domain::{ChapterId, TtsId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;

const TTS_COLUMNS: &str = "id, chapter_id, voice, provider, status, segments, error, requested_by, \
     created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tts_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TtsStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One stored audio file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsSegment {
    pub index: usize,
    pub url: String,
    pub content_type: String,
    /// Characters of text this segment speaks
    pub chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TextToSpeech {
    pub id: TtsId,
    pub chapter_id: ChapterId,
    pub voice: String,
    pub provider: String,
    pub status: TtsStatus,
    pub segments: Json<Vec<TtsSegment>>,
    pub error: Option<String>,
    pub requested_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TextToSpeech {
    pub async fn create(
        pool: &PgPool,
        chapter_id: ChapterId,
        voice: &str,
        provider: &str,
        requested_by: Option<UserId>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, TextToSpeech>(&format!(
            r#"
            INSERT INTO text_to_speech (chapter_id, voice, provider, requested_by)
            VALUES ($1, $2, $3, $4)
            RETURNING {TTS_COLUMNS}
            "#
        ))
        .bind(chapter_id)
        .bind(voice)
        .bind(provider)
        .bind(requested_by)
        .fetch_one(pool)
        .await
    }

    pub async fn find(pool: &PgPool, id: TtsId) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TextToSpeech>(&format!(
            "SELECT {TTS_COLUMNS} FROM text_to_speech WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Newest request for a chapter and voice that has not failed
    pub async fn latest_for_chapter(
        pool: &PgPool,
        chapter_id: ChapterId,
        voice: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TextToSpeech>(&format!(
            r#"
            SELECT {TTS_COLUMNS}
            FROM text_to_speech
            WHERE chapter_id = $1 AND voice = $2 AND status <> 'failed'
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(chapter_id)
        .bind(voice)
        .fetch_optional(pool)
        .await
    }

    /// Moves `pending` (or a retried `failed`) record to `processing`
    pub async fn mark_processing(pool: &PgPool, id: TtsId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE text_to_speech
            SET status = 'processing', error = NULL, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing', 'failed')
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_completed(
        pool: &PgPool,
        id: TtsId,
        segments: &[TtsSegment],
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE text_to_speech
            SET status = 'completed', segments = $2, error = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(segments))
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Back to `pending` while its job waits for a retry; `error` keeps the
    /// reason of the last attempt
    pub async fn mark_pending(pool: &PgPool, id: TtsId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE text_to_speech
            SET status = 'pending', error = $2, updated_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_failed(pool: &PgPool, id: TtsId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE text_to_speech
            SET status = 'failed', error = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
