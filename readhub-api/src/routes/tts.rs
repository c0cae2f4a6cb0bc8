/// Text-to-speech requests
///
/// `POST /v1/chapters/:id/tts` reuses the newest record for the same
/// chapter and voice unless it failed; otherwise a new record is created
/// and a `tts` job queued for the worker. Clients poll `GET /v1/tts/:id`
/// until the status is `completed` or `failed`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use readhub_shared::{
    auth::middleware::AuthContext,
    domain::{ChapterId, TtsId},
    models::{
        chapter::Chapter,
        job::{Job, JobKind, TtsPayload},
        tts::TextToSpeech,
    },
};
use serde::Deserialize;

const MAX_VOICE_LEN: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct TtsRequest {
    pub voice: Option<String>,
}

fn check_voice(voice: &str) -> ApiResult<()> {
    let valid = !voice.is_empty()
        && voice.len() <= MAX_VOICE_LEN
        && voice
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(ApiError::invalid(
            "voice",
            "Voice must be 1 to 50 letters, digits, '-', '_' or '.'",
        ))
    }
}

pub async fn request_tts(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    body: Option<Json<TtsRequest>>,
) -> ApiResult<(StatusCode, Json<TextToSpeech>)> {
    let chapter_id = ChapterId::parse(&id)?;
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let voice = req
        .voice
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| state.config.tts.default_voice.clone());
    check_voice(&voice)?;

    if Chapter::find(&state.db, chapter_id).await?.is_none() {
        return Err(ApiError::not_found("Chapter"));
    }

    if let Some(existing) = TextToSpeech::latest_for_chapter(&state.db, chapter_id, &voice).await? {
        return Ok((StatusCode::OK, Json(existing)));
    }

    let record = TextToSpeech::create(
        &state.db,
        chapter_id,
        &voice,
        &state.config.tts.provider,
        Some(auth.user_id),
    )
    .await?;

    Job::enqueue(&state.db, JobKind::Tts, &TtsPayload { tts_id: record.id }).await?;

    tracing::info!(tts_id = %record.id, chapter_id = %chapter_id, voice = %voice, "TTS requested");
    Ok((StatusCode::ACCEPTED, Json(record)))
}

pub async fn get_tts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TextToSpeech>> {
    let id = TtsId::parse(&id)?;
    let record = TextToSpeech::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("TTS request"))?;
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_voice() {
        assert!(check_voice("default").is_ok());
        assert!(check_voice("en-US_female.2").is_ok());
        assert!(check_voice("").is_err());
        assert!(check_voice("has space").is_err());
        assert!(check_voice(&"v".repeat(51)).is_err());
    }
}
