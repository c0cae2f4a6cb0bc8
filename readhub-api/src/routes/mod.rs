/// API route handlers
///
/// One module per resource:
///
/// - `health`: liveness and dependency status
/// - `auth`: register, login, refresh, current user
/// - `users`: profiles, follows, avatars
/// - `genres`, `books`, `chapters`: the catalogue
/// - `comments`, `likes`, `posts`: social features
/// - `reading`: progress and reading lists
/// - `onboarding`: the onboarding step machine
/// - `achievements`: gamification catalogue and awards
/// - `tts`: text-to-speech requests
/// - `admin`: analytics and moderation

pub mod achievements;
pub mod admin;
pub mod auth;
pub mod books;
pub mod chapters;
pub mod comments;
pub mod genres;
pub mod health;
pub mod likes;
pub mod onboarding;
pub mod posts;
pub mod reading;
pub mod tts;
pub mod users;

use crate::error::{ApiError, ApiResult};
use axum::extract::Multipart;
use bytes::Bytes;
use readhub_shared::domain::TargetKind;
use uuid::Uuid;

/// First `file` field of a multipart upload, with its content type
pub(crate) async fn read_file_field(multipart: &mut Multipart) -> ApiResult<(Bytes, String)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = field.bytes().await?;
        return Ok((bytes, content_type));
    }

    Err(ApiError::invalid("file", "A file field is required"))
}

/// Parses a `(kind, id)` pair addressing a like or comment target
pub(crate) fn parse_target(kind: &str, id: &str) -> ApiResult<(TargetKind, Uuid)> {
    let kind: TargetKind = kind.parse()?;
    let id = Uuid::parse_str(id.trim())
        .map_err(|_| ApiError::BadRequest(format!("Malformed identifier: {}", id)))?;
    Ok((kind, id))
}

/// Trims and drops empty strings
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        let id = Uuid::new_v4();
        let (kind, parsed) = parse_target("chapters", &id.to_string()).unwrap();
        assert_eq!(kind, TargetKind::Chapter);
        assert_eq!(parsed, id);

        assert!(matches!(
            parse_target("shelf", &id.to_string()),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            parse_target("post", "nope"),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some("   ".into())), None);
        assert_eq!(non_empty(Some(" fantasy ".into())), Some("fantasy".into()));
    }
}
