/// Database models for ReadHub
///
/// Each model exposes async associated functions over `&PgPool` returning
/// `Result<_, sqlx::Error>` (or a model-specific error where a write has
/// business preconditions).
///
/// # Models
///
/// - `user`: accounts, profiles, XP and streak counters
/// - `genre`, `book`, `chapter`: the catalogue
/// - `comment`, `like`, `follow`, `post`: social features
/// - `reading`: progress bookmarks, chapter reads and reading lists
/// - `onboarding`, `achievement`: per-reader gamification state
/// - `tts`, `job`, `embedding`: worker-produced data
/// - `analytics`: admin aggregates
/// - `target`: lookups shared by likes and comments

pub mod achievement;
pub mod analytics;
pub mod book;
pub mod chapter;
pub mod comment;
pub mod embedding;
pub mod follow;
pub mod genre;
pub mod job;
pub mod like;
pub mod onboarding;
pub mod post;
pub mod reading;
pub mod target;
pub mod tts;
pub mod user;

/// Whether an error is a unique-constraint violation, and on which constraint
pub fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            Some(db_err.constraint().unwrap_or("unique").to_string())
        }
        _ => None,
    }
}

/// Whether an error is a foreign-key violation
pub fn foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23503"))
}
