/// Awarded achievements
///
/// The catalogue is static ([`crate::gamification`]); this table only records
/// which codes each user holds.

use crate::domain::UserId;
use crate::gamification::AchievementCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct AchievementAward {
    pub code: String,
    pub awarded_at: DateTime<Utc>,
}

impl AchievementAward {
    /// Parsed code, `None` for codes retired from the catalogue
    pub fn achievement(&self) -> Option<AchievementCode> {
        self.code.parse().ok()
    }
}

pub struct Achievement;

impl Achievement {
    /// Awards a code; `true` only the first time
    pub async fn award(pool: &PgPool, user_id: UserId, code: AchievementCode) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_achievements (user_id, code)
            VALUES ($1, $2)
            ON CONFLICT (user_id, code) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(code.as_str())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_user(pool: &PgPool, user_id: UserId) -> Result<Vec<AchievementAward>, sqlx::Error> {
        sqlx::query_as::<_, AchievementAward>(
            "SELECT code, awarded_at FROM user_achievements WHERE user_id = $1 ORDER BY awarded_at, code",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
