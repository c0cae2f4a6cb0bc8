/// Persistence for the onboarding step machine
///
/// The machine itself lives in [`crate::onboarding`]; this module loads a
/// reader's row (creating it on first access) and writes back whatever the
/// machine produced.

use crate::domain::UserId;
use crate::onboarding::{OnboardingState, OnboardingStep};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Onboarding {
    pub user_id: UserId,
    pub step: OnboardingStep,
    pub favorite_genres: Vec<String>,
    pub reading_goal: Option<i32>,
    pub skipped: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Onboarding {
    pub fn state(&self) -> OnboardingState {
        OnboardingState {
            step: self.step,
            favorite_genres: self.favorite_genres.clone(),
            reading_goal: self.reading_goal,
            skipped: self.skipped,
        }
    }

    /// The reader's onboarding row, created at `welcome` if missing
    pub async fn get_or_create(pool: &PgPool, user_id: UserId) -> Result<Self, sqlx::Error> {
        sqlx::query("INSERT INTO onboarding (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(pool)
            .await?;

        sqlx::query_as::<_, Onboarding>(
            r#"
            SELECT user_id, step, favorite_genres, reading_goal, skipped,
                   created_at, updated_at, completed_at
            FROM onboarding
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Persists a machine state; `completed_at` is stamped once
    pub async fn save(
        pool: &PgPool,
        user_id: UserId,
        state: &OnboardingState,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Onboarding>(
            r#"
            INSERT INTO onboarding (user_id, step, favorite_genres, reading_goal, skipped, completed_at)
            VALUES ($1, $2, $3, $4, $5, CASE WHEN $2 = 'completed'::onboarding_step THEN NOW() END)
            ON CONFLICT (user_id) DO UPDATE
            SET step = EXCLUDED.step,
                favorite_genres = EXCLUDED.favorite_genres,
                reading_goal = EXCLUDED.reading_goal,
                skipped = EXCLUDED.skipped,
                completed_at = CASE
                    WHEN EXCLUDED.step = 'completed' THEN COALESCE(onboarding.completed_at, NOW())
                    ELSE NULL
                END,
                updated_at = NOW()
            RETURNING user_id, step, favorite_genres, reading_goal, skipped,
                      created_at, updated_at, completed_at
            "#,
        )
        .bind(user_id)
        .bind(state.step)
        .bind(&state.favorite_genres)
        .bind(state.reading_goal)
        .bind(state.skipped)
        .fetch_one(pool)
        .await
    }
}
