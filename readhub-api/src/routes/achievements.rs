/// Achievement catalogue and the caller's awards

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use readhub_shared::{
    auth::middleware::AuthContext,
    gamification::{self, Achievement, LevelInfo},
    models::{achievement, user::User},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct EarnedAchievement {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub awarded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MyAchievements {
    pub level: Option<LevelInfo>,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub earned: Vec<EarnedAchievement>,
}

pub async fn catalogue() -> Json<Vec<Achievement>> {
    Json(gamification::catalogue())
}

pub async fn mine(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<MyAchievements>> {
    let awards = achievement::Achievement::list_for_user(&state.db, auth.user_id).await?;
    let user = User::find_by_id(&state.db, auth.user_id).await?;

    // Codes no longer in the catalogue are dropped
    let earned = awards
        .into_iter()
        .filter_map(|award| {
            award.achievement().map(|code| EarnedAchievement {
                achievement: code.definition(),
                awarded_at: award.awarded_at,
            })
        })
        .collect();

    Ok(Json(MyAchievements {
        level: user.as_ref().map(User::level),
        current_streak: user.as_ref().map(|u| u.current_streak).unwrap_or(0),
        longest_streak: user.as_ref().map(|u| u.longest_streak).unwrap_or(0),
        earned,
    }))
}
