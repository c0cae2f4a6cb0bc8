/// Side effects that follow a successful write
///
/// Rewards, cache invalidation and job enqueueing are secondary to the
/// request that triggers them: failures are logged and swallowed so a Redis
/// hiccup or a lost XP update never fails a comment or a chapter read.

use crate::app::AppState;
use chrono::Utc;
use readhub_shared::{
    cache::keys,
    domain::{BookId, ChapterId, UserId},
    gamification::{self, Achievement, XpEvent},
    models::{
        achievement,
        job::{EmbedPayload, Job, JobKind},
        reading::Reading,
        user::{StreakUpdate, User},
    },
};
use serde::Serialize;

/// XP and achievements earned by one action
#[derive(Debug, Clone, Default, Serialize)]
pub struct RewardSummary {
    pub xp_awarded: i64,
    pub new_achievements: Vec<Achievement>,
}

impl RewardSummary {
    fn merge(&mut self, other: RewardSummary) {
        self.xp_awarded += other.xp_awarded;
        self.new_achievements.extend(other.new_achievements);
    }
}

/// Outcome of opening a chapter while signed in
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadingReward {
    /// False when the chapter had been read before
    pub first_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak: Option<StreakUpdate>,
    #[serde(flatten)]
    pub rewards: RewardSummary,
}

/// Adds the event's XP, returning the amount actually granted
pub async fn award_xp(state: &AppState, user_id: UserId, event: XpEvent) -> i64 {
    adjust_xp(state, user_id, event.amount()).await
}

/// Takes back XP granted for an undone action (unlike, unfollow)
pub async fn revoke_xp(state: &AppState, user_id: UserId, event: XpEvent) {
    adjust_xp(state, user_id, -event.amount()).await;
}

async fn adjust_xp(state: &AppState, user_id: UserId, amount: i64) -> i64 {
    match User::add_xp(&state.db, user_id, amount).await {
        Ok(Some(_)) => amount,
        Ok(None) => 0,
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user_id, amount, "Failed to update XP");
            0
        }
    }
}

/// Awards every newly qualified achievement plus its XP bonus
pub async fn check_achievements(state: &AppState, user_id: UserId) -> RewardSummary {
    let stats = match User::stats(&state.db, user_id).await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user_id, "Failed to load stats for achievements");
            return RewardSummary::default();
        }
    };

    let mut summary = RewardSummary::default();
    for code in gamification::evaluate(&stats) {
        match achievement::Achievement::award(&state.db, user_id, code).await {
            Ok(true) => {
                let achievement = code.definition();
                summary.xp_awarded += adjust_xp(state, user_id, achievement.xp_bonus).await;
                tracing::info!(user_id = %user_id, code = %code, "Achievement unlocked");
                summary.new_achievements.push(achievement);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, code = %code, "Failed to award achievement");
            }
        }
    }
    summary
}

/// XP for `event` followed by an achievement check
pub async fn reward(state: &AppState, user_id: UserId, event: XpEvent) -> RewardSummary {
    let mut summary = RewardSummary {
        xp_awarded: award_xp(state, user_id, event).await,
        new_achievements: Vec::new(),
    };
    summary.merge(check_achievements(state, user_id).await);
    summary
}

/// Records a chapter read: first-read XP, today's streak, achievements
pub async fn reward_reading(
    state: &AppState,
    user_id: UserId,
    chapter_id: ChapterId,
    book_id: BookId,
) -> ReadingReward {
    let first_read = match Reading::record_chapter_read(&state.db, user_id, chapter_id, book_id).await {
        Ok(first) => first,
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user_id, chapter_id = %chapter_id, "Failed to record chapter read");
            return ReadingReward::default();
        }
    };

    let streak = match User::record_reading_day(&state.db, user_id, Utc::now().date_naive()).await {
        Ok(streak) => streak,
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user_id, "Failed to update reading streak");
            None
        }
    };

    let rewards = if first_read {
        reward(state, user_id, XpEvent::ReadChapter).await
    } else if streak.map(|s| s.changed).unwrap_or(false) {
        // A new reading day can complete a streak achievement
        check_achievements(state, user_id).await
    } else {
        RewardSummary::default()
    };

    ReadingReward {
        first_read,
        streak,
        rewards,
    }
}

/// Drops every cached book detail and listing
pub async fn invalidate_books(state: &AppState) {
    if let Some(cache) = &state.cache {
        cache.delete_prefix(keys::BOOKS_PREFIX).await;
    }
}

pub async fn invalidate_genres(state: &AppState) {
    if let Some(cache) = &state.cache {
        cache.delete(&keys::genres()).await;
    }
}

/// Queues a rebuild of the book's search vector
pub async fn enqueue_embed(state: &AppState, book_id: BookId) {
    if let Err(e) = Job::enqueue(&state.db, JobKind::Embed, &EmbedPayload { book_id }).await {
        tracing::warn!(error = %e, book_id = %book_id, "Failed to enqueue embed job");
    }
}
