/// Gamification rules: XP, levels, reading streaks and achievements
///
/// Everything here is pure; the API layer feeds it numbers pulled from the
/// database and persists what comes back (`User::add_xp`,
/// `User::record_reading_day`, `Achievement::award`).
///
/// # Levels
///
/// Level `n` requires `50 * n * (n - 1)` cumulative XP, so level 1 starts at
/// 0, level 2 at 100, level 3 at 300, level 4 at 600 and each level costs
/// 100 XP more than the previous one.
///
/// ```
/// use readhub_shared::gamification::level_for_xp;
///
/// let info = level_for_xp(350);
/// assert_eq!(info.level, 3);
/// assert_eq!(info.xp_into_level, 50);
/// assert_eq!(info.xp_for_next, 300);
/// ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Something that earns XP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XpEvent {
    ReadChapter,
    Comment,
    Post,
    /// Awarded to the owner of the liked content
    ReceiveLike,
    Follow,
    FinishBook,
}

impl XpEvent {
    pub fn amount(&self) -> i64 {
        match self {
            XpEvent::ReadChapter => 10,
            XpEvent::Comment => 5,
            XpEvent::Post => 5,
            XpEvent::ReceiveLike => 2,
            XpEvent::Follow => 1,
            XpEvent::FinishBook => 50,
        }
    }
}

/// Cumulative XP at which `level` starts, saturating at `i64::MAX`
pub fn xp_for_level(level: u32) -> i64 {
    level_threshold(level).unwrap_or(i64::MAX)
}

fn level_threshold(level: u32) -> Option<i64> {
    let n = i64::from(level.max(1));
    50i64.checked_mul(n)?.checked_mul(n - 1)
}

/// Where a user stands within their current level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelInfo {
    pub level: u32,
    pub xp: i64,
    /// XP earned since the current level started
    pub xp_into_level: i64,
    /// XP span of the current level
    pub xp_for_next: i64,
}

pub fn level_for_xp(xp: i64) -> LevelInfo {
    let xp = xp.max(0);

    // Solving 50n(n-1) <= xp gives n = floor((1 + sqrt(1 + xp/12.5)) / 2);
    // the float estimate is corrected against the exact thresholds.
    let estimate = ((1.0 + (1.0 + xp as f64 / 12.5).sqrt()) / 2.0).floor();
    let mut level = (estimate as u32).max(1);
    while level > 1 && level_threshold(level).map_or(true, |start| start > xp) {
        level -= 1;
    }
    while level_threshold(level + 1).is_some_and(|start| start <= xp) {
        level += 1;
    }

    let floor = xp_for_level(level);
    LevelInfo {
        level,
        xp,
        xp_into_level: xp - floor,
        xp_for_next: xp_for_level(level + 1) - floor,
    }
}

/// Streak after reading on `today`
///
/// Same day leaves the streak as it is (at least 1), the following day
/// extends it and any gap starts over at 1.
pub fn next_streak(last_read_on: Option<NaiveDate>, today: NaiveDate, current: i32) -> i32 {
    match last_read_on {
        Some(last) if last == today => current.max(1),
        Some(last) if last.succ_opt() == Some(today) => current.saturating_add(1),
        _ => 1,
    }
}

/// Achievement identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCode {
    FirstChapter,
    #[serde(rename = "bookworm_10")]
    Bookworm10,
    #[serde(rename = "bookworm_100")]
    Bookworm100,
    FirstComment,
    #[serde(rename = "conversationalist_50")]
    Conversationalist50,
    SocialButterfly,
    #[serde(rename = "streak_7")]
    Streak7,
    #[serde(rename = "streak_30")]
    Streak30,
    Finisher,
}

impl AchievementCode {
    pub const ALL: [AchievementCode; 9] = [
        AchievementCode::FirstChapter,
        AchievementCode::Bookworm10,
        AchievementCode::Bookworm100,
        AchievementCode::FirstComment,
        AchievementCode::Conversationalist50,
        AchievementCode::SocialButterfly,
        AchievementCode::Streak7,
        AchievementCode::Streak30,
        AchievementCode::Finisher,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementCode::FirstChapter => "first_chapter",
            AchievementCode::Bookworm10 => "bookworm_10",
            AchievementCode::Bookworm100 => "bookworm_100",
            AchievementCode::FirstComment => "first_comment",
            AchievementCode::Conversationalist50 => "conversationalist_50",
            AchievementCode::SocialButterfly => "social_butterfly",
            AchievementCode::Streak7 => "streak_7",
            AchievementCode::Streak30 => "streak_30",
            AchievementCode::Finisher => "finisher",
        }
    }

    /// Catalogue entry for this code
    pub fn definition(&self) -> Achievement {
        let (title, description, xp_bonus) = match self {
            AchievementCode::FirstChapter => ("First Chapter", "Read your first chapter", 10),
            AchievementCode::Bookworm10 => ("Bookworm", "Read 10 chapters", 25),
            AchievementCode::Bookworm100 => ("Devourer", "Read 100 chapters", 100),
            AchievementCode::FirstComment => ("Speaking Up", "Post your first comment", 10),
            AchievementCode::Conversationalist50 => {
                ("Conversationalist", "Post 50 comments", 50)
            }
            AchievementCode::SocialButterfly => ("Social Butterfly", "Follow 10 readers", 20),
            AchievementCode::Streak7 => ("On a Roll", "Read 7 days in a row", 30),
            AchievementCode::Streak30 => ("Unstoppable", "Read 30 days in a row", 150),
            AchievementCode::Finisher => ("Finisher", "Complete a book", 50),
        };

        Achievement {
            code: *self,
            title,
            description,
            xp_bonus,
        }
    }
}

impl fmt::Display for AchievementCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown achievement code: {0}")]
pub struct UnknownAchievement(pub String);

impl FromStr for AchievementCode {
    type Err = UnknownAchievement;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AchievementCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownAchievement(s.to_string()))
    }
}

/// Catalogue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Achievement {
    pub code: AchievementCode,
    pub title: &'static str,
    pub description: &'static str,
    pub xp_bonus: i64,
}

/// The full achievement catalogue, in display order
pub fn catalogue() -> Vec<Achievement> {
    AchievementCode::ALL.iter().map(|c| c.definition()).collect()
}

/// Counters achievements are evaluated against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub chapters_read: i64,
    pub comments: i64,
    pub following: i64,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub books_completed: i64,
}

/// Every achievement the stats qualify for
///
/// Callers award the result idempotently, so already-held codes are
/// returned as well.
pub fn evaluate(stats: &UserStats) -> Vec<AchievementCode> {
    let streak = stats.current_streak.max(stats.longest_streak);

    AchievementCode::ALL
        .iter()
        .copied()
        .filter(|code| match code {
            AchievementCode::FirstChapter => stats.chapters_read >= 1,
            AchievementCode::Bookworm10 => stats.chapters_read >= 10,
            AchievementCode::Bookworm100 => stats.chapters_read >= 100,
            AchievementCode::FirstComment => stats.comments >= 1,
            AchievementCode::Conversationalist50 => stats.comments >= 50,
            AchievementCode::SocialButterfly => stats.following >= 10,
            AchievementCode::Streak7 => streak >= 7,
            AchievementCode::Streak30 => streak >= 30,
            AchievementCode::Finisher => stats.books_completed >= 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(xp_for_level(1), 0);
        assert_eq!(xp_for_level(2), 100);
        assert_eq!(xp_for_level(3), 300);
        assert_eq!(xp_for_level(4), 600);

        assert_eq!(level_for_xp(0).level, 1);
        assert_eq!(level_for_xp(99).level, 1);
        assert_eq!(level_for_xp(100).level, 2);
        assert_eq!(level_for_xp(299).level, 2);
        assert_eq!(level_for_xp(300).level, 3);
        assert_eq!(level_for_xp(-10).level, 1);
    }

    #[test]
    fn test_level_matches_thresholds() {
        for xp in (0..60_000).step_by(7).chain([99, 100, 4_999_999, 5_000_000]) {
            let info = level_for_xp(xp);
            assert!(xp_for_level(info.level) <= xp, "xp {xp}");
            assert!(xp_for_level(info.level + 1) > xp, "xp {xp}");
        }
    }

    #[test]
    fn test_level_for_huge_xp() {
        let info = level_for_xp(i64::MAX);
        assert!(info.level > 400_000_000);
        assert!(info.xp_into_level >= 0);
        assert!(info.xp_for_next > 0);
        assert_eq!(xp_for_level(u32::MAX), i64::MAX);
    }

    #[test]
    fn test_level_progress() {
        let info = level_for_xp(150);
        assert_eq!(info.level, 2);
        assert_eq!(info.xp_into_level, 50);
        assert_eq!(info.xp_for_next, 200);
    }

    #[test]
    fn test_streak_rules() {
        assert_eq!(next_streak(None, day(10), 0), 1);
        assert_eq!(next_streak(Some(day(10)), day(10), 4), 4);
        assert_eq!(next_streak(Some(day(10)), day(10), 0), 1);
        assert_eq!(next_streak(Some(day(9)), day(10), 4), 5);
        assert_eq!(next_streak(Some(day(7)), day(10), 4), 1);
    }

    #[test]
    fn test_xp_amounts() {
        assert_eq!(XpEvent::ReadChapter.amount(), 10);
        assert_eq!(XpEvent::ReceiveLike.amount(), 2);
        assert_eq!(XpEvent::FinishBook.amount(), 50);
    }

    #[test]
    fn test_evaluate_fresh_user() {
        assert!(evaluate(&UserStats::default()).is_empty());
    }

    #[test]
    fn test_evaluate_thresholds() {
        let stats = UserStats {
            chapters_read: 12,
            comments: 1,
            following: 10,
            current_streak: 2,
            longest_streak: 8,
            books_completed: 0,
        };

        let earned = evaluate(&stats);
        assert_eq!(
            earned,
            vec![
                AchievementCode::FirstChapter,
                AchievementCode::Bookworm10,
                AchievementCode::FirstComment,
                AchievementCode::SocialButterfly,
                AchievementCode::Streak7,
            ]
        );
    }

    #[test]
    fn test_code_parse_roundtrip() {
        for code in AchievementCode::ALL {
            assert_eq!(code.as_str().parse::<AchievementCode>(), Ok(code));
        }
        assert!("nope".parse::<AchievementCode>().is_err());
        assert_eq!(catalogue().len(), 9);
    }
}
