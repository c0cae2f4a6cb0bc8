/// User model and database operations
///
/// Users are readers or admins. Besides credentials and profile fields the
/// row carries the gamification counters (`xp`, streaks) so profile pages
/// need a single lookup.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL,            -- unique on lower(email)
///     username VARCHAR(30) NOT NULL,          -- unique on lower(username)
///     password_hash VARCHAR(255) NOT NULL,
///     display_name VARCHAR(100),
///     bio TEXT,
///     avatar_url VARCHAR(512),
///     role user_role NOT NULL DEFAULT 'reader',
///     xp BIGINT NOT NULL DEFAULT 0,
///     current_streak INTEGER NOT NULL DEFAULT 0,
///     longest_streak INTEGER NOT NULL DEFAULT 0,
///     last_read_on DATE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use readhub_shared::models::user::{CreateUser, User};
/// use readhub_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::new("postgresql://localhost/readhub", 5)).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: "Reader@Example.com".to_string(),
///     username: "reader_one".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     display_name: None,
/// }).await?;
/// assert_eq!(user.email, "reader@example.com");
///
/// let found = User::find_by_username(&pool, "READER_ONE").await?;
/// assert!(found.is_some());
/// # Ok(())
/// # }
/// ```

use crate::domain::UserId;
use crate::gamification::{self, LevelInfo, UserStats};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

const USER_COLUMNS: &str = "id, email, username, password_hash, display_name, bio, avatar_url, \
     role, xp, current_streak, longest_streak, last_read_on, created_at, updated_at, last_login_at";

/// Platform role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Reader,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Reader => "reader",
            UserRole::Admin => "admin",
        }
    }
}

/// User account
///
/// `password_hash` is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,

    /// Stored lowercase
    pub email: String,

    /// Unique case-insensitively, original casing preserved
    pub username: String,

    /// Argon2id PHC string
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub role: UserRole,

    pub xp: i64,
    pub current_streak: i32,
    pub longest_streak: i32,

    /// Last calendar day (UTC) with a chapter read
    pub last_read_on: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Input for creating a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub username: String,
    /// Argon2id hash, not the plaintext password
    pub password_hash: String,
    pub display_name: Option<String>,
}

/// Profile changes; `Some(None)` clears a field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub display_name: Option<Option<String>>,
    pub bio: Option<Option<String>>,
}

impl UpdateProfile {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.bio.is_none()
    }
}

/// Result of recording a reading day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreakUpdate {
    pub current_streak: i32,
    pub longest_streak: i32,
    /// False when the reader had already read today
    pub changed: bool,
}

/// What other readers see on a profile page
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub level: LevelInfo,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub followers: i64,
    pub following: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn level(&self) -> LevelInfo {
        gamification::level_for_xp(self.xp)
    }

    /// Public projection with follower counts filled in
    pub fn public_profile(&self, followers: i64, following: i64) -> PublicProfile {
        PublicProfile {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            bio: self.bio.clone(),
            avatar_url: self.avatar_url.clone(),
            level: self.level(),
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            followers,
            following,
            created_at: self.created_at,
        }
    }

    /// Creates a user; the email is lowercased
    ///
    /// # Errors
    ///
    /// Unique violations on `users_email_key` / `users_username_key` when the
    /// email or username is taken.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, username, password_hash, display_name)
            VALUES (lower($1), $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(data.email.trim())
        .bind(data.username)
        .bind(data.password_hash)
        .bind(data.display_name)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, id: UserId) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Case-insensitive email lookup
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.trim())
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Case-insensitive username lookup
    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(username) = lower($1)"
        ))
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Applies the present fields of `data`
    pub async fn update_profile(
        pool: &PgPool,
        id: UserId,
        data: UpdateProfile,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE users SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.display_name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", display_name = ${}", bind_count));
        }
        if data.bio.is_some() {
            bind_count += 1;
            query.push_str(&format!(", bio = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {USER_COLUMNS}"));

        let mut q = sqlx::query_as::<_, User>(&query).bind(id);
        if let Some(display_name) = data.display_name {
            q = q.bind(display_name);
        }
        if let Some(bio) = data.bio {
            q = q.bind(bio);
        }

        let user = q.fetch_optional(pool).await?;
        Ok(user)
    }

    /// Sets or clears the avatar, returning the previous URL
    pub async fn set_avatar(
        pool: &PgPool,
        id: UserId,
        avatar_url: Option<String>,
    ) -> Result<Option<Option<String>>, sqlx::Error> {
        let previous: Option<Option<String>> = sqlx::query_scalar(
            r#"
            UPDATE users u
            SET avatar_url = $2, updated_at = NOW()
            FROM (SELECT id, avatar_url FROM users WHERE id = $1 FOR UPDATE) old
            WHERE u.id = old.id
            RETURNING old.avatar_url
            "#,
        )
        .bind(id)
        .bind(avatar_url)
        .fetch_optional(pool)
        .await?;

        Ok(previous)
    }

    pub async fn set_role(
        pool: &PgPool,
        id: UserId,
        role: UserRole,
    ) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET role = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn update_last_login(pool: &PgPool, id: UserId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Adds (or with a negative amount removes) XP, never dropping below 0
    ///
    /// Returns the new total, `None` if the user does not exist.
    pub async fn add_xp(pool: &PgPool, id: UserId, amount: i64) -> Result<Option<i64>, sqlx::Error> {
        let xp = sqlx::query_scalar(
            r#"
            UPDATE users SET xp = GREATEST(xp + $2, 0)
            WHERE id = $1
            RETURNING xp
            "#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(pool)
        .await?;

        Ok(xp)
    }

    /// Marks `today` as a reading day and updates the streak counters
    pub async fn record_reading_day(
        pool: &PgPool,
        id: UserId,
        today: NaiveDate,
    ) -> Result<Option<StreakUpdate>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let row: Option<(Option<NaiveDate>, i32, i32)> = sqlx::query_as(
            "SELECT last_read_on, current_streak, longest_streak FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((last_read_on, current, longest)) = row else {
            return Ok(None);
        };

        if last_read_on == Some(today) {
            tx.commit().await?;
            return Ok(Some(StreakUpdate {
                current_streak: current.max(1),
                longest_streak: longest.max(1),
                changed: false,
            }));
        }

        let current = gamification::next_streak(last_read_on, today, current);
        let longest = longest.max(current);

        sqlx::query(
            r#"
            UPDATE users
            SET last_read_on = $2, current_streak = $3, longest_streak = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(today)
        .bind(current)
        .bind(longest)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(StreakUpdate {
            current_streak: current,
            longest_streak: longest,
            changed: true,
        }))
    }

    /// Counters for achievement evaluation
    pub async fn stats(pool: &PgPool, id: UserId) -> Result<UserStats, sqlx::Error> {
        let (chapters_read, comments, following, books_completed, current_streak, longest_streak): (
            i64,
            i64,
            i64,
            i64,
            i32,
            i32,
        ) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM chapter_reads WHERE user_id = $1),
                (SELECT COUNT(*) FROM comments WHERE user_id = $1 AND NOT deleted),
                (SELECT COUNT(*) FROM follows WHERE follower_id = $1),
                (SELECT COUNT(*) FROM reading_list WHERE user_id = $1 AND status = 'completed'),
                COALESCE((SELECT current_streak FROM users WHERE id = $1), 0),
                COALESCE((SELECT longest_streak FROM users WHERE id = $1), 0)
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(UserStats {
            chapters_read,
            comments,
            following,
            current_streak,
            longest_streak,
            books_completed,
        })
    }

    /// Newest first, for the admin table
    pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Self>, sqlx::Error> {
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await?;

        Ok(count.0)
    }

    /// Readers to suggest during onboarding: most followed, excluding `id`
    /// and people `id` already follows
    pub async fn suggestions(pool: &PgPool, id: UserId, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {cols}
            FROM users u
            LEFT JOIN (
                SELECT followee_id, COUNT(*) AS n FROM follows GROUP BY followee_id
            ) f ON f.followee_id = u.id
            WHERE u.id <> $1
              AND NOT EXISTS (
                  SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = u.id
              )
            ORDER BY COALESCE(f.n, 0) DESC, u.xp DESC, u.id
            LIMIT $2
            "#,
            cols = prefixed_columns("u")
        ))
        .bind(id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }
}

/// `USER_COLUMNS` qualified with a table alias
pub(crate) fn prefixed_columns(alias: &str) -> String {
    USER_COLUMNS
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> User {
        User {
            id: UserId::new(),
            email: "reader@example.com".into(),
            username: "reader".into(),
            password_hash: "$argon2id$secret".into(),
            display_name: Some("Reader".into()),
            bio: None,
            avatar_url: None,
            role: UserRole::Reader,
            xp: 120,
            current_streak: 3,
            longest_streak: 5,
            last_read_on: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "reader");
    }

    #[test]
    fn test_public_profile() {
        let user = sample();
        let profile = user.public_profile(4, 2);
        assert_eq!(profile.level.level, 2);
        assert_eq!(profile.followers, 4);
        assert_eq!(profile.following, 2);
    }

    #[test]
    fn test_prefixed_columns() {
        let cols = prefixed_columns("u");
        assert!(cols.starts_with("u.id, u.email"));
        assert!(cols.ends_with("u.last_login_at"));
    }

    #[test]
    fn test_update_profile_is_empty() {
        assert!(UpdateProfile::default().is_empty());
        let update = UpdateProfile {
            bio: Some(None),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
