/// Redis-backed JSON cache and rate-limit counters
///
/// Every key is namespaced under `readhub:`. Cache reads and writes never
/// fail the caller: errors are logged and a read error is a miss. Expiries
/// get up to 10% random jitter so entries written together do not all expire
/// together.
///
/// # Example
///
/// ```no_run
/// use readhub_shared::cache::{keys, Cache};
/// use readhub_shared::cache::client::{RedisClient, RedisConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RedisClient::new(RedisConfig::new("redis://localhost:6379")).await?;
/// let cache = Cache::new(client);
///
/// cache.set_json(&keys::genres(), &vec!["fantasy"], 300).await;
/// let genres: Option<Vec<String>> = cache.get_json(&keys::genres()).await;
/// cache.delete_prefix(keys::BOOKS_PREFIX).await;
/// # Ok(())
/// # }
/// ```

pub mod client;

use client::{RedisClient, RedisClientError};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Prefix applied to every key
pub const NAMESPACE: &str = "readhub:";

/// Default TTL for cached entities (seconds)
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Cache key builders
pub mod keys {
    pub const BOOKS_PREFIX: &str = "books:";

    pub fn genres() -> String {
        "genres:all".to_string()
    }

    pub fn book(slug: &str) -> String {
        format!("{}slug:{}", BOOKS_PREFIX, slug)
    }

    /// First page of an unfiltered or genre/status-filtered listing
    pub fn book_list(genre: Option<&str>, status: Option<&str>, limit: i64) -> String {
        format!(
            "{}list:{}:{}:{}",
            BOOKS_PREFIX,
            genre.unwrap_or("*"),
            status.unwrap_or("*"),
            limit
        )
    }

    pub fn rate_limit(scope: &str, subject: &str) -> String {
        format!("ratelimit:{}:{}", scope, subject)
    }
}

/// Counter state for a fixed rate-limit window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Requests seen in the current window, including this one
    pub count: u64,
    /// Seconds until the window resets
    pub reset_in_secs: u64,
}

/// JSON cache over Redis
#[derive(Clone, Debug)]
pub struct Cache {
    client: RedisClient,
}

impl Cache {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    fn key(key: &str) -> String {
        format!("{}{}", NAMESPACE, key)
    }

    /// Cached value, `None` on miss, decode failure or Redis error
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.client.get_connection();
        let full_key = Self::key(key);

        let raw: Option<String> = match self
            .client
            .with_timeout(redis::cmd("GET").arg(&full_key).query_async(&mut conn))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %full_key, error = %e, "Cache read failed");
                return None;
            }
        };

        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key = %full_key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "Discarding undecodable cache entry");
                self.delete(key).await;
                None
            }
        }
    }

    /// Stores `value` for roughly `ttl_secs` seconds
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) {
        let full_key = Self::key(key);
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %full_key, error = %e, "Cache value failed to serialize");
                return;
            }
        };

        let mut conn = self.client.get_connection();
        let result: Result<(), RedisClientError> = self
            .client
            .with_timeout(
                redis::cmd("SET")
                    .arg(&full_key)
                    .arg(payload)
                    .arg("EX")
                    .arg(jittered_ttl(ttl_secs))
                    .query_async(&mut conn),
            )
            .await;

        if let Err(e) = result {
            warn!(key = %full_key, error = %e, "Cache write failed");
        }
    }

    pub async fn delete(&self, key: &str) {
        let full_key = Self::key(key);
        let mut conn = self.client.get_connection();
        let result: Result<i64, RedisClientError> = self
            .client
            .with_timeout(redis::cmd("DEL").arg(&full_key).query_async(&mut conn))
            .await;

        if let Err(e) = result {
            warn!(key = %full_key, error = %e, "Cache delete failed");
        }
    }

    /// Deletes every key under `prefix` using `SCAN`, returns how many went
    pub async fn delete_prefix(&self, prefix: &str) -> u64 {
        let pattern = format!("{}*", Self::key(prefix));
        let mut conn = self.client.get_connection();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let page: Result<(u64, Vec<String>), RedisClientError> = self
                .client
                .with_timeout(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(200)
                        .query_async(&mut conn),
                )
                .await;

            let (next, keys) = match page {
                Ok(page) => page,
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Cache prefix scan failed");
                    return deleted;
                }
            };

            if !keys.is_empty() {
                let removed: Result<u64, RedisClientError> = self
                    .client
                    .with_timeout(redis::cmd("DEL").arg(&keys).query_async(&mut conn))
                    .await;
                match removed {
                    Ok(n) => deleted += n,
                    Err(e) => warn!(pattern = %pattern, error = %e, "Cache prefix delete failed"),
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = %pattern, deleted, "Cache prefix invalidated");
        deleted
    }

    /// Counts a hit in a fixed window of `window_secs`
    ///
    /// Unlike the cache methods this returns the error; callers decide
    /// whether to fail open.
    pub async fn incr_window(
        &self,
        key: &str,
        window_secs: u64,
    ) -> Result<WindowCount, RedisClientError> {
        let full_key = Self::key(key);
        let mut conn = self.client.get_connection();

        let count: u64 = self
            .client
            .with_timeout(redis::cmd("INCR").arg(&full_key).query_async(&mut conn))
            .await?;

        if count == 1 {
            let _: i64 = self
                .client
                .with_timeout(
                    redis::cmd("EXPIRE")
                        .arg(&full_key)
                        .arg(window_secs)
                        .query_async(&mut conn),
                )
                .await?;
        }

        let ttl: i64 = self
            .client
            .with_timeout(redis::cmd("TTL").arg(&full_key).query_async(&mut conn))
            .await?;

        Ok(WindowCount {
            count,
            reset_in_secs: u64::try_from(ttl).unwrap_or(window_secs),
        })
    }
}

/// `ttl_secs` plus up to 10% random extra, never below one second
pub fn jittered_ttl(ttl_secs: u64) -> u64 {
    let ttl = ttl_secs.max(1);
    let spread = ttl / 10;
    if spread == 0 {
        return ttl;
    }
    ttl + rand::thread_rng().gen_range(0..=spread)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jittered_ttl_bounds() {
        for _ in 0..100 {
            let ttl = jittered_ttl(300);
            assert!((300..=330).contains(&ttl));
        }
        assert_eq!(jittered_ttl(0), 1);
        assert_eq!(jittered_ttl(5), 5);
    }

    #[test]
    fn test_keys() {
        assert_eq!(keys::book("dune"), "books:slug:dune");
        assert!(keys::book("dune").starts_with(keys::BOOKS_PREFIX));
        assert_eq!(keys::book_list(Some("sci-fi"), None, 20), "books:list:sci-fi:*:20");
        assert_eq!(keys::rate_limit("auth", "1.2.3.4"), "ratelimit:auth:1.2.3.4");
        assert_eq!(Cache::key("genres:all"), "readhub:genres:all");
    }
}
