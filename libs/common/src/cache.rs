//! Redis cache module
//!
//! This module provides the Redis client used when per-process state has to
//! be shared between replicas, such as admission windows.

use anyhow::Result;
use redis::{Client, Script};
use tracing::info;

/// Fixed-window admission evaluated atomically on the Redis side.
///
/// Returns `{1, 0}` when admitted and `{0, remaining_ms}` when rejected.
/// A rejected call leaves the counter untouched.
const FIXED_WINDOW_SCRIPT: &str = r#"
local count = tonumber(redis.call('GET', KEYS[1]) or '0')
if count == 0 then
  redis.call('SET', KEYS[1], 1, 'PX', ARGV[2])
  return {1, 0}
end
if count >= tonumber(ARGV[1]) then
  return {0, redis.call('PTTL', KEYS[1])}
end
redis.call('INCR', KEYS[1])
return {1, 0}
"#;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    pub fn from_env() -> Self {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        RedisConfig { url }
    }
}

/// Outcome of a fixed-window hit recorded in Redis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    pub admitted: bool,
    /// Milliseconds until the window resets; zero when admitted
    pub remaining_ms: u64,
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Initialize a new Redis client
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Record one hit against a fixed window of `window_ms` admitting at most
    /// `limit` hits
    pub async fn fixed_window_hit(&self, key: &str, limit: u32, window_ms: u64) -> Result<WindowHit> {
        let mut conn = self.get_connection().await?;
        let (admitted, remaining_ms): (i64, i64) = Script::new(FIXED_WINDOW_SCRIPT)
            .key(key)
            .arg(limit)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowHit {
            admitted: admitted == 1,
            remaining_ms: u64::try_from(remaining_ms).unwrap_or(0),
        })
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_config() -> Option<RedisConfig> {
        std::env::var("REDIS_URL").ok().map(|url| RedisConfig { url })
    }

    #[tokio::test]
    async fn test_redis_connection() -> Result<()> {
        let Some(config) = redis_config() else {
            return Ok(());
        };

        let pool = RedisPool::new(&config)?;
        assert!(pool.health_check().await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_fixed_window_rejects_after_limit() -> Result<()> {
        let Some(config) = redis_config() else {
            return Ok(());
        };

        let pool = RedisPool::new(&config)?;
        let key = format!("test_window:{}", std::process::id());

        for _ in 0..3 {
            assert!(pool.fixed_window_hit(&key, 3, 5_000).await?.admitted);
        }
        let rejected = pool.fixed_window_hit(&key, 3, 5_000).await?;
        assert!(!rejected.admitted);
        assert!(rejected.remaining_ms > 0 && rejected.remaining_ms <= 5_000);

        Ok(())
    }
}
