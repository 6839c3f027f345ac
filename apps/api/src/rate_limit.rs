//! Fixed-window request limiting for the CPF lookup endpoint.
//!
//! Best effort: the Redis limiter fails open when Redis is unreachable, and
//! the in-process limiter forgets everything on restart.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::warn;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one hit for `key` and returns whether it is within the limit.
    async fn allow(&self, key: &str) -> bool;
}

/// Shared counters in Redis: `INCR` per hit, `EXPIRE` set on the first hit of a window.
pub struct RedisRateLimiter {
    client: redis::Client,
    limit: u32,
    window: Duration,
}

impl RedisRateLimiter {
    pub fn new(client: redis::Client, limit: u32, window: Duration) -> Self {
        Self {
            client,
            limit,
            window,
        }
    }

    async fn hit(&self, key: &str) -> redis::RedisResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("ratelimit:cpf:{key}");
        let count: i64 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(self.window.as_secs().max(1))
                .query_async::<_, ()>(&mut conn)
                .await?;
        }
        Ok(count)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn allow(&self, key: &str) -> bool {
        match self.hit(key).await {
            Ok(count) => count <= i64::from(self.limit),
            Err(e) => {
                warn!("Rate limiter unavailable, allowing request: {e}");
                true
            }
        }
    }
}

/// Per-process counters. Used when no Redis URL is configured.
pub struct InMemoryRateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl InMemoryRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let Ok(mut windows) = self.windows.lock() else {
            return true;
        };

        // Drop expired windows so the map does not grow without bound.
        windows.retain(|_, (started, _)| now.duration_since(*started) < self.window);

        let (_, count) = windows.entry(key.to_string()).or_insert((now, 0));
        *count += 1;
        *count <= self.limit
    }
}
