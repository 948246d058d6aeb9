use std::time::Instant;

use anyhow::Context;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisResult};
use tracing::info;

/// shared rate limit store, only connected when REDIS_URL is set
#[derive(Debug, Clone)]
pub struct RedisDatabase {
    pub connection: MultiplexedConnection,
}

impl RedisDatabase {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;

        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .context("Failed to connect to Redis")?;

        info!("Redis connection established");

        Ok(Self { connection })
    }

    /// bumps the counter of a fixed window, returns the new count and the seconds left
    ///
    /// SET NX only starts the window, later hits inside it don't push the expiry out.
    pub async fn hit_window(&self, key: &str, window_seconds: u64) -> RedisResult<(u32, i64)> {
        let mut conn = self.connection.clone();

        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("EX")
            .arg(window_seconds.max(1))
            .arg("NX")
            .ignore()
            .incr(key, 1u32)
            .ttl(key)
            .query_async(&mut conn)
            .await
    }

    /// PING round trip in milliseconds
    pub async fn health_check(&self) -> anyhow::Result<f64> {
        let start = Instant::now();

        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;

        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}
