use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, mapref::entry::Entry};
use mockall::automock;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::database::RedisDatabase;

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// maximum accepted requests per client per window
    pub max_requests_per_window: u32,
    /// fixed window length
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl From<&AppConfig> for RateLimitConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_requests_per_window: config.rate_limit_max_requests,
            window: Duration::from_secs(config.rate_limit_window_seconds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// request is allowed
    Allowed { remaining: u32, reset_in: Duration },
    /// client used up its window
    RateLimited { retry_after: u64 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

pub type DynRateLimitService = Arc<dyn RateLimitServiceTrait + Send + Sync>;

#[automock]
#[async_trait::async_trait]
pub trait RateLimitServiceTrait {
    /// counts the request against the client's window and says whether it may go on
    async fn check_rate_limit(&self, client_id: &str) -> RateLimitResult;

    /// drops records whose window is over, returns how many went away
    async fn sweep_expired(&self) -> usize;

    /// backend label for health
    fn backend(&self) -> &'static str;
}

/// a client's count inside its current window
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRecord {
    pub count: u32,
    pub reset_at: Instant,
}

/// fixed window limiter kept in process memory
///
/// Windows reset lazily on the first request seen after `reset_at`, the sweep only exists so
/// clients that never come back don't stay in the map forever.
pub struct InMemoryRateLimitService {
    records: DashMap<String, RateLimitRecord>,
    config: RateLimitConfig,
}

impl InMemoryRateLimitService {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            records: DashMap::new(),
            config,
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.records.len()
    }

    fn fresh_window(&self, now: Instant) -> (RateLimitRecord, RateLimitResult) {
        let record = RateLimitRecord {
            count: 1,
            reset_at: now + self.config.window,
        };
        let result = RateLimitResult::Allowed {
            remaining: self.config.max_requests_per_window.saturating_sub(1),
            reset_in: self.config.window,
        };
        (record, result)
    }
}

#[async_trait::async_trait]
impl RateLimitServiceTrait for InMemoryRateLimitService {
    async fn check_rate_limit(&self, client_id: &str) -> RateLimitResult {
        let now = Instant::now();

        // the entry guard holds the shard lock, check and increment happen as one step
        match self.records.entry(client_id.to_string()) {
            Entry::Vacant(vacant) => {
                let (record, result) = self.fresh_window(now);
                vacant.insert(record);
                result
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();

                if now > record.reset_at {
                    let (fresh, result) = self.fresh_window(now);
                    *record = fresh;
                    return result;
                }

                let reset_in = record.reset_at.saturating_duration_since(now);
                if record.count >= self.config.max_requests_per_window {
                    debug!(
                        "Client {} rate limited: {} requests in window",
                        client_id, record.count
                    );
                    return RateLimitResult::RateLimited {
                        retry_after: reset_in.as_secs().max(1),
                    };
                }

                record.count += 1;
                RateLimitResult::Allowed {
                    remaining: self.config.max_requests_per_window - record.count,
                    reset_in,
                }
            }
        }
    }

    async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| now <= record.reset_at);
        let removed = before.saturating_sub(self.records.len());

        if removed > 0 {
            debug!("Swept {} expired rate limit records", removed);
        }
        removed
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// fixed window limiter shared between relay instances through redis
///
/// Unlike the in-memory one this keeps counting past the limit, the key expires with the window
/// anyway. Redis errors let the request through.
pub struct RedisRateLimitService {
    redis: Arc<RedisDatabase>,
    config: RateLimitConfig,
}

impl RedisRateLimitService {
    pub fn new(redis: Arc<RedisDatabase>, config: RateLimitConfig) -> Self {
        Self { redis, config }
    }

    fn rate_limit_key(&self, client_id: &str) -> String {
        format!("relay_rate_limit:{}", client_id)
    }
}

#[async_trait::async_trait]
impl RateLimitServiceTrait for RedisRateLimitService {
    async fn check_rate_limit(&self, client_id: &str) -> RateLimitResult {
        let key = self.rate_limit_key(client_id);
        let result = self
            .redis
            .hit_window(&key, self.config.window.as_secs())
            .await;

        match result {
            Ok((count, ttl)) => {
                let reset_in = Duration::from_secs(ttl.max(0) as u64);
                if count > self.config.max_requests_per_window {
                    debug!(
                        "Client {} rate limited: {} requests in window",
                        client_id, count
                    );
                    RateLimitResult::RateLimited {
                        retry_after: ttl.max(1) as u64,
                    }
                } else {
                    RateLimitResult::Allowed {
                        remaining: self.config.max_requests_per_window.saturating_sub(count),
                        reset_in,
                    }
                }
            }
            Err(e) => {
                error!("Rate limit check failed for client {}: {}", client_id, e);
                RateLimitResult::Allowed {
                    remaining: 0,
                    reset_in: self.config.window,
                }
            }
        }
    }

    async fn sweep_expired(&self) -> usize {
        // keys expire on their own
        0
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// runs `sweep_expired` every `every` until the returned handle is aborted
pub fn spawn_sweeper(rate_limit: DynRateLimitService, every: Duration) -> tokio::task::JoinHandle<()> {
    info!("Rate limit sweep every {}s", every.as_secs());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            rate_limit.sweep_expired().await;
        }
    })
}
