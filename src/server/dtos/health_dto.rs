use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
    pub environment: String,
    pub services: ServiceHealthDetails,
}

#[derive(Debug, Serialize)]
pub struct ServiceHealthDetails {
    pub rate_limiter: RateLimiterHealth,
    pub browser: BrowserHealth,
    /// absent when no redis is configured
    pub redis: Option<RedisHealth>,
}

#[derive(Debug, Serialize)]
pub struct RateLimiterHealth {
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct BrowserHealth {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct RedisHealth {
    pub status: HealthStatus,
    pub response_time_ms: f64,
}
