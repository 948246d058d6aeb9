#[cfg(feature = "browser")]
pub mod browser_services;
pub mod fetch_services;
pub mod rate_limit_services;
pub mod relay_services;
pub mod validation_services;

pub use fetch_services::DynFetchService;
pub use rate_limit_services::DynRateLimitService;
pub use relay_services::RelayServices;
