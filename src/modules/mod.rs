//! Built-in modules shipped with the gateway kernel.

pub mod gateway;
pub mod rate_limiter;

pub use gateway::{GatewayModule, GatewayService};
pub use rate_limiter::RateLimiterModule;
