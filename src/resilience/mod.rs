//! 弹性模块：基于延迟归还令牌桶的配额限流。
//!
//! # Resilience Primitives Module
//!
//! Quota protection for batch dispatch.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter`] | Delayed-return token bucket gating batch admission |
//!
//! ## Rate Limiter
//!
//! Each admitted unit is held out of the pool for one full `time_frame` and
//! then returned, so a burst of up to `capacity` units passes immediately and
//! the long-run rate settles at `capacity / time_frame`.
//!
//! ```rust
//! use batch_stream::resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> batch_stream::Result<()> {
//! let limiter = RateLimiter::new(RateLimiterConfig::new(250, Duration::from_secs(1)))?;
//! limiter.acquire(100).await?;
//! assert!(limiter.try_acquire(100).await);
//! assert!(!limiter.try_acquire(100).await);
//! # Ok(())
//! # }
//! ```

pub mod rate_limiter;
