use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub capacity: f64,
    pub tokens: f64,
    /// Tokens currently tied up waiting for their deferred return.
    pub outstanding: f64,
    pub time_frame: Duration,
    pub retry_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Quota units available per window.
    pub capacity: f64,
    /// How long a spent token stays out of the pool.
    pub time_frame: Duration,
}

impl RateLimiterConfig {
    pub fn new(capacity: u32, time_frame: Duration) -> Self {
        Self {
            capacity: capacity as f64,
            time_frame,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.capacity.is_finite() || self.capacity.floor() < 1.0 {
            return Err(Error::configuration_with_context(
                "rate limiter capacity must be at least 1",
                ErrorContext::new()
                    .with_field_path("user_quota")
                    .with_details(format!("got {}", self.capacity))
                    .with_source("rate_limiter"),
            ));
        }
        if self.time_frame.is_zero() {
            return Err(Error::configuration_with_context(
                "rate limiter time frame must be non-zero",
                ErrorContext::new()
                    .with_field_path("user_quota_time")
                    .with_source("rate_limiter"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct State {
    tokens: f64,
}

/// Delayed-return token bucket.
///
/// A spent token is not replenished at a steady rate: it comes back in one
/// piece exactly `time_frame` after it was taken. Up to `capacity` units are
/// admitted immediately, after which admission follows the return schedule.
///
/// The counter is owned by a single async mutex; deferred returns are spawned
/// tasks that take the same lock, so no update is lost under a multi-threaded
/// runtime. Requires a tokio runtime.
#[derive(Clone)]
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    capacity: f64,
    retry_interval: Duration,
    state: Arc<Mutex<State>>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Result<Self> {
        cfg.validate()?;
        let capacity = cfg.capacity.floor();
        let retry_interval = cfg
            .time_frame
            .div_f64(capacity)
            .max(Duration::from_millis(1));
        Ok(Self {
            state: Arc::new(Mutex::new(State { tokens: capacity })),
            cfg,
            capacity,
            retry_interval,
        })
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Admit `cost` units, sleeping in `retry_interval` steps until they fit.
    ///
    /// A cost above capacity can never be satisfied and is rejected with a
    /// configuration error instead of waiting forever.
    pub async fn acquire(&self, cost: u32) -> Result<()> {
        self.check_cost(cost)?;
        loop {
            if self.take(cost as f64).await {
                return Ok(());
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    /// Try to admit `cost` units without waiting, returns true if successful
    pub async fn try_acquire(&self, cost: u32) -> bool {
        if self.check_cost(cost).is_err() {
            return false;
        }
        self.take(cost as f64).await
    }

    pub async fn snapshot(&self) -> RateLimiterSnapshot {
        let st = self.state.lock().await;
        RateLimiterSnapshot {
            capacity: self.capacity,
            tokens: st.tokens,
            outstanding: self.capacity - st.tokens,
            time_frame: self.cfg.time_frame,
            retry_interval: self.retry_interval,
        }
    }

    fn check_cost(&self, cost: u32) -> Result<()> {
        if cost as f64 > self.capacity {
            return Err(Error::configuration_with_context(
                "admission cost exceeds rate limiter capacity",
                ErrorContext::new()
                    .with_details(format!("cost {} > capacity {}", cost, self.capacity))
                    .with_source("rate_limiter"),
            ));
        }
        Ok(())
    }

    async fn take(&self, cost: f64) -> bool {
        let mut st = self.state.lock().await;
        if st.tokens - cost < 0.0 {
            return false;
        }
        st.tokens -= cost;
        drop(st);
        self.schedule_return(cost);
        true
    }

    fn schedule_return(&self, cost: f64) {
        if cost <= 0.0 {
            return;
        }
        let state = Arc::clone(&self.state);
        let time_frame = self.cfg.time_frame;
        tokio::spawn(async move {
            tokio::time::sleep(time_frame).await;
            state.lock().await.tokens += cost;
        });
    }
}
