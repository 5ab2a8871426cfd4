use super::RejoinPolicy;
use std::time::Duration;

use crate::config::ConsumerConfig;

/// 指数退避策略
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// 使用配置中的 `rejoin_backoff_ms` / `rejoin_backoff_max_ms`
    pub fn from_config(config: &ConsumerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.rejoin_backoff_ms),
            Duration::from_millis(config.rejoin_backoff_max_ms),
        )
    }
}

impl RejoinPolicy for ExponentialBackoffPolicy {
    fn backoff_duration(&self, attempt: usize) -> Duration {
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(1 << attempt.min(10));
        let delay = Duration::from_millis(delay_ms);
        delay.min(self.max_delay)
    }
}
