//! 重新加入消费组的退避策略

pub mod exponential;
pub mod fixed;

pub use exponential::ExponentialBackoffPolicy;
pub use fixed::FixedRejoinPolicy;

use std::time::Duration;

/// 退避策略 trait
///
/// `attempt` 是连续未能建立会话的次数，从 0 开始
pub trait RejoinPolicy: Send + Sync {
    fn backoff_duration(&self, attempt: usize) -> Duration;
}
