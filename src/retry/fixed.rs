use super::RejoinPolicy;
use std::time::Duration;

/// 固定延迟策略
///
/// 延迟为零时立即重新加入
#[derive(Debug, Clone, Copy)]
pub struct FixedRejoinPolicy {
    delay: Duration,
}

impl FixedRejoinPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl RejoinPolicy for FixedRejoinPolicy {
    fn backoff_duration(&self, _attempt: usize) -> Duration {
        self.delay
    }
}
