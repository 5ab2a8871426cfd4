//! rdkafka 客户端上下文
//!
//! 把 librdkafka 的日志、错误和再均衡回调转成会话驱动可以观察的信号

use rdkafka::client::ClientContext;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::consumer::{BaseConsumer, ConsumerContext, Rebalance};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::TopicPartitionList;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::error::ConsumerError;

/// 传输层致命错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// broker 全部不可达或客户端进入 fatal 状态
    Unreachable(String),
    /// 认证或鉴权被拒绝
    Rejected(String),
}

impl TransportFailure {
    /// 根据 librdkafka 错误码分类，非致命错误返回 `None`
    pub fn classify(error: &KafkaError) -> Option<Self> {
        let code = error.rdkafka_error_code()?;
        match code {
            RDKafkaErrorCode::Authentication
            | RDKafkaErrorCode::SaslAuthenticationFailed
            | RDKafkaErrorCode::GroupAuthorizationFailed
            | RDKafkaErrorCode::TopicAuthorizationFailed => {
                Some(TransportFailure::Rejected(error.to_string()))
            }
            RDKafkaErrorCode::AllBrokersDown | RDKafkaErrorCode::Fatal => {
                Some(TransportFailure::Unreachable(error.to_string()))
            }
            _ => None,
        }
    }

    pub fn into_error(self) -> ConsumerError {
        match self {
            TransportFailure::Unreachable(reason) => ConsumerError::connection(reason),
            TransportFailure::Rejected(reason) => ConsumerError::authentication(reason),
        }
    }
}

/// 会话信号接收端
#[derive(Clone)]
pub struct SessionSignals {
    /// 分区撤销计数，每次 revoke 加一
    pub revocations: watch::Receiver<u64>,
    /// 是否持有 broker 分配的分区（已加入消费组）
    pub assigned: watch::Receiver<bool>,
    pub failure: watch::Receiver<Option<TransportFailure>>,
}

/// 消费者上下文
pub struct SessionContext {
    revocations: watch::Sender<u64>,
    assigned: watch::Sender<bool>,
    failure: watch::Sender<Option<TransportFailure>>,
}

impl SessionContext {
    pub fn new() -> (Self, SessionSignals) {
        let (revocations_tx, revocations_rx) = watch::channel(0);
        let (assigned_tx, assigned_rx) = watch::channel(false);
        let (failure_tx, failure_rx) = watch::channel(None);
        (
            Self {
                revocations: revocations_tx,
                assigned: assigned_tx,
                failure: failure_tx,
            },
            SessionSignals {
                revocations: revocations_rx,
                assigned: assigned_rx,
                failure: failure_rx,
            },
        )
    }

    fn record_failure(&self, failure: TransportFailure) {
        self.failure.send_replace(Some(failure));
    }
}

impl ClientContext for SessionContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => error!(facility = fac, "librdkafka: {}", log_message),
            RDKafkaLogLevel::Warning => warn!(facility = fac, "librdkafka: {}", log_message),
            RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => {
                info!(facility = fac, "librdkafka: {}", log_message)
            }
            RDKafkaLogLevel::Debug => trace!(facility = fac, "librdkafka: {}", log_message),
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        match TransportFailure::classify(&error) {
            Some(failure) => {
                error!(error = %error, reason = reason, "Fatal Kafka client error");
                self.record_failure(failure);
            }
            None => warn!(error = %error, reason = reason, "Kafka client error"),
        }
    }
}

impl ConsumerContext for SessionContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Revoke(partitions) => {
                info!(partitions = partitions.count(), "Partitions revoked, ending group session");
                self.assigned.send_replace(false);
                self.revocations.send_modify(|count| *count += 1);
            }
            Rebalance::Assign(partitions) => {
                debug!(partitions = partitions.count(), "Partitions about to be assigned");
            }
            Rebalance::Error(err) => {
                warn!(error = %err, "Rebalance error");
            }
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        if let Rebalance::Assign(partitions) = rebalance {
            info!(
                partitions = ?partition_names(partitions),
                "Partitions assigned"
            );
            // 分配为空也说明已经加入消费组
            self.assigned.send_replace(true);
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => trace!(partitions = offsets.count(), "Offsets committed"),
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {}
            Err(e) => warn!(error = %e, "Offset commit failed"),
        }
    }
}

fn partition_names(partitions: &TopicPartitionList) -> Vec<String> {
    partitions
        .elements()
        .iter()
        .map(|tp| format!("{}/{}", tp.topic(), tp.partition()))
        .collect()
}
