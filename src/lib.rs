//! Coin Middleware Kafka Consumer
//!
//! 可在再均衡、会话中断后自动重新加入的 Kafka 消费组客户端，
//! 支持 SASL_SSL 认证，只提交被外部处理器接受的消息。

pub mod config;
pub mod consumer;
pub mod error;
pub mod group;
pub mod kafka;
pub mod retry;

// 进程运行时
pub mod runtime;

// Re-exports
pub use config::{ConsumerConfig, InitialOffset, TlsConfig};
pub use consumer::{GroupConsumer, KafkaConsumer, SessionDriver, SessionState};
pub use error::{ConsumerError, ErrorCategory, ErrorCode, Result};
pub use group::{
    ConsumerGroup, DispatchHandler, GroupHandler, GroupSession, PartitionClaim, ProcessError,
    Record, RecordProcessor,
};
pub use kafka::{
    build_transport, AuthMode, CertificatePool, KafkaConsumerGroup, TlsSettings,
    TransportDescriptor, TrustAnchor,
};
pub use retry::{ExponentialBackoffPolicy, FixedRejoinPolicy, RejoinPolicy};

// 运行时框架 re-exports
pub use runtime::{ConsumerRuntime, RuntimeConfig};
