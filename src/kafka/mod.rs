//! Kafka 工具模块
//!
//! 提供传输构建、信任根加载和基于 rdkafka 的消费组客户端

pub mod consumer_group;
pub mod context;
pub mod transport;
pub mod trust;

pub use consumer_group::{ContextConsumer, KafkaConsumerGroup};
pub use context::{SessionContext, SessionSignals, TransportFailure};
pub use transport::{build_transport, AuthMode, TlsSettings, TransportDescriptor};
pub use trust::{CertificatePool, TrustAnchor};
