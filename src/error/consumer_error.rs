//! 消费者统一错误类型

use super::code::ErrorCode;
use rdkafka::error::KafkaError;
use thiserror::Error;

/// 消费者统一错误类型
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// 配置错误（证书、凭证或参数非法），构建阶段即失败，不会重试
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Broker 不可达
    #[error("connection error: {0}")]
    Connection(String),

    /// SASL 认证或鉴权被拒绝
    #[error("authentication error: {0}")]
    Authentication(String),

    /// 消费组会话正常结束（再均衡或主动结束），由消费循环吸收
    #[error("group session ended")]
    SessionEnded,

    /// 客户端已关闭
    #[error("kafka consumer group closed")]
    Closed,

    /// 消费上下文已取消
    #[error("kafka consumer ctx error: context cancelled")]
    Cancelled,

    /// 外部处理器拒绝了某条消息
    #[error("record {topic}/{partition}@{offset} rejected: {reason}")]
    Processing {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },

    /// 底层 Kafka 客户端错误
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// `start` 被并发调用
    #[error("kafka consumer is already running")]
    AlreadyRunning,

    /// `start` 在消费者停止后再次被调用
    #[error("kafka consumer has already stopped")]
    Stopped,

    /// 消费循环的致命错误包装
    #[error("kafka consumer error: {0}")]
    Consumer(#[source] Box<ConsumerError>),
}

impl ConsumerError {
    /// 创建配置错误
    pub fn configuration(reason: impl Into<String>) -> Self {
        ConsumerError::Configuration(reason.into())
    }

    /// 创建连接错误
    pub fn connection(reason: impl Into<String>) -> Self {
        ConsumerError::Connection(reason.into())
    }

    /// 创建认证错误
    pub fn authentication(reason: impl Into<String>) -> Self {
        ConsumerError::Authentication(reason.into())
    }

    /// 创建消息处理失败错误
    pub fn processing(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        reason: impl Into<String>,
    ) -> Self {
        ConsumerError::Processing {
            topic: topic.into(),
            partition,
            offset,
            reason: reason.into(),
        }
    }

    /// 包装为消费循环的终止错误
    pub fn wrap(self) -> Self {
        ConsumerError::Consumer(Box::new(self))
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            ConsumerError::Configuration(_) => ErrorCode::ConfigurationError,
            ConsumerError::Connection(_) => ErrorCode::ConnectionFailed,
            ConsumerError::Authentication(_) => ErrorCode::AuthenticationFailed,
            ConsumerError::SessionEnded => ErrorCode::SessionEnded,
            ConsumerError::Closed => ErrorCode::ConnectionClosed,
            ConsumerError::Cancelled => ErrorCode::OperationCancelled,
            ConsumerError::Processing { .. } => ErrorCode::MessageProcessingFailed,
            ConsumerError::Kafka(_) => ErrorCode::InternalError,
            ConsumerError::AlreadyRunning => ErrorCode::AlreadyRunning,
            ConsumerError::Stopped => ErrorCode::AlreadyStopped,
            ConsumerError::Consumer(inner) => inner.code(),
        }
    }

    /// 剥离包装层，返回最内层错误
    pub fn root_cause(&self) -> &ConsumerError {
        match self {
            ConsumerError::Consumer(inner) => inner.root_cause(),
            other => other,
        }
    }

    /// 是否为客户端关闭
    pub fn is_closed(&self) -> bool {
        matches!(self.root_cause(), ConsumerError::Closed)
    }

    /// 是否为上下文取消
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), ConsumerError::Cancelled)
    }

    /// 判断是否为可在会话层面吸收的错误
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ConsumerError>;
