//! 错误代码和错误类别定义
//!
//! 消费者内部使用的错误代码，按类别分段

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码枚举
///
/// 错误代码按类别分组，每个类别占用1000个代码范围：
/// - 1000-1999: 连接相关错误
/// - 2000-2999: 认证相关错误
/// - 3000-3999: 消费组会话相关错误
/// - 4000-4999: 消息处理相关错误
/// - 6000-6999: 系统相关错误
/// - 9000-9999: 通用错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 连接相关错误 (1000-1999)
    // ============================================================
    ConnectionFailed = 1000,
    ConnectionClosed = 1002,

    // ============================================================
    // 认证相关错误 (2000-2999)
    // ============================================================
    AuthenticationFailed = 2000,

    // ============================================================
    // 消费组会话相关错误 (3000-3999)
    // ============================================================
    SessionEnded = 3000,

    // ============================================================
    // 消息处理相关错误 (4000-4999)
    // ============================================================
    MessageProcessingFailed = 4000,

    // ============================================================
    // 系统相关错误 (6000-6999)
    // ============================================================
    InternalError = 6000,
    ConfigurationError = 6003,

    // ============================================================
    // 通用错误 (9000-9999)
    // ============================================================
    OperationCancelled = 9004,
    AlreadyRunning = 9006,
    AlreadyStopped = 9007,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 从数字值创建错误代码
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1000 => Some(ErrorCode::ConnectionFailed),
            1002 => Some(ErrorCode::ConnectionClosed),
            2000 => Some(ErrorCode::AuthenticationFailed),
            3000 => Some(ErrorCode::SessionEnded),
            4000 => Some(ErrorCode::MessageProcessingFailed),
            6000 => Some(ErrorCode::InternalError),
            6003 => Some(ErrorCode::ConfigurationError),
            9004 => Some(ErrorCode::OperationCancelled),
            9006 => Some(ErrorCode::AlreadyRunning),
            9007 => Some(ErrorCode::AlreadyStopped),
            _ => None,
        }
    }

    /// 获取错误代码的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::ConnectionClosed => "CONNECTION_CLOSED",
            ErrorCode::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ErrorCode::SessionEnded => "SESSION_ENDED",
            ErrorCode::MessageProcessingFailed => "MESSAGE_PROCESSING_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::OperationCancelled => "OPERATION_CANCELLED",
            ErrorCode::AlreadyRunning => "ALREADY_RUNNING",
            ErrorCode::AlreadyStopped => "ALREADY_STOPPED",
        }
    }

    /// 获取错误代码的类别（用于错误分类）
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() {
            1000..=1999 => ErrorCategory::Connection,
            2000..=2999 => ErrorCategory::Authentication,
            3000..=3999 => ErrorCategory::Session,
            4000..=4999 => ErrorCategory::Message,
            6000..=6999 => ErrorCategory::System,
            _ => ErrorCategory::General,
        }
    }

    /// 判断是否为可在会话层面吸收的错误
    ///
    /// 只有会话结束（再均衡等）和消息处理失败会触发重新加入消费组，
    /// 其余错误都会终止消费循环
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::SessionEnded | ErrorCode::MessageProcessingFailed
        )
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Connection,
    Authentication,
    Session,
    Message,
    System,
    General,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Connection => write!(f, "CONNECTION"),
            ErrorCategory::Authentication => write!(f, "AUTHENTICATION"),
            ErrorCategory::Session => write!(f, "SESSION"),
            ErrorCategory::Message => write!(f, "MESSAGE"),
            ErrorCategory::System => write!(f, "SYSTEM"),
            ErrorCategory::General => write!(f, "GENERAL"),
        }
    }
}
