//! 错误处理模块
//!
//! 提供消费者统一的错误类型和错误代码分类

pub mod code;
pub mod consumer_error;
pub mod conversions;

// 重新导出公共类型
pub use code::{ErrorCategory, ErrorCode};
pub use consumer_error::{ConsumerError, Result};

/// 运行时层默认使用的结果类型
pub type RuntimeResult<T> = anyhow::Result<T>;
