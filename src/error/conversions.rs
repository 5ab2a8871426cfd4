//! 错误类型转换实现
//!
//! 提供各种错误类型之间的转换

use super::ConsumerError;
use std::io;

impl From<io::Error> for ConsumerError {
    fn from(err: io::Error) -> Self {
        ConsumerError::configuration(format!("IO 错误: {}", err))
    }
}

impl From<toml::de::Error> for ConsumerError {
    fn from(err: toml::de::Error) -> Self {
        ConsumerError::configuration(format!("TOML 解析错误: {}", err))
    }
}
