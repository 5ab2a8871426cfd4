//! 消费者运行时
//!
//! 统一管理消费者进程的生命周期：
//!
//! 1. 在后台任务中启动消费循环
//! 2. 等待关闭信号（Ctrl+C 或自定义 future）
//! 3. 关闭消费组客户端，超时后强制取消
//!
//! 消费者自行退出（例如认证失败）时，运行时直接返回该错误

pub mod config;
pub mod runtime;

pub use config::RuntimeConfig;
pub use runtime::ConsumerRuntime;
