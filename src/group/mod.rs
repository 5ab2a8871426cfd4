//! 消费组抽象
//!
//! 与具体 broker 客户端无关的会话、分区 claim 和消息分发接口

pub mod claim;
pub mod handler;
pub mod record;
pub mod session;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use claim::PartitionClaim;
pub use handler::{DispatchHandler, GroupHandler, ProcessError, RecordProcessor};
pub use record::Record;
pub use session::GroupSession;

/// 消费组客户端能力接口
///
/// 真实实现见 [`crate::kafka::KafkaConsumerGroup`]，测试中可替换为假实现
#[async_trait]
pub trait ConsumerGroup: Send + Sync {
    /// 加入消费组并消费，直到本次会话结束
    ///
    /// - `Ok(())` / `Err(SessionEnded)`：会话正常结束（再均衡、取消等）
    /// - `Err(Closed)`：客户端已被关闭
    /// - 其他错误：致命错误
    async fn consume(
        &self,
        token: &CancellationToken,
        topics: &[String],
        handler: Arc<dyn GroupHandler>,
    ) -> Result<()>;

    /// 关闭客户端，正在进行的 `consume` 会以 `Closed` 返回
    ///
    /// 不保证幂等，第二次调用返回 `Err(Closed)`
    async fn close(&self) -> Result<()>;
}
