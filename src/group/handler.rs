//! 消息分发处理器
//!
//! broker 客户端为每个被分配的分区调用一次 [`GroupHandler::consume_claim`]，
//! [`DispatchHandler`] 将消息逐条转交外部处理器

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::claim::PartitionClaim;
use super::record::Record;
use super::session::GroupSession;
use crate::error::{ConsumerError, Result};

/// 外部处理器的错误类型
pub type ProcessError = Box<dyn std::error::Error + Send + Sync>;

/// 外部消息处理器
///
/// 幂等/去重等存储逻辑由实现方自行负责
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    /// 处理一条消息，返回 `Ok` 表示接受，消费位置会前移
    async fn process(&self, record: &Record) -> std::result::Result<(), ProcessError>;
}

#[async_trait]
impl<P: RecordProcessor + ?Sized> RecordProcessor for Arc<P> {
    async fn process(&self, record: &Record) -> std::result::Result<(), ProcessError> {
        (**self).process(record).await
    }
}

/// 消费组处理器
///
/// 同一分区不会被并发调用；不同分区可能并行
#[async_trait]
pub trait GroupHandler: Send + Sync {
    /// 会话建立后、claim 开始前调用
    async fn setup(&self, _session: &dyn GroupSession) -> Result<()> {
        Ok(())
    }

    /// 所有 claim 结束后调用
    async fn cleanup(&self, _session: &dyn GroupSession) -> Result<()> {
        Ok(())
    }

    /// 消费一个分区 claim，直到 claim 结束
    ///
    /// claim 在分区的第一条消息到达时才会创建：被分配但一直没有消息的分区
    /// 不会触发本方法
    async fn consume_claim(&self, session: &dyn GroupSession, claim: PartitionClaim)
    -> Result<()>;
}

/// 默认的分发处理器
///
/// 只有被处理器接受的消息才会被标记；遇到拒绝立即结束当前 claim，
/// 该分区会在下一次会话中从被拒绝的消息重新投递
pub struct DispatchHandler<P> {
    processor: P,
}

impl<P: RecordProcessor> DispatchHandler<P> {
    pub fn new(processor: P) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }
}

#[async_trait]
impl<P: RecordProcessor> GroupHandler for DispatchHandler<P> {
    async fn consume_claim(
        &self,
        session: &dyn GroupSession,
        mut claim: PartitionClaim,
    ) -> Result<()> {
        debug!(
            topic = %claim.topic(),
            partition = claim.partition(),
            initial_offset = claim.initial_offset(),
            generation = session.generation(),
            "Partition claim started"
        );

        let mut delivered = 0u64;
        while let Some(record) = claim.next().await {
            match self.processor.process(&record).await {
                Ok(()) => {
                    session.mark_record(&record)?;
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        error = %e,
                        "Record rejected by processor, ending claim"
                    );
                    return Err(ConsumerError::processing(
                        record.topic,
                        record.partition,
                        record.offset,
                        e.to_string(),
                    ));
                }
            }
        }

        debug!(
            topic = %claim.topic(),
            partition = claim.partition(),
            delivered = delivered,
            "Partition claim finished"
        );
        Ok(())
    }
}
