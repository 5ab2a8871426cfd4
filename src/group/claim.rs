//! 分区 claim
//!
//! 一个消费组会话内对单个分区的独占读取句柄

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::record::Record;

/// 分区 claim
///
/// 消息按 broker 分配的 offset 顺序到达。会话结束或上游关闭后
/// [`PartitionClaim::next`] 返回 `None`，下一次会话会重新创建 claim。
pub struct PartitionClaim {
    topic: String,
    partition: i32,
    initial_offset: i64,
    records: mpsc::Receiver<Record>,
    stop: CancellationToken,
}

impl PartitionClaim {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        initial_offset: i64,
        records: mpsc::Receiver<Record>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            initial_offset,
            records,
            stop,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// 本次会话中该分区收到的第一条消息的 offset
    ///
    /// 这是实际投递的位置，而不是分配时的已提交位置
    pub fn initial_offset(&self) -> i64 {
        self.initial_offset
    }

    /// 获取下一条消息
    ///
    /// 会话停止信号优先于缓冲中的消息
    pub async fn next(&mut self) -> Option<Record> {
        if self.stop.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => None,
            record = self.records.recv() => record,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}
