use tokio_util::sync::CancellationToken;

use super::record::Record;
use crate::error::Result;

/// 消费组会话
///
/// 由 broker 客户端在每次成功加入消费组后创建，传给处理器的每个回调
pub trait GroupSession: Send + Sync {
    /// 本地会话代数，每次加入消费组递增
    fn generation(&self) -> u64;

    /// 标记消息已被接受，其下一位置会在下一次提交时写入 broker
    fn mark_record(&self, record: &Record) -> Result<()>;

    /// 会话停止信号
    fn stop_token(&self) -> &CancellationToken;
}
