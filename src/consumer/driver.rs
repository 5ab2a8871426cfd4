//! 消费组会话驱动
//!
//! 反复加入消费组：会话正常结束时退避后重新加入，
//! 上下文取消、客户端关闭或致命错误时停止

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{ConsumerError, Result};
use crate::group::{ConsumerGroup, GroupHandler, GroupSession, PartitionClaim, Record};
use crate::retry::RejoinPolicy;

/// 消费者会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// 尚未启动
    Idle,
    /// 正在加入消费组
    Joining,
    /// 会话已建立，正在消费
    Consuming,
    /// 已停止（终态）
    Stopped,
}

/// 会话驱动
pub struct SessionDriver<G: ?Sized> {
    group: Arc<G>,
    topics: Vec<String>,
    handler: Arc<dyn GroupHandler>,
    policy: Arc<dyn RejoinPolicy>,
    state: Arc<watch::Sender<SessionState>>,
    attempts: Arc<AtomicUsize>,
}

impl<G: ConsumerGroup + ?Sized> SessionDriver<G> {
    pub fn new(
        group: Arc<G>,
        topics: Vec<String>,
        handler: Arc<dyn GroupHandler>,
        policy: Arc<dyn RejoinPolicy>,
        state: Arc<watch::Sender<SessionState>>,
    ) -> Self {
        let attempts = Arc::new(AtomicUsize::new(0));
        let handler: Arc<dyn GroupHandler> = Arc::new(TrackingHandler {
            inner: handler,
            state: Arc::clone(&state),
            attempts: Arc::clone(&attempts),
        });
        Self {
            group,
            topics,
            handler,
            policy,
            state,
            attempts,
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// 运行消费循环，直到取消、关闭或致命错误
    ///
    /// - 客户端关闭：返回 `Ok(())`
    /// - 上下文取消：返回 `Err(Cancelled)`，不会再次加入消费组
    /// - 其他错误：包装为 [`ConsumerError::Consumer`] 返回
    pub async fn run(&self, token: &CancellationToken) -> Result<()> {
        loop {
            self.state.send_replace(SessionState::Joining);
            debug!("start consume");

            match self
                .group
                .consume(token, &self.topics, Arc::clone(&self.handler))
                .await
            {
                Err(ConsumerError::Closed) => {
                    info!("Kafka consumer group closed, leaving consume loop");
                    return Ok(());
                }
                Ok(()) => self.rejoin(token).await?,
                Err(e) if e.is_retryable() => {
                    debug!(error = %e, "Group session ended");
                    self.rejoin(token).await?;
                }
                Err(e) => {
                    error!(
                        error = %e,
                        code = %e.code(),
                        category = %e.code().category(),
                        "Kafka consume loop failed"
                    );
                    return Err(e.wrap());
                }
            }
        }
    }

    /// 重新加入前的退避等待，可被取消
    async fn rejoin(&self, token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            debug!("consume context cancelled");
            return Err(ConsumerError::Cancelled);
        }
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = self.policy.backoff_duration(attempt);
        if delay.is_zero() {
            return Ok(());
        }

        debug!(
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            "Rejoining consumer group after backoff"
        );
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ConsumerError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// 在会话建立时更新状态的处理器包装
///
/// 退避计数只在会话接受了消息之后重置，反复被拒绝的消息会持续拉长退避
struct TrackingHandler {
    inner: Arc<dyn GroupHandler>,
    state: Arc<watch::Sender<SessionState>>,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl GroupHandler for TrackingHandler {
    async fn setup(&self, session: &dyn GroupSession) -> Result<()> {
        self.inner.setup(session).await?;
        self.state.send_replace(SessionState::Consuming);
        info!(generation = session.generation(), "Consumer group session established");
        Ok(())
    }

    async fn cleanup(&self, session: &dyn GroupSession) -> Result<()> {
        self.inner.cleanup(session).await
    }

    async fn consume_claim(
        &self,
        session: &dyn GroupSession,
        claim: PartitionClaim,
    ) -> Result<()> {
        let session = ProgressSession {
            inner: session,
            attempts: &self.attempts,
        };
        self.inner.consume_claim(&session, claim).await
    }
}

/// 记录消息被接受的会话包装
struct ProgressSession<'a> {
    inner: &'a dyn GroupSession,
    attempts: &'a AtomicUsize,
}

impl GroupSession for ProgressSession<'_> {
    fn generation(&self) -> u64 {
        self.inner.generation()
    }

    fn mark_record(&self, record: &Record) -> Result<()> {
        self.inner.mark_record(record)?;
        self.attempts.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn stop_token(&self) -> &CancellationToken {
        self.inner.stop_token()
    }
}
