//! 消费者生命周期
//!
//! [`KafkaConsumer`] 对外暴露 `start` / `close`，
//! [`GroupConsumer`] 组合消费组客户端、会话驱动和分发处理器

pub mod driver;

pub use driver::{SessionDriver, SessionState};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ConsumerConfig;
use crate::error::{ConsumerError, Result};
use crate::group::{ConsumerGroup, DispatchHandler, GroupHandler, RecordProcessor};
use crate::kafka::{build_transport, KafkaConsumerGroup, TrustAnchor};
use crate::retry::{ExponentialBackoffPolicy, RejoinPolicy};

/// Kafka 消费者
#[async_trait]
pub trait KafkaConsumer: Send + Sync {
    /// 阻塞运行消费循环
    ///
    /// 取消 `ctx` 返回 `Err(Cancelled)`；被 [`KafkaConsumer::close`] 关闭返回 `Ok(())`
    async fn start(&self, ctx: &CancellationToken) -> Result<()>;

    /// 关闭底层客户端，可在其他任务中与 `start` 并发调用
    async fn close(&self) -> Result<()>;
}

/// 基于消费组的消费者
pub struct GroupConsumer<G: ?Sized = KafkaConsumerGroup> {
    group: Arc<G>,
    driver: SessionDriver<G>,
    state: Arc<watch::Sender<SessionState>>,
}

impl GroupConsumer<KafkaConsumerGroup> {
    /// 根据配置创建消费者
    ///
    /// 证书、凭证或参数非法时返回配置错误，不会建立任何连接
    pub fn new<P>(
        config: &ConsumerConfig,
        trust_anchor: &TrustAnchor,
        processor: P,
    ) -> Result<Self>
    where
        P: RecordProcessor + 'static,
    {
        config.validate()?;
        let descriptor = build_transport(config, trust_anchor)?;
        let group = Arc::new(KafkaConsumerGroup::new(
            &descriptor,
            config.claim_buffer_size,
        )?);
        let handler: Arc<dyn GroupHandler> = Arc::new(DispatchHandler::new(processor));
        let policy: Arc<dyn RejoinPolicy> =
            Arc::new(ExponentialBackoffPolicy::from_config(config));

        Ok(Self::with_group(group, config.topic_list(), handler, policy))
    }
}

impl<G: ConsumerGroup + ?Sized> GroupConsumer<G> {
    /// 使用任意消费组客户端创建消费者
    pub fn with_group<T>(
        group: Arc<G>,
        topics: T,
        handler: Arc<dyn GroupHandler>,
        policy: Arc<dyn RejoinPolicy>,
    ) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
    {
        let state = Arc::new(watch::Sender::new(SessionState::Idle));
        let topics = topics.into_iter().map(Into::into).collect();
        let driver = SessionDriver::new(
            Arc::clone(&group),
            topics,
            handler,
            policy,
            Arc::clone(&state),
        );
        Self {
            group,
            driver,
            state,
        }
    }

    /// 当前会话状态
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}

#[async_trait]
impl<G: ConsumerGroup + ?Sized> KafkaConsumer for GroupConsumer<G> {
    async fn start(&self, ctx: &CancellationToken) -> Result<()> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == SessionState::Idle {
                *state = SessionState::Joining;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(match self.state() {
                SessionState::Stopped => ConsumerError::Stopped,
                _ => ConsumerError::AlreadyRunning,
            });
        }

        info!(topics = ?self.driver.topics(), "🚀 Starting kafka consumer");
        let token = ctx.child_token();
        let _guard = token.clone().drop_guard();

        let result = self.driver.run(&token).await;
        self.state.send_replace(SessionState::Stopped);

        match &result {
            Ok(()) => info!("✅ Kafka consumer stopped"),
            Err(e) if e.is_cancelled() => info!("Kafka consumer cancelled"),
            Err(e) => warn!(error = %e, "❌ Kafka consumer stopped with error"),
        }
        result
    }

    async fn close(&self) -> Result<()> {
        info!("Closing kafka consumer");
        self.group.close().await
    }
}
