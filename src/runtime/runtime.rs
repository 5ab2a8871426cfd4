//! 消费者运行时实现
//!
//! 在后台任务中运行 [`KafkaConsumer::start`]，收到关闭信号后
//! 先调用 `close`，再在超时时间内等待消费循环退出

use std::future::Future;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::consumer::KafkaConsumer;
use crate::error::{ConsumerError, RuntimeResult};
use crate::runtime::config::RuntimeConfig;

type ConsumerOutcome = Result<Result<(), ConsumerError>, JoinError>;

/// 消费者运行时
///
/// # 使用示例
/// ```rust,no_run
/// use std::sync::Arc;
/// use coin_middleware_consumer::{ConsumerConfig, ConsumerRuntime, GroupConsumer, TrustAnchor};
///
/// # async fn example(processor: impl coin_middleware_consumer::RecordProcessor + 'static) -> anyhow::Result<()> {
/// let config = ConsumerConfig::load_from_file("consumer.toml")?;
/// let consumer = GroupConsumer::new(&config, &TrustAnchor::embedded(), processor)?;
///
/// ConsumerRuntime::new("coin-consumer", Arc::new(consumer))
///     .run()
///     .await
/// # }
/// ```
pub struct ConsumerRuntime {
    service_name: String,
    consumer: Arc<dyn KafkaConsumer>,
    config: RuntimeConfig,
}

impl ConsumerRuntime {
    /// 创建新的消费者运行时
    ///
    /// # 参数
    /// * `service_name` - 服务名称（用于日志）
    /// * `consumer` - 要运行的消费者
    pub fn new(service_name: impl Into<String>, consumer: Arc<dyn KafkaConsumer>) -> Self {
        Self {
            service_name: service_name.into(),
            consumer,
            config: RuntimeConfig::default(),
        }
    }

    /// 设置运行时配置
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// 运行直到收到 Ctrl+C
    pub async fn run(self) -> RuntimeResult<()> {
        self.run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received (Ctrl+C)"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
            }
        })
        .await
    }

    /// 运行直到 `shutdown` 完成或消费者自行退出
    ///
    /// 消费者自行退出时返回其结果；由关闭信号结束时返回 `Ok(())`
    pub async fn run_until<F>(self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        info!(service_name = %self.service_name, "🚀 Starting consumer runtime");

        let ctx = CancellationToken::new();
        let mut join_set = JoinSet::new();
        let consumer = Arc::clone(&self.consumer);
        let token = ctx.clone();
        join_set.spawn(async move { consumer.start(&token).await });

        tokio::select! {
            joined = join_set.join_next() => {
                return Self::consumer_outcome(&self.service_name, joined);
            }
            _ = shutdown => {
                info!(service_name = %self.service_name, "Shutting down consumer runtime");
            }
        }

        if let Err(e) = self.consumer.close().await {
            warn!(error = %e, "⚠️ Failed to close kafka consumer gracefully");
        }
        Self::wait_for_consumer_shutdown(&self.config, &ctx, &mut join_set).await;

        info!(service_name = %self.service_name, "👋 Consumer runtime stopped");
        Ok(())
    }

    fn consumer_outcome(
        service_name: &str,
        joined: Option<ConsumerOutcome>,
    ) -> RuntimeResult<()> {
        match joined {
            None | Some(Ok(Ok(()))) => {
                info!(service_name = %service_name, "✅ Consumer completed");
                Ok(())
            }
            Some(Ok(Err(e))) => {
                error!(service_name = %service_name, error = %e, "❌ Consumer failed");
                Err(e.into())
            }
            Some(Err(e)) => {
                error!(service_name = %service_name, error = %e, "❌ Consumer task panicked");
                Err(anyhow::anyhow!("consumer task join error: {}", e))
            }
        }
    }

    /// 等待消费循环退出
    async fn wait_for_consumer_shutdown(
        config: &RuntimeConfig,
        ctx: &CancellationToken,
        join_set: &mut JoinSet<Result<(), ConsumerError>>,
    ) {
        match tokio::time::timeout(config.shutdown_timeout, async {
            while let Some(result) = join_set.join_next().await {
                match result {
                    Ok(Ok(())) => info!("Consumer completed gracefully"),
                    Ok(Err(e)) => warn!("Consumer completed with error: {}", e),
                    Err(e) => warn!("Consumer join error: {}", e),
                }
            }
        })
        .await
        {
            Ok(()) => info!("Consumer shutdown completed"),
            Err(_) => {
                warn!("Consumer shutdown timeout, cancelling consume context");
                ctx.cancel();
                join_set.abort_all();
            }
        }
    }
}
