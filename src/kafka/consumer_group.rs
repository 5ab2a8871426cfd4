//! 基于 rdkafka 的消费组客户端
//!
//! 每次 [`ConsumerGroup::consume`] 对应一个消费组会话：
//! broker 完成分区分配后才调用 [`GroupHandler::setup`]；
//! 每个收到消息的分区由一个独立任务处理，会话在分区撤销、上下文取消、
//! 客户端关闭、claim 失败或传输层致命错误时结束

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::Offset;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::context::{SessionContext, SessionSignals, TransportFailure};
use super::transport::TransportDescriptor;
use crate::error::{ConsumerError, Result};
use crate::group::{ConsumerGroup, GroupHandler, GroupSession, PartitionClaim, Record};

/// 带会话上下文的 rdkafka 消费者
pub type ContextConsumer = StreamConsumer<SessionContext>;

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// rdkafka 消费组客户端
pub struct KafkaConsumerGroup {
    consumer: Arc<ContextConsumer>,
    signals: SessionSignals,
    subscription: Mutex<Vec<String>>,
    closed: CancellationToken,
    close_requested: AtomicBool,
    session_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    claim_buffer_size: usize,
}

impl KafkaConsumerGroup {
    /// 创建客户端
    ///
    /// 只创建 librdkafka 句柄，不等待 broker 连接
    pub fn new(descriptor: &TransportDescriptor, claim_buffer_size: usize) -> Result<Self> {
        let (context, signals) = SessionContext::new();
        let consumer: ContextConsumer = descriptor
            .client_config()
            .create_with_context(context)
            .map_err(|e| {
                ConsumerError::configuration(format!("kafka consumer group init error: {}", e))
            })?;

        info!(
            bootstrap = %descriptor.bootstrap_servers(),
            group_id = %descriptor.group_id,
            "Kafka consumer group created"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            signals,
            subscription: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
            close_requested: AtomicBool::new(false),
            session_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            claim_buffer_size: claim_buffer_size.max(1),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn ensure_subscribed(&self, topics: &[String]) -> Result<()> {
        let mut current = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if current.as_slice() == topics {
            return Ok(());
        }

        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&names)?;
        *current = topics.to_vec();

        info!(topics = ?topics, "Subscribed to Kafka topics");
        Ok(())
    }

    fn open_claim(
        &self,
        record: &Record,
        handler: &Arc<dyn GroupHandler>,
        session: &Arc<KafkaGroupSession>,
        claims: &mut JoinSet<ClaimExit>,
    ) -> ClaimRoute {
        let (sender, receiver) = mpsc::channel(self.claim_buffer_size);
        let claim = PartitionClaim::new(
            record.topic.clone(),
            record.partition,
            record.offset,
            receiver,
            session.stop.child_token(),
        );

        let handler = Arc::clone(handler);
        let session = Arc::clone(session);
        let topic = record.topic.clone();
        let partition = record.partition;
        claims.spawn(async move {
            let result = handler.consume_claim(session.as_ref(), claim).await;
            ClaimExit {
                topic,
                partition,
                result,
            }
        });

        debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "Partition claim opened"
        );

        ClaimRoute {
            sender,
            first_offset: record.offset,
            last_offset: record.offset,
        }
    }

    /// 把仍有未接受消息的分区回退到第一条未接受的位置
    fn rewind(&self, session: &KafkaGroupSession, routes: HashMap<(String, i32), ClaimRoute>) {
        for ((topic, partition), route) in routes {
            let resume = session
                .marked_offset(&topic, partition)
                .unwrap_or(route.first_offset);
            if resume > route.last_offset {
                continue;
            }
            match self
                .consumer
                .seek(&topic, partition, Offset::Offset(resume), SEEK_TIMEOUT)
            {
                Ok(()) => debug!(
                    topic = %topic,
                    partition = partition,
                    offset = resume,
                    "Partition rewound to first unaccepted record"
                ),
                // 分区已被撤销，新的持有者会从已提交位置继续
                Err(e) => debug!(
                    topic = %topic,
                    partition = partition,
                    error = %e,
                    "Partition rewind skipped"
                ),
            }
        }
    }
}

#[async_trait]
impl ConsumerGroup for KafkaConsumerGroup {
    async fn consume(
        &self,
        token: &CancellationToken,
        topics: &[String],
        handler: Arc<dyn GroupHandler>,
    ) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(ConsumerError::Closed);
        }
        let _session_guard = self.session_lock.lock().await;
        if self.closed.is_cancelled() {
            return Err(ConsumerError::Closed);
        }

        let mut signals = self.signals.clone();
        if let Some(failure) = signals.failure.borrow_and_update().clone() {
            return Err(failure.into_error());
        }
        self.ensure_subscribed(topics)?;
        let _ = signals.revocations.borrow_and_update();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Arc::new(KafkaGroupSession {
            consumer: Arc::clone(&self.consumer),
            generation,
            stop: CancellationToken::new(),
            marked: Mutex::new(HashMap::new()),
        });
        debug!(generation = generation, topics = ?topics, "Waiting for partition assignment");

        // 上一次会话结束后分区仍然保留时，无需等待新的分配
        let mut established = *signals.assigned.borrow_and_update();
        if established {
            handler.setup(session.as_ref()).await?;
        }

        let mut routes: HashMap<(String, i32), ClaimRoute> = HashMap::new();
        let mut claims: JoinSet<ClaimExit> = JoinSet::new();

        let end = loop {
            tokio::select! {
                biased;
                _ = self.closed.cancelled() => break SessionEnd::Closed,
                _ = token.cancelled() => break SessionEnd::Cancelled,
                Ok(()) = signals.failure.changed() => {
                    if let Some(failure) = signals.failure.borrow_and_update().clone() {
                        break SessionEnd::Failed(failure.into_error());
                    }
                }
                Ok(()) = signals.revocations.changed() => break SessionEnd::Rebalanced,
                Ok(()) = signals.assigned.changed(), if !established => {
                    if *signals.assigned.borrow_and_update() {
                        if let Err(e) = handler.setup(session.as_ref()).await {
                            break SessionEnd::Failed(e);
                        }
                        established = true;
                    }
                }
                Some(joined) = claims.join_next() => {
                    if claim_finished(joined) {
                        break SessionEnd::ClaimFailed;
                    }
                }
                received = self.consumer.recv() => {
                    let received = received.map(|message| record_from_message(&message));
                    let record = match received {
                        Ok(record) => record,
                        Err(e) => {
                            if let Some(failure) = TransportFailure::classify(&e) {
                                break SessionEnd::Failed(failure.into_error());
                            }
                            warn!(error = %e, "Error receiving message");
                            continue;
                        }
                    };

                    // 消息先于分配回调到达时同样视为会话已建立
                    if !established {
                        if let Err(e) = handler.setup(session.as_ref()).await {
                            break SessionEnd::Failed(e);
                        }
                        established = true;
                    }

                    let key = (record.topic.clone(), record.partition);
                    let route = routes
                        .entry(key)
                        .or_insert_with(|| self.open_claim(&record, &handler, &session, &mut claims));
                    route.last_offset = record.offset;

                    let interrupted = tokio::select! {
                        biased;
                        _ = self.closed.cancelled() => Some(SessionEnd::Closed),
                        _ = token.cancelled() => Some(SessionEnd::Cancelled),
                        Ok(()) = signals.revocations.changed() => Some(SessionEnd::Rebalanced),
                        sent = route.sender.send(record) => {
                            if sent.is_err() {
                                debug!("Partition claim already finished, record left for redelivery");
                            }
                            None
                        }
                    };
                    if let Some(end) = interrupted {
                        break end;
                    }
                }
            }
        };

        session.stop.cancel();
        while let Some(joined) = claims.join_next().await {
            claim_finished(joined);
        }
        if matches!(end, SessionEnd::Rebalanced | SessionEnd::ClaimFailed) {
            self.rewind(&session, routes);
        }

        if established {
            if let Err(e) = handler.cleanup(session.as_ref()).await {
                warn!(generation = generation, error = %e, "Group handler cleanup failed");
            }
        }
        debug!(generation = generation, end = ?end, "Group session ended");

        match end {
            SessionEnd::Closed => Err(ConsumerError::Closed),
            SessionEnd::Cancelled | SessionEnd::Rebalanced => Ok(()),
            SessionEnd::ClaimFailed => Err(ConsumerError::SessionEnded),
            SessionEnd::Failed(e) => Err(e),
        }
    }

    async fn close(&self) -> Result<()> {
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return Err(ConsumerError::Closed);
        }

        debug!("closing kafka consumer...");
        self.closed.cancel();
        let _session_guard = self.session_lock.lock().await;

        let subscribed = !self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty();
        if subscribed {
            match self.consumer.commit_consumer_state(CommitMode::Sync) {
                Ok(()) | Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {}
                Err(e) => warn!(error = %e, "Final offset commit failed"),
            }
            self.consumer.unsubscribe();
        }

        info!("Kafka consumer group closed");
        Ok(())
    }
}

#[derive(Debug)]
enum SessionEnd {
    Rebalanced,
    Cancelled,
    Closed,
    ClaimFailed,
    Failed(ConsumerError),
}

struct ClaimRoute {
    sender: mpsc::Sender<Record>,
    first_offset: i64,
    last_offset: i64,
}

struct ClaimExit {
    topic: String,
    partition: i32,
    result: Result<()>,
}

/// 记录 claim 结束，返回该 claim 是否失败
fn claim_finished(joined: std::result::Result<ClaimExit, JoinError>) -> bool {
    match joined {
        Ok(ClaimExit {
            result: Ok(()), ..
        }) => false,
        Ok(ClaimExit {
            topic,
            partition,
            result: Err(e),
        }) => {
            warn!(topic = %topic, partition = partition, error = %e, "Partition claim failed");
            true
        }
        Err(e) => {
            error!(error = %e, "Partition claim task panicked");
            true
        }
    }
}

fn record_from_message(message: &BorrowedMessage<'_>) -> Record {
    Record {
        topic: message.topic().to_owned(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(<[u8]>::to_vec),
        value: message.payload().map(<[u8]>::to_vec),
        timestamp: message
            .timestamp()
            .to_millis()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
    }
}

/// rdkafka 会话
struct KafkaGroupSession {
    consumer: Arc<ContextConsumer>,
    generation: u64,
    stop: CancellationToken,
    marked: Mutex<HashMap<(String, i32), i64>>,
}

impl KafkaGroupSession {
    fn marked_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        self.marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(topic.to_owned(), partition))
            .copied()
    }
}

impl GroupSession for KafkaGroupSession {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn mark_record(&self, record: &Record) -> Result<()> {
        self.consumer
            .store_offset(&record.topic, record.partition, record.next_offset())?;
        self.marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((record.topic.clone(), record.partition), record.next_offset());
        Ok(())
    }

    fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }
}
