//! rdkafka 消费组客户端测试
//!
//! 关闭语义和不可达 broker 的测试不需要 broker；端到端测试需要运行中的 Kafka，
//! 默认被忽略，需要使用 `cargo test --test kafka_group_test -- --ignored` 运行。
//!
//! 启动 Kafka：
//! ```bash
//! docker run -d --name kafka-test -p 9092:9092 apache/kafka:3.7.0
//! ```

use async_trait::async_trait;
use coin_middleware_consumer::{
    build_transport, ConsumerConfig, ConsumerError, ConsumerGroup, DispatchHandler,
    FixedRejoinPolicy, GroupConsumer, GroupHandler, GroupSession, InitialOffset, KafkaConsumer,
    KafkaConsumerGroup, PartitionClaim, ProcessError, Record, RecordProcessor, SessionState,
    TrustAnchor,
};
use std::collections::HashMap;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Kafka broker 地址
/// 可以通过环境变量 KAFKA_BROKERS 覆盖，默认为 127.0.0.1:9092
fn kafka_brokers() -> Vec<String> {
    std::env::var("KAFKA_BROKERS")
        .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9092".to_string()])
}

/// 指向不可达地址的配置，连接会被立即拒绝
fn unreachable_config() -> ConsumerConfig {
    ConsumerConfig::new(["127.0.0.1:1"], "coin-close-test", ["coin-events"])
}

fn unreachable_group() -> KafkaConsumerGroup {
    group_for(&unreachable_config())
}

fn group_for(config: &ConsumerConfig) -> KafkaConsumerGroup {
    let descriptor =
        build_transport(config, &TrustAnchor::embedded()).expect("Failed to build transport");
    KafkaConsumerGroup::new(&descriptor, config.claim_buffer_size)
        .expect("Failed to create consumer group")
}

/// 统计 setup 次数，消息交给内部的分发处理器
struct CountingHandler<P> {
    setups: AtomicUsize,
    inner: DispatchHandler<P>,
}

impl<P: RecordProcessor> CountingHandler<P> {
    fn new(processor: P) -> Arc<Self> {
        Arc::new(Self {
            setups: AtomicUsize::new(0),
            inner: DispatchHandler::new(processor),
        })
    }

    fn setups(&self) -> usize {
        self.setups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<P: RecordProcessor> GroupHandler for CountingHandler<P> {
    async fn setup(&self, session: &dyn GroupSession) -> coin_middleware_consumer::Result<()> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        self.inner.setup(session).await
    }

    async fn consume_claim(
        &self,
        session: &dyn GroupSession,
        claim: PartitionClaim,
    ) -> coin_middleware_consumer::Result<()> {
        self.inner.consume_claim(session, claim).await
    }
}

/// 记录状态通道上出现过的所有状态，直到 Stopped
fn record_states(consumer: &GroupConsumer) -> tokio::task::JoinHandle<Vec<SessionState>> {
    let mut state = consumer.watch_state();
    tokio::spawn(async move {
        let mut seen = vec![*state.borrow_and_update()];
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            seen.push(current);
            if current == SessionState::Stopped {
                break;
            }
        }
        seen
    })
}

async fn produce(brokers: &[String], topic: &str, payloads: &[&str]) {
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", brokers.join(","))
        .set("message.timeout.ms", "5000")
        .create()
        .expect("Failed to create producer");
    for payload in payloads {
        producer
            .send(
                FutureRecord::to(topic).key("wallet-1").payload(*payload),
                Duration::from_secs(5),
            )
            .await
            .expect("Failed to produce record");
    }
}

struct Collector {
    records: Mutex<Vec<Record>>,
    expected: usize,
    done: Notify,
}

#[async_trait]
impl RecordProcessor for Collector {
    async fn process(&self, record: &Record) -> Result<(), ProcessError> {
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        if records.len() >= self.expected {
            self.done.notify_one();
        }
        Ok(())
    }
}

/// 测试：第二次 close 返回 Closed
#[tokio::test]
async fn test_close_twice() {
    let group = unreachable_group();

    group.close().await.expect("First close should succeed");
    assert!(group.is_closed());

    let err = group.close().await.expect_err("Second close should fail");
    assert!(matches!(err, ConsumerError::Closed));
}

/// 测试：关闭后的 consume 立即返回 Closed
#[tokio::test]
async fn test_consume_after_close() {
    let group = unreachable_group();
    group.close().await.expect("Failed to close group");

    let handler: Arc<dyn GroupHandler> = Arc::new(DispatchHandler::new(Arc::new(Collector {
        records: Mutex::new(Vec::new()),
        expected: 1,
        done: Notify::new(),
    })));
    let err = group
        .consume(&CancellationToken::new(), &["coin-events".to_string()], handler)
        .await
        .expect_err("consume after close should fail");
    assert!(err.is_closed());
}

/// 测试：broker 不可达时 start 以连接错误返回，且从未调用 setup
#[tokio::test]
async fn test_unreachable_broker_is_fatal_without_setup() {
    let handler = CountingHandler::new(Collector {
        records: Mutex::new(Vec::new()),
        expected: 1,
        done: Notify::new(),
    });
    let consumer = GroupConsumer::with_group(
        Arc::new(unreachable_group()),
        ["coin-events"],
        handler.clone(),
        Arc::new(FixedRejoinPolicy::immediate()),
    );

    let ctx = CancellationToken::new();
    let err = tokio::time::timeout(Duration::from_secs(30), consumer.start(&ctx))
        .await
        .expect("Unreachable broker was not reported")
        .expect_err("Unreachable broker should stop the consumer");

    assert!(
        matches!(err, ConsumerError::Consumer(_)),
        "unexpected error: {:?}",
        err
    );
    assert!(
        matches!(err.root_cause(), ConsumerError::Connection(_)),
        "unexpected root cause: {:?}",
        err.root_cause()
    );
    assert_eq!(handler.setups(), 0);
    assert_eq!(consumer.state(), SessionState::Stopped);
}

/// 测试：通过配置创建的消费者在 broker 不可达时从未进入 Consuming
#[tokio::test]
async fn test_unreachable_broker_never_consuming() {
    let collector = Arc::new(Collector {
        records: Mutex::new(Vec::new()),
        expected: 1,
        done: Notify::new(),
    });
    let consumer = GroupConsumer::new(&unreachable_config(), &TrustAnchor::embedded(), collector)
        .expect("Failed to create consumer");
    let states = record_states(&consumer);

    let ctx = CancellationToken::new();
    let err = tokio::time::timeout(Duration::from_secs(30), consumer.start(&ctx))
        .await
        .expect("Unreachable broker was not reported")
        .expect_err("Unreachable broker should stop the consumer");
    assert!(matches!(err.root_cause(), ConsumerError::Connection(_)));

    let states = states.await.expect("Failed to join state recorder");
    assert!(!states.contains(&SessionState::Consuming), "states: {:?}", states);
    assert_eq!(states.last(), Some(&SessionState::Stopped));
}

/// 测试：写入 3 条消息后被完整消费，close 后 start 返回 Ok
#[tokio::test]
#[ignore]
async fn test_broker_round_trip() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let topic = format!("coin-consumer-test-{}", std::process::id());
    let brokers = kafka_brokers();

    produce(&brokers, &topic, &["coin-0", "coin-1", "coin-2"]).await;

    let config = ConsumerConfig::new(brokers, format!("{}-group", topic), [topic.clone()])
        .with_initial_offset(InitialOffset::Earliest);
    let collector = Arc::new(Collector {
        records: Mutex::new(Vec::new()),
        expected: 3,
        done: Notify::new(),
    });
    let consumer = Arc::new(
        GroupConsumer::new(&config, &TrustAnchor::embedded(), Arc::clone(&collector))
            .expect("Failed to create consumer"),
    );

    let running = {
        let consumer = Arc::clone(&consumer);
        tokio::spawn(async move { consumer.start(&CancellationToken::new()).await })
    };

    tokio::time::timeout(Duration::from_secs(30), collector.done.notified())
        .await
        .expect("Timed out waiting for records");
    assert_eq!(consumer.state(), SessionState::Consuming);

    consumer.close().await.expect("Failed to close consumer");
    running
        .await
        .expect("Failed to join consumer task")
        .expect("Consumer should stop cleanly after close");

    let records = collector.records.lock().unwrap();
    let payloads: Vec<_> = records
        .iter()
        .map(|r| String::from_utf8_lossy(r.value.as_deref().unwrap_or_default()).into_owned())
        .collect();
    assert_eq!(payloads, vec!["coin-0", "coin-1", "coin-2"]);
    assert!(records.iter().all(|r| r.topic == topic));
    assert!(records.iter().all(|r| r.key.as_deref() == Some(&b"wallet-1"[..])));
}

/// 第一次见到某个 offset 时拒绝，之后接受
struct RejectFirstDelivery {
    deliveries: Mutex<HashMap<i64, usize>>,
    accepted: Mutex<Vec<i64>>,
    expected: usize,
    done: Notify,
}

#[async_trait]
impl RecordProcessor for RejectFirstDelivery {
    async fn process(&self, record: &Record) -> Result<(), ProcessError> {
        let first = {
            let mut deliveries = self.deliveries.lock().unwrap();
            let count = deliveries.entry(record.offset).or_default();
            *count += 1;
            *count == 1
        };
        if first && record.offset == 0 {
            return Err("first delivery rejected".into());
        }
        let mut accepted = self.accepted.lock().unwrap();
        accepted.push(record.offset);
        if accepted.len() >= self.expected {
            self.done.notify_one();
        }
        Ok(())
    }
}

/// 测试：被拒绝的消息在下一次会话中重新投递，之后的消息不会越过它
#[tokio::test]
#[ignore]
async fn test_rejected_record_is_redelivered() {
    let topic = format!("coin-consumer-redeliver-{}", std::process::id());
    let brokers = kafka_brokers();
    produce(&brokers, &topic, &["coin-0", "coin-1"]).await;

    let config = ConsumerConfig::new(brokers, format!("{}-group", topic), [topic.clone()])
        .with_initial_offset(InitialOffset::Earliest);
    let processor = Arc::new(RejectFirstDelivery {
        deliveries: Mutex::new(HashMap::new()),
        accepted: Mutex::new(Vec::new()),
        expected: 2,
        done: Notify::new(),
    });
    let consumer = Arc::new(
        GroupConsumer::new(&config, &TrustAnchor::embedded(), Arc::clone(&processor))
            .expect("Failed to create consumer"),
    );

    let running = {
        let consumer = Arc::clone(&consumer);
        tokio::spawn(async move { consumer.start(&CancellationToken::new()).await })
    };

    tokio::time::timeout(Duration::from_secs(30), processor.done.notified())
        .await
        .expect("Timed out waiting for redelivery");

    consumer.close().await.expect("Failed to close consumer");
    running
        .await
        .expect("Failed to join consumer task")
        .expect("Consumer should stop cleanly after close");

    assert_eq!(processor.deliveries.lock().unwrap().get(&0), Some(&2));
    assert_eq!(*processor.accepted.lock().unwrap(), vec![0, 1]);
}

/// 测试：另一个成员加入触发分区撤销后，原消费者重新加入而不是停止
#[tokio::test]
#[ignore]
async fn test_revocation_rejoins() {
    let topic = format!("coin-consumer-rebalance-{}", std::process::id());
    let brokers = kafka_brokers();
    produce(&brokers, &topic, &["coin-0"]).await;

    let config = ConsumerConfig::new(brokers, format!("{}-group", topic), [topic.clone()])
        .with_initial_offset(InitialOffset::Earliest);
    let collector = || Collector {
        records: Mutex::new(Vec::new()),
        expected: usize::MAX,
        done: Notify::new(),
    };

    let first_handler = CountingHandler::new(collector());
    let first = Arc::new(GroupConsumer::with_group(
        Arc::new(group_for(&config)),
        [topic.clone()],
        first_handler.clone(),
        Arc::new(FixedRejoinPolicy::immediate()),
    ));
    let first_running = {
        let consumer = Arc::clone(&first);
        tokio::spawn(async move { consumer.start(&CancellationToken::new()).await })
    };

    let wait_for_setups = |handler: Arc<CountingHandler<Collector>>, count: usize| async move {
        tokio::time::timeout(Duration::from_secs(30), async {
            while handler.setups() < count {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("Timed out waiting for session setup");
    };
    wait_for_setups(first_handler.clone(), 1).await;

    let second = Arc::new(
        GroupConsumer::new(&config, &TrustAnchor::embedded(), Arc::new(collector()))
            .expect("Failed to create consumer"),
    );
    let second_running = {
        let consumer = Arc::clone(&second);
        tokio::spawn(async move { consumer.start(&CancellationToken::new()).await })
    };

    // 撤销结束第一个会话，随后重新加入并再次 setup
    wait_for_setups(first_handler.clone(), 2).await;
    assert!(!first_running.is_finished());

    for (consumer, running) in [(first, first_running), (second, second_running)] {
        consumer.close().await.expect("Failed to close consumer");
        running
            .await
            .expect("Failed to join consumer task")
            .expect("Consumer should stop cleanly after close");
    }
}
