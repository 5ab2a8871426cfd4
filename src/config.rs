use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::error::{ConsumerError, Result};

/// 消费者配置
///
/// 启动时创建一次，之后不再修改。信任根证书不属于文件配置，
/// 通过 [`crate::kafka::TrustAnchor`] 显式传入构建器。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConsumerConfig {
    /// Broker 地址列表（host:port），按顺序尝试
    pub brokers: Vec<String>,
    /// 消费组 ID
    #[serde(alias = "consumer_group_id")]
    pub group_id: String,
    /// 订阅的 topic 集合
    pub topics: BTreeSet<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 无已提交 offset 时的起始位置
    #[serde(default)]
    pub initial_offset: InitialOffset,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_auto_commit_interval_ms")]
    pub auto_commit_interval_ms: u64,
    /// 每个分区 claim 的缓冲消息数
    #[serde(default = "default_claim_buffer_size")]
    pub claim_buffer_size: usize,
    /// 两次重新加入消费组之间的基础退避时间
    #[serde(default = "default_rejoin_backoff_ms")]
    pub rejoin_backoff_ms: u64,
    #[serde(default = "default_rejoin_backoff_max_ms")]
    pub rejoin_backoff_max_ms: u64,
    #[serde(default)]
    pub tls: TlsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsConfig {
    /// 是否校验 broker 证书，默认关闭（与线上 broker 的自签证书保持兼容）
    #[serde(default)]
    pub verify_peer: bool,
}

/// 初始 offset 策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialOffset {
    Earliest,
    #[default]
    Latest,
}

impl InitialOffset {
    /// rdkafka `auto.offset.reset` 取值
    pub fn as_str(&self) -> &'static str {
        match self {
            InitialOffset::Earliest => "earliest",
            InitialOffset::Latest => "latest",
        }
    }
}

impl fmt::Display for InitialOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_session_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    3_000
}

fn default_auto_commit_interval_ms() -> u64 {
    1_000
}

fn default_claim_buffer_size() -> usize {
    256
}

fn default_rejoin_backoff_ms() -> u64 {
    100
}

fn default_rejoin_backoff_max_ms() -> u64 {
    5_000
}

impl ConsumerConfig {
    /// 使用默认调优参数创建配置
    pub fn new<B, T>(brokers: B, group_id: impl Into<String>, topics: T) -> Self
    where
        B: IntoIterator,
        B::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            brokers: brokers.into_iter().map(Into::into).collect(),
            group_id: group_id.into(),
            topics: topics.into_iter().map(Into::into).collect(),
            username: None,
            password: None,
            initial_offset: InitialOffset::default(),
            client_id: None,
            session_timeout_ms: default_session_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            auto_commit_interval_ms: default_auto_commit_interval_ms(),
            claim_buffer_size: default_claim_buffer_size(),
            rejoin_backoff_ms: default_rejoin_backoff_ms(),
            rejoin_backoff_max_ms: default_rejoin_backoff_max_ms(),
            tls: TlsConfig::default(),
        }
    }

    /// 设置 SASL 凭证
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// 设置初始 offset 策略
    pub fn with_initial_offset(mut self, initial_offset: InitialOffset) -> Self {
        self.initial_offset = initial_offset;
        self
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ConsumerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.brokers.is_empty() {
            return Err(ConsumerError::configuration("at least one broker is required"));
        }
        if self.brokers.iter().any(|b| b.trim().is_empty()) {
            return Err(ConsumerError::configuration("broker address must not be empty"));
        }
        if self.group_id.trim().is_empty() {
            return Err(ConsumerError::configuration("group_id must not be empty"));
        }
        if self.topics.is_empty() || self.topics.iter().any(|t| t.trim().is_empty()) {
            return Err(ConsumerError::configuration(
                "topics must be a non-empty set of non-empty names",
            ));
        }
        if self.heartbeat_interval_ms >= self.session_timeout_ms {
            return Err(ConsumerError::configuration(format!(
                "heartbeat_interval_ms ({}) must be lower than session_timeout_ms ({})",
                self.heartbeat_interval_ms, self.session_timeout_ms
            )));
        }
        if self.claim_buffer_size == 0 {
            return Err(ConsumerError::configuration("claim_buffer_size must be positive"));
        }
        Ok(())
    }

    /// 用户名和密码都非空时才启用 SASL/TLS
    pub fn auth_enabled(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        filled(&self.username) && filled(&self.password)
    }

    /// 按订阅顺序返回 topic 列表
    pub fn topic_list(&self) -> Vec<String> {
        self.topics.iter().cloned().collect()
    }
}
