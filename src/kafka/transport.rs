//! Kafka 传输构建器
//!
//! 根据 [`ConsumerConfig`] 生成认证/TLS/offset 策略完整的客户端描述，
//! 不做任何网络 I/O

use rdkafka::config::ClientConfig;
use std::fmt;
use tracing::{info, warn};

use super::trust::{CertificatePool, TrustAnchor};
use crate::config::{ConsumerConfig, InitialOffset};
use crate::error::Result;

/// 认证方式
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// 明文、无认证
    None,
    /// SASL/PLAIN over TLS
    SaslSsl {
        username: String,
        password: String,
        tls: TlsSettings,
    },
}

impl AuthMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, AuthMode::SaslSsl { .. })
    }

    /// rdkafka `security.protocol` 取值
    pub fn security_protocol(&self) -> &'static str {
        match self {
            AuthMode::None => "plaintext",
            AuthMode::SaslSsl { .. } => "sasl_ssl",
        }
    }

    pub fn tls(&self) -> Option<&TlsSettings> {
        match self {
            AuthMode::None => None,
            AuthMode::SaslSsl { tls, .. } => Some(tls),
        }
    }
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::None => f.write_str("None"),
            AuthMode::SaslSsl { username, tls, .. } => f
                .debug_struct("SaslSsl")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("tls", tls)
                .finish(),
        }
    }
}

/// TLS 设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub trust_pool: CertificatePool,
    /// 是否校验 broker 证书
    pub verify_peer: bool,
}

/// 客户端构建描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportDescriptor {
    pub brokers: Vec<String>,
    pub group_id: String,
    pub client_id: Option<String>,
    pub initial_offset: InitialOffset,
    pub session_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub auto_commit_interval_ms: u64,
    pub auth: AuthMode,
}

/// 构建传输描述
///
/// 用户名和密码都非空时启用 SASL_SSL，并从信任根构建证书池；
/// 信任根无法解析时返回配置错误，不产生任何部分状态
pub fn build_transport(
    config: &ConsumerConfig,
    trust_anchor: &TrustAnchor,
) -> Result<TransportDescriptor> {
    let auth = match (&config.username, &config.password) {
        (Some(username), Some(password)) if config.auth_enabled() => {
            let trust_pool = trust_anchor.certificate_pool()?;
            if !config.tls.verify_peer {
                warn!(
                    group_id = %config.group_id,
                    "TLS peer certificate verification is disabled"
                );
            }
            AuthMode::SaslSsl {
                username: username.clone(),
                password: password.clone(),
                tls: TlsSettings {
                    trust_pool,
                    verify_peer: config.tls.verify_peer,
                },
            }
        }
        _ => AuthMode::None,
    };

    let descriptor = TransportDescriptor {
        brokers: config.brokers.clone(),
        group_id: config.group_id.clone(),
        client_id: config.client_id.clone(),
        initial_offset: config.initial_offset,
        session_timeout_ms: config.session_timeout_ms,
        heartbeat_interval_ms: config.heartbeat_interval_ms,
        auto_commit_interval_ms: config.auto_commit_interval_ms,
        auth,
    };

    info!(
        brokers = ?descriptor.brokers,
        group_id = %descriptor.group_id,
        initial_offset = %descriptor.initial_offset,
        security_protocol = descriptor.auth.security_protocol(),
        "Kafka transport configured"
    );

    Ok(descriptor)
}

impl TransportDescriptor {
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    /// 生成 rdkafka 客户端配置
    ///
    /// 自动提交开启、自动 offset 存储关闭：只有被标记的消息才会被提交
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", self.bootstrap_servers())
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", self.initial_offset.as_str())
            .set("enable.partition.eof", "false")
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set(
                "auto.commit.interval.ms",
                self.auto_commit_interval_ms.to_string(),
            )
            .set("session.timeout.ms", self.session_timeout_ms.to_string())
            .set(
                "heartbeat.interval.ms",
                self.heartbeat_interval_ms.to_string(),
            )
            .set("security.protocol", self.auth.security_protocol());

        if let Some(client_id) = &self.client_id {
            client_config.set("client.id", client_id);
        }

        if let AuthMode::SaslSsl {
            username,
            password,
            tls,
        } = &self.auth
        {
            client_config
                .set("sasl.mechanism", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password)
                .set("ssl.ca.pem", tls.trust_pool.pem())
                .set(
                    "enable.ssl.certificate.verification",
                    tls.verify_peer.to_string(),
                );
            if !tls.verify_peer {
                client_config.set("ssl.endpoint.identification.algorithm", "none");
            }
        }

        client_config
    }
}
