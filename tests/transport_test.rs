//! 传输构建器测试
//!
//! 只检查生成的客户端描述和 rdkafka 配置，不建立网络连接。

use coin_middleware_consumer::{
    build_transport, AuthMode, ConsumerConfig, ConsumerError, InitialOffset, TrustAnchor,
};
use tokio_test::{assert_err, assert_ok};

fn config() -> ConsumerConfig {
    ConsumerConfig::new(
        ["kafka-1:9093", "kafka-2:9093"],
        "coin-settlement",
        ["coin-events"],
    )
}

/// 测试：未配置凭证时使用明文连接
#[test]
fn test_plaintext_without_credentials() {
    let descriptor = assert_ok!(build_transport(&config(), &TrustAnchor::embedded()));

    assert_eq!(descriptor.auth, AuthMode::None);
    assert!(!descriptor.auth.is_enabled());
    assert_eq!(descriptor.bootstrap_servers(), "kafka-1:9093,kafka-2:9093");

    let client = descriptor.client_config();
    assert_eq!(client.get("bootstrap.servers"), Some("kafka-1:9093,kafka-2:9093"));
    assert_eq!(client.get("group.id"), Some("coin-settlement"));
    assert_eq!(client.get("security.protocol"), Some("plaintext"));
    assert_eq!(client.get("auto.offset.reset"), Some("latest"));
    assert_eq!(client.get("enable.auto.commit"), Some("true"));
    assert_eq!(client.get("enable.auto.offset.store"), Some("false"));
    assert_eq!(client.get("session.timeout.ms"), Some("10000"));
    assert_eq!(client.get("heartbeat.interval.ms"), Some("3000"));
    assert_eq!(client.get("sasl.username"), None);
    assert_eq!(client.get("ssl.ca.pem"), None);
}

/// 测试：只有一个凭证非空时不启用认证，也不解析信任根
#[test]
fn test_partial_credentials_disable_auth() {
    let broken_anchor = TrustAnchor::from_pem("not a certificate");

    for config in [
        config().with_credentials("svc-coin", ""),
        config().with_credentials("", "s3cret"),
    ] {
        let descriptor =
            build_transport(&config, &broken_anchor).expect("Failed to build transport");
        assert_eq!(descriptor.auth, AuthMode::None);
    }
}

/// 测试：凭证齐全时使用 SASL_SSL + PLAIN，并携带内置根证书
#[test]
fn test_sasl_ssl_with_credentials() {
    let config = config()
        .with_credentials("svc-coin", "s3cret")
        .with_initial_offset(InitialOffset::Earliest);
    let descriptor =
        build_transport(&config, &TrustAnchor::embedded()).expect("Failed to build transport");

    let tls = match &descriptor.auth {
        AuthMode::SaslSsl {
            username,
            password,
            tls,
        } => {
            assert_eq!(username, "svc-coin");
            assert_eq!(password, "s3cret");
            tls
        }
        other => panic!("unexpected auth mode: {:?}", other),
    };
    assert_eq!(tls.trust_pool.len(), 1);
    assert!(!tls.verify_peer);

    let client = descriptor.client_config();
    assert_eq!(client.get("security.protocol"), Some("sasl_ssl"));
    assert_eq!(client.get("sasl.mechanism"), Some("PLAIN"));
    assert_eq!(client.get("sasl.username"), Some("svc-coin"));
    assert_eq!(client.get("sasl.password"), Some("s3cret"));
    assert_eq!(client.get("auto.offset.reset"), Some("earliest"));
    assert_eq!(client.get("enable.ssl.certificate.verification"), Some("false"));
    assert_eq!(client.get("ssl.endpoint.identification.algorithm"), Some("none"));
    assert!(
        client
            .get("ssl.ca.pem")
            .is_some_and(|pem| pem.contains("BEGIN CERTIFICATE"))
    );
}

/// 测试：开启证书校验时不关闭主机名校验
#[test]
fn test_peer_verification_enabled() {
    let mut config = config().with_credentials("svc-coin", "s3cret");
    config.tls.verify_peer = true;

    let descriptor =
        build_transport(&config, &TrustAnchor::embedded()).expect("Failed to build transport");
    let client = descriptor.client_config();

    assert_eq!(client.get("enable.ssl.certificate.verification"), Some("true"));
    assert_eq!(client.get("ssl.endpoint.identification.algorithm"), None);
}

/// 测试：无法解析的信任根在构建阶段返回配置错误
#[test]
fn test_malformed_trust_anchor() {
    let config = config().with_credentials("svc-coin", "s3cret");

    for pem in [
        "",
        "not a certificate",
        "-----BEGIN CERTIFICATE-----\n@@@@\n-----END CERTIFICATE-----\n",
    ] {
        let err = assert_err!(build_transport(&config, &TrustAnchor::from_pem(pem)));
        assert!(
            matches!(err, ConsumerError::Configuration(_)),
            "unexpected error for {:?}: {:?}",
            pem,
            err
        );
    }
}

/// 测试：Debug 输出不包含密码
#[test]
fn test_debug_redacts_password() {
    let config = config().with_credentials("svc-coin", "s3cret");
    let descriptor =
        build_transport(&config, &TrustAnchor::embedded()).expect("Failed to build transport");

    let rendered = format!("{:?}", descriptor);
    assert!(rendered.contains("svc-coin"));
    assert!(!rendered.contains("s3cret"));
}

/// 测试：内置信任根可解析
#[test]
fn test_embedded_trust_anchor_parses() {
    let pool = TrustAnchor::embedded()
        .certificate_pool()
        .expect("Embedded trust anchor should parse");
    assert!(!pool.is_empty());
    assert!(!pool.der_certificates()[0].is_empty());
}
