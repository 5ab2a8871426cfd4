//! 信任根证书
//!
//! 随部署产物一起发布的 PEM 证书，启动时加载一次并显式传给传输构建器

use std::fmt;
use std::path::Path;

use crate::error::{ConsumerError, Result};

/// 内置的 broker 根证书（AliKafka CA）
const EMBEDDED_ROOT_CA: &str = include_str!("../../certs/root_ca.pem");

/// PEM 格式的信任根
///
/// 构造时不做解析，解析失败在 [`crate::kafka::build_transport`] 中以配置错误返回
#[derive(Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    pem: String,
}

impl TrustAnchor {
    /// 内置信任根
    pub fn embedded() -> Self {
        Self::from_pem(EMBEDDED_ROOT_CA)
    }

    pub fn from_pem(pem: impl Into<String>) -> Self {
        Self { pem: pem.into() }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|e| {
            ConsumerError::configuration(format!(
                "failed to read trust anchor '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::from_pem(pem))
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// 解析为证书池
    ///
    /// 至少需要一张可解析的证书
    pub fn certificate_pool(&self) -> Result<CertificatePool> {
        let mut reader = self.pem.as_bytes();
        let certificates = rustls_pemfile::certs(&mut reader).map_err(|e| {
            ConsumerError::configuration(format!("failed to parse trust anchor: {}", e))
        })?;

        if certificates.is_empty() {
            return Err(ConsumerError::configuration(
                "trust anchor contains no PEM certificate",
            ));
        }

        Ok(CertificatePool {
            pem: self.pem.clone(),
            certificates,
        })
    }
}

impl fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustAnchor")
            .field("pem_len", &self.pem.len())
            .finish()
    }
}

/// 已解析的证书池
#[derive(Clone, PartialEq, Eq)]
pub struct CertificatePool {
    pem: String,
    certificates: Vec<Vec<u8>>,
}

impl CertificatePool {
    /// 证书数量
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// DER 编码的证书
    pub fn der_certificates(&self) -> &[Vec<u8>] {
        &self.certificates
    }

    /// 原始 PEM 文本（传给 librdkafka 的 `ssl.ca.pem`）
    pub fn pem(&self) -> &str {
        &self.pem
    }
}

impl fmt::Debug for CertificatePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificatePool")
            .field("certificates", &self.certificates.len())
            .finish()
    }
}
