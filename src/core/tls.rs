//! TLS metadata consumed by build-argument composition
//!
//! Certificate generation happens elsewhere; this module only describes
//! which certificate a service expects and in which mode.

use std::collections::BTreeMap;

use crate::core::service::TlsConfig;

/// TLS build arguments of one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMetadata {
    pub enabled: bool,
    pub mode: String,
    pub cert_name: String,
    pub ca_name: String,
}

impl TlsMetadata {
    /// `TLS_ENABLED`, `TLS_MODE`, `TLS_CERT_NAME`, `TLS_CA_NAME`
    pub fn build_args(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("TLS_ENABLED".to_string(), self.enabled.to_string()),
            ("TLS_MODE".to_string(), self.mode.clone()),
            ("TLS_CERT_NAME".to_string(), self.cert_name.clone()),
            ("TLS_CA_NAME".to_string(), self.ca_name.clone()),
        ])
    }
}

/// Supplies TLS metadata for a service's TLS block
pub trait TlsMetadataProvider {
    fn metadata(&self, service: &str, tls: &TlsConfig) -> TlsMetadata;
}

/// Metadata taken straight from the service's `[tls]` table.
///
/// Unset names default to `<service>` for the certificate and `ca` for
/// the authority.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigTls;

impl TlsMetadataProvider for ConfigTls {
    fn metadata(&self, service: &str, tls: &TlsConfig) -> TlsMetadata {
        TlsMetadata {
            enabled: tls.enabled,
            mode: tls.mode.clone(),
            cert_name: tls.cert_name.clone().unwrap_or_else(|| service.to_string()),
            ca_name: tls.ca_name.clone().unwrap_or_else(|| "ca".to_string()),
        }
    }
}
