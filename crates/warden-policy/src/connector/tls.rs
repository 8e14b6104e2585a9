//! TLS client configuration for origin connections.
//!
//! Cipher names follow OpenSSL spelling, as written in `cipher` rules. Only
//! names on the allow-list are accepted; the ones rustls implements restrict
//! the TLS 1.2 suites offered, the others are skipped. A list of names
//! separated by `:` is accepted as OpenSSL does.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SupportedCipherSuite};
use tracing::debug;

use crate::rules::{Protocol, RuleSet};

/// Broadly compatible suite offered on the retry after a handshake failure.
pub const DEFAULT_CIPHER: &str = "ECDHE-ECDSA-AES256-GCM-SHA384";

/// Cipher names a `cipher` rule may select.
pub const CIPHER_OPTIONS: &[&str] = &[
    "NULL-SHA256",
    "AES128-SHA256",
    "AES256-SHA256",
    "AES128-GCM-SHA256",
    "AES256-GCM-SHA384",
    "DH-RSA-AES128-SHA256",
    "DH-RSA-AES256-SHA256",
    "DH-RSA-AES128-GCM-SHA256",
    "DH-RSA-AES256-GCM-SHA384",
    "DH-DSS-AES128-SHA256",
    "DH-DSS-AES256-SHA256",
    "DH-DSS-AES128-GCM-SHA256",
    "DH-DSS-AES256-GCM-SHA384",
    "DHE-RSA-AES128-SHA256",
    "DHE-RSA-AES256-SHA256",
    "DHE-RSA-AES128-GCM-SHA256",
    "DHE-RSA-AES256-GCM-SHA384",
    "DHE-DSS-AES128-SHA256",
    "DHE-DSS-AES256-SHA256",
    "DHE-DSS-AES128-GCM-SHA256",
    "DHE-DSS-AES256-GCM-SHA384",
    "ECDHE-RSA-AES128-SHA256",
    "ECDHE-RSA-AES256-SHA384",
    "ECDHE-RSA-AES128-GCM-SHA256",
    "ECDHE-RSA-AES256-GCM-SHA384",
    "ECDHE-ECDSA-AES128-SHA256",
    "ECDHE-ECDSA-AES256-SHA384",
    "ECDHE-ECDSA-AES128-GCM-SHA256",
    "ECDHE-ECDSA-AES256-GCM-SHA384",
    "ADH-AES128-SHA256",
    "ADH-AES256-SHA256",
    "ADH-AES128-GCM-SHA256",
    "ADH-AES256-GCM-SHA384",
    "AES128-CCM",
    "AES256-CCM",
    "DHE-RSA-AES128-CCM",
    "DHE-RSA-AES256-CCM",
    "AES128-CCM8",
    "AES256-CCM8",
    "DHE-RSA-AES128-CCM8",
    "DHE-RSA-AES256-CCM8",
    "ECDHE-ECDSA-AES128-CCM",
    "ECDHE-ECDSA-AES256-CCM",
    "ECDHE-ECDSA-AES128-CCM8",
    "ECDHE-ECDSA-AES256-CCM8",
];

/// Allow-listed spelling of `name`, compared case-insensitively.
pub fn canonical_cipher(name: &str) -> Option<&'static str> {
    let wanted = name.trim().to_ascii_uppercase();
    CIPHER_OPTIONS.iter().copied().find(|option| *option == wanted)
}

pub fn is_allowed_cipher(name: &str) -> bool {
    canonical_cipher(name).is_some()
}

/// Cipher selected by the request's `cipher` rule, if it names a valid one.
pub fn rule_cipher(rules: Option<&RuleSet>) -> Option<&'static str> {
    let rule = rules?.get_known(Protocol::Cipher)?;
    let value = rule.matcher_value();
    if value.is_empty() {
        return None;
    }
    canonical_cipher(value)
}

/// Cipher for the retry: the `cipher` rule if valid, otherwise
/// [`DEFAULT_CIPHER`].
pub fn resolve_cipher(rules: Option<&RuleSet>) -> &'static str {
    rule_cipher(rules).unwrap_or(DEFAULT_CIPHER)
}

/// The rustls suite behind an OpenSSL cipher name.
fn rustls_suite(name: &str) -> Option<SupportedCipherSuite> {
    use ring::cipher_suite::*;

    match name {
        "ECDHE-ECDSA-AES256-GCM-SHA384" => Some(TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384),
        "ECDHE-ECDSA-AES128-GCM-SHA256" => Some(TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256),
        "ECDHE-RSA-AES256-GCM-SHA384" => Some(TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384),
        "ECDHE-RSA-AES128-GCM-SHA256" => Some(TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256),
        _ => None,
    }
}

/// Crypto provider restricted to the TLS 1.2 suites named by `cipher`, an
/// OpenSSL-style list separated by `:`. TLS 1.3 suites are always offered.
///
/// Names off the allow-list or not implemented by rustls are skipped; when
/// none remain the provider defaults are kept.
pub fn provider_for(cipher: Option<&str>) -> CryptoProvider {
    let provider = ring::default_provider();
    let Some(cipher) = cipher else {
        return provider;
    };

    let mut selected: Vec<SupportedCipherSuite> = Vec::new();
    for name in cipher.split(':').map(str::trim).filter(|name| !name.is_empty()) {
        match canonical_cipher(name).and_then(rustls_suite) {
            Some(suite) if !selected.contains(&suite) => selected.push(suite),
            Some(_) => {}
            None => debug!(cipher = name, "Cipher not available, skipped"),
        }
    }
    if selected.is_empty() {
        debug!(cipher, "No listed cipher available, offering default suites");
        return provider;
    }

    let mut cipher_suites: Vec<SupportedCipherSuite> = provider
        .cipher_suites
        .iter()
        .copied()
        .filter(|s| matches!(s, SupportedCipherSuite::Tls13(_)))
        .collect();
    cipher_suites.extend(selected);
    CryptoProvider {
        cipher_suites,
        ..provider
    }
}

/// Build the client configuration for one attempt.
pub fn build_client_config(
    alpn_protocols: &[String],
    cipher: Option<&str>,
    skip_verify: bool,
) -> Result<ClientConfig, rustls::Error> {
    let builder = ClientConfig::builder_with_provider(Arc::new(provider_for(cipher)))
        .with_safe_default_protocol_versions()?;

    let mut config = if skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    config.alpn_protocols = alpn_protocols.iter().map(|p| p.as_bytes().to_vec()).collect();
    Ok(config)
}

/// Server name for SNI and certificate checks.
pub fn server_name(host: &str) -> Option<ServerName<'static>> {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    ServerName::try_from(host.to_string()).ok()
}

/// No-op certificate verifier for origins with self-signed certificates.
///
/// # Warning
/// This disables all TLS security checks.
#[derive(Debug)]
pub struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
