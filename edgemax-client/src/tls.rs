//! TLS setup shared by the login client and the WebSocket stream.
//!
//! Both connections to the appliance must trust the same certificates, so
//! they are derived from one [`TlsConfig`].

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tracing::{debug, warn};

use crate::config::TlsConfig;
use crate::error::{ClientError, Result};

/// Read every certificate from a PEM file.
pub fn load_ca_certs(path: &std::path::Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        ClientError::Tls(format!("failed to open CA cert {}: {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            ClientError::Tls(format!("failed to parse CA cert {}: {}", path.display(), e))
        })?;

    if certs.is_empty() {
        return Err(ClientError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

/// Apply the TLS settings to an HTTP client builder.
pub fn configure_http(
    mut builder: reqwest::ClientBuilder,
    tls: &TlsConfig,
) -> Result<reqwest::ClientBuilder> {
    if tls.skip_verify {
        warn!("TLS certificate verification disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(ref path) = tls.ca_cert {
        let pem = std::fs::read(path).map_err(|e| {
            ClientError::Tls(format!("failed to read CA cert {}: {}", path.display(), e))
        })?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| ClientError::Tls(format!("invalid CA cert {}: {}", path.display(), e)))?;
        builder = builder.add_root_certificate(cert);
        debug!(path = %path.display(), "Loaded CA certificate for HTTP client");
    }

    Ok(builder)
}

/// Build the rustls configuration for the WebSocket stream.
///
/// Returns `None` when the default web PKI roots apply.
pub fn websocket_config(tls: &TlsConfig) -> Result<Option<Arc<rustls::ClientConfig>>> {
    if !tls.skip_verify && tls.ca_cert.is_none() {
        return Ok(None);
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::Tls(e.to_string()))?;

    let config = if tls.skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertVerifier { provider }))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        if let Some(ref path) = tls.ca_cert {
            for cert in load_ca_certs(path)? {
                roots
                    .add(cert)
                    .map_err(|e| ClientError::Tls(format!("rejected CA cert: {}", e)))?;
            }
        }
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(Some(Arc::new(config)))
}

// Accepts any server certificate but still checks handshake signatures.
#[derive(Debug)]
struct NoCertVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_uses_builtin_roots() {
        let config = websocket_config(&TlsConfig::default()).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn test_skip_verify_builds_config() {
        let tls = TlsConfig {
            skip_verify: true,
            ca_cert: None,
        };
        assert!(websocket_config(&tls).unwrap().is_some());
    }

    #[test]
    fn test_missing_ca_cert() {
        let tls = TlsConfig {
            skip_verify: false,
            ca_cert: Some("/nonexistent/ca.pem".into()),
        };
        let err = websocket_config(&tls).unwrap_err();
        assert!(matches!(err, ClientError::Tls(_)));
    }

    #[test]
    fn test_ca_cert_without_certificates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();

        let err = load_ca_certs(file.path()).unwrap_err();
        assert!(err.to_string().contains("no certificates"));
    }

    #[test]
    fn test_http_builder_missing_ca_cert() {
        let tls = TlsConfig {
            skip_verify: false,
            ca_cert: Some("/nonexistent/ca.pem".into()),
        };
        assert!(configure_http(reqwest::Client::builder(), &tls).is_err());
    }
}
