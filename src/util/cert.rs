//! X509 certificate management helpers
// (c) 2025 Ross Younger

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use rustls::RootCertStore;
use rustls_pki_types::pem::PemObject as _;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::{debug, info};

use crate::protocol::ALPN;
use crate::transport::PROTOCOL_KEEPALIVE;

/// In-memory representation of the server's TLS identity
pub(crate) struct Credentials {
    cert: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
}

impl Credentials {
    /// Loads a PEM pair from disk, generating (and persisting) a
    /// self-signed one if either file is missing.
    pub(crate) fn load_or_generate(cert_file: &Path, key_file: &Path) -> Result<Self> {
        if cert_file.exists() && key_file.exists() {
            debug!("loading certificate from {}", cert_file.display());
            let cert = CertificateDer::from_pem_file(cert_file)
                .with_context(|| format!("reading certificate {}", cert_file.display()))?;
            let key = PrivateKeyDer::from_pem_file(key_file)
                .with_context(|| format!("reading private key {}", key_file.display()))?;
            Ok(Self { cert, key })
        } else {
            Self::generate(cert_file, key_file)
        }
    }

    /// Generates a self-signed keypair and writes it out so clients can
    /// be pointed at the certificate.
    fn generate(cert_file: &Path, key_file: &Path) -> Result<Self> {
        let hostname = gethostname::gethostname()
            .into_string()
            .unwrap_or_else(|_| "unknown.host.invalid".to_string());
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string(), hostname])?;
        if let Some(dir) = cert_file.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(dir) = key_file.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(cert_file, cert.pem())
            .with_context(|| format!("writing {}", cert_file.display()))?;
        std::fs::write(key_file, key_pair.serialize_pem())
            .with_context(|| format!("writing {}", key_file.display()))?;
        info!(
            "generated self-signed certificate at {}",
            cert_file.display()
        );
        Ok(Self {
            cert: cert.der().clone(),
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
        })
    }

    /// QUIC server configuration with the protocol ALPN pinned
    pub(crate) fn server_config(self) -> Result<quinn::ServerConfig> {
        let mut tls = rustls::ServerConfig::builder_with_provider(ring_provider())
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .with_no_client_auth()
            .with_single_cert(vec![self.cert], self.key)?;
        tls.alpn_protocols = vec![ALPN.to_vec()];
        let mut config = quinn::ServerConfig::with_crypto(Arc::new(QuicServerConfig::try_from(tls)?));
        let _ = config.transport_config(transport_config());
        Ok(config)
    }
}

/// QUIC client configuration trusting the given certificate, with the
/// protocol ALPN pinned
pub(crate) fn client_config(trust: &Path) -> Result<quinn::ClientConfig> {
    let cert = CertificateDer::from_pem_file(trust)
        .with_context(|| format!("reading certificate {}", trust.display()))?;
    let mut roots = RootCertStore::empty();
    roots.add(cert)?;
    let mut tls = rustls::ClientConfig::builder_with_provider(ring_provider())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_root_certificates(roots)
        .with_no_client_auth();
    tls.alpn_protocols = vec![ALPN.to_vec()];
    let mut config = quinn::ClientConfig::new(Arc::new(QuicClientConfig::try_from(tls)?));
    let _ = config.transport_config(transport_config());
    Ok(config)
}

fn ring_provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn transport_config() -> Arc<quinn::TransportConfig> {
    let mut config = quinn::TransportConfig::default();
    let _ = config.keep_alive_interval(Some(PROTOCOL_KEEPALIVE));
    Arc::new(config)
}
