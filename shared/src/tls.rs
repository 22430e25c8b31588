use std::sync::Arc;

use hyper_util::rt::tokio::WithHyperIo;
use rustls::{ClientConfig, RootCertStore, crypto::CryptoProvider, pki_types::ServerName};
use tokio::net::TcpStream;
use tracing::{trace, warn};

use crate::{
    alpn::AlpnProtocol,
    crypto::init_crypto,
    http::HttpError,
    io::{IoAdapter, Transport},
};

#[derive(Debug, Clone)]
pub struct TlsConfig {
    crypto_provider: Arc<CryptoProvider>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        init_crypto();
        let provider = rustls::crypto::aws_lc_rs::default_provider();
        TlsConfig::from_provider(provider)
    }
}

impl TlsConfig {
    pub fn from_provider(provider: CryptoProvider) -> Self {
        Self {
            crypto_provider: Arc::new(provider),
        }
    }

    pub fn crypto_provider(&self) -> Arc<CryptoProvider> {
        self.crypto_provider.clone()
    }
}

/// Client x509 trust anchors plus the crypto provider. Loaded lazily by the
/// manager on its first HTTPS request and retained for the manager's
/// lifetime. Clones share the same anchors.
#[derive(Debug, Clone)]
pub struct TlsCredentials {
    roots: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
}

impl TlsCredentials {
    /// `roots` overrides the trust store entirely (tests, private CAs);
    /// otherwise the native store plus the webpki bundle is used.
    pub fn load(
        cfg: &TlsConfig,
        roots: Option<Arc<RootCertStore>>,
    ) -> Result<Self, HttpError> {
        let roots = match roots {
            Some(roots) => roots,
            None => Arc::new(system_roots()),
        };
        if roots.is_empty() {
            return Err(HttpError::TlsError(std::io::Error::other(
                "no trust anchors available",
            )));
        }
        Ok(Self {
            roots,
            provider: cfg.crypto_provider(),
        })
    }

    pub fn roots(&self) -> Arc<RootCertStore> {
        self.roots.clone()
    }

    fn client_config(&self, alpn_protocols: Vec<Vec<u8>>) -> Result<ClientConfig, HttpError> {
        let mut config = ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()?
            .with_root_certificates(self.roots.clone())
            .with_no_client_auth();
        config.alpn_protocols = alpn_protocols;
        config.enable_sni = true;
        Ok(config)
    }
}

fn system_roots() -> RootCertStore {
    let mut roots = rustls::RootCertStore::empty();

    let cert_result = rustls_native_certs::load_native_certs();

    for err in cert_result.errors.iter() {
        warn!("Load cert error {err}");
    }

    for cert in cert_result.certs {
        if let Err(e) = roots.add(cert) {
            warn!("failed to parse trust anchor: {}", e);
        }
    }

    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    roots
}

/// TLS handshake with SNI and the supplied ALPN offer list. Returns the
/// encrypted transport together with whatever protocol the server selected.
pub async fn client_tls(
    server_name: ServerName<'static>,
    stream: WithHyperIo<TcpStream>,
    alpn_protocols: Vec<Vec<u8>>,
    creds: &TlsCredentials,
) -> Result<(Transport, AlpnProtocol), HttpError> {
    let config = creds.client_config(alpn_protocols)?;
    let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
    let tls = connector
        .connect(server_name, stream)
        .await
        .map_err(|err| HttpError::TlsError(std::io::Error::other(format!("{err}"))))?;

    let alpn = AlpnProtocol::from_bytes_opt(tls.get_ref().1.alpn_protocol());
    trace!("TLS connected, alpn {alpn:?}");

    Ok((Box::new(IoAdapter::new_raw(tls)), alpn))
}
