#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{
    error::Error,
    fmt::Display,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use foxy_shared::{
    FoxyCA,
    alpn::{AlpnProtocol, alp_h1, alp_h2_h1},
    tls::TlsConfig,
    uri::FUri,
};
use http::Version;
use rustls::{ServerConfig, pki_types::PrivateKeyDer};
use strum::EnumIter;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::{
    h1::{h1_server, h1s_server},
    h2::{h2_server, h2c_server},
};

pub mod h1;
pub mod h2;
pub mod proxy;
pub mod serve;

pub static H11_BODY: &str = "H11";
pub static H11_CLOSE_BODY: &str = "H11CLOSE";
pub static H11S_BODY: &str = "H11S";
pub static H2_BODY: &str = "H2";
pub static H2C_BODY: &str = "H2C";

#[derive(EnumIter, Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum MockServers {
    /// Plain HTTP/1.1.
    H11,
    /// Plain HTTP/1.1 closing the connection after every exchange.
    H11Close,
    /// TLS offering only http/1.1.
    H11S,
    /// TLS preferring h2 with http/1.1 as fallback.
    H2,
    /// Plain prior-knowledge HTTP/2.
    H2C,
}

impl Display for MockServers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{self:?}, {}, {:?}, {:?}",
            self.scheme(),
            self.alpn(),
            self.version()
        ))
    }
}

impl MockServers {
    pub fn alpn(&self) -> AlpnProtocol {
        match self {
            MockServers::H11 | MockServers::H11Close | MockServers::H2C => AlpnProtocol::None,
            MockServers::H11S => AlpnProtocol::Http1,
            MockServers::H2 => AlpnProtocol::Http2,
        }
    }

    pub fn version(&self) -> Version {
        match self {
            MockServers::H11 | MockServers::H11Close | MockServers::H11S => Version::HTTP_11,
            MockServers::H2 | MockServers::H2C => Version::HTTP_2,
        }
    }

    pub fn marker(&self) -> &str {
        match self {
            MockServers::H11 => H11_BODY,
            MockServers::H11Close => H11_CLOSE_BODY,
            MockServers::H11S => H11S_BODY,
            MockServers::H2 => H2_BODY,
            MockServers::H2C => H2C_BODY,
        }
    }

    fn scheme(&self) -> &str {
        if self.is_tls() { "https" } else { "http" }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, MockServers::H11S | MockServers::H2)
    }

    pub async fn start(
        &self,
        ca: &FoxyCA,
        tls_config: &TlsConfig,
    ) -> Result<ServerCxt, Box<dyn Error>> {
        let accepts = Arc::new(AtomicUsize::new(0));
        let (addr, handle) = match self {
            MockServers::H11 | MockServers::H11Close => h1_server(*self, accepts.clone()).await?,
            MockServers::H11S => {
                h1s_server(*self, ca, tls_config, accepts.clone()).await?
            }
            MockServers::H2 => h2_server(*self, ca, tls_config, accepts.clone()).await?,
            MockServers::H2C => h2c_server(*self, accepts.clone()).await?,
        };
        debug!("started {self} on {addr}");

        let target: FUri = format!("{}://localhost:{}", self.scheme(), addr.port()).parse()?;

        Ok(ServerCxt {
            server: *self,
            target,
            addr,
            accepts,
            handle,
        })
    }
}

#[derive(Debug)]
pub struct ServerCxt {
    pub server: MockServers,
    pub target: FUri,
    pub addr: SocketAddr,
    accepts: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl ServerCxt {
    /// TCP connections accepted so far; one handshake per accept, so this
    /// is what "no second handshake" assertions read.
    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }
}

impl Drop for ServerCxt {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn local_tls_config(
    ca: &FoxyCA,
    tls_config: &TlsConfig,
    alpns: Vec<Vec<u8>>,
) -> Result<ServerConfig, Box<dyn Error>> {
    let (leaf, key_pair) = ca.sign_leaf(
        "localhost",
        vec!["localhost".to_string(), "127.0.0.1".to_string()],
    )?;
    let pk_der = PrivateKeyDer::try_from(key_pair.serialize_der())?;

    let mut server_config = ServerConfig::builder_with_provider(tls_config.crypto_provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(vec![leaf.der().clone()], pk_der)?;

    server_config.alpn_protocols = alpns;
    Ok(server_config)
}

pub fn local_tls_acceptor(
    ca: &FoxyCA,
    tls_config: &TlsConfig,
    alpns: Vec<Vec<u8>>,
) -> Result<TlsAcceptor, Box<dyn Error>> {
    Ok(TlsAcceptor::from(Arc::new(local_tls_config(
        ca, tls_config, alpns,
    )?)))
}

pub(crate) fn server_alpns(server: MockServers) -> Vec<Vec<u8>> {
    match server.alpn() {
        AlpnProtocol::Http2 => alp_h2_h1(),
        _ => alp_h1(),
    }
}
