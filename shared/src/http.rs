use bytes::Bytes;
use http::Response;
use http::uri::InvalidUri;
use http::{HeaderMap, Method, header::HOST, response::Parts};
use http_body_util::BodyExt;
use http_body_util::Empty;
use hyper_util::rt::tokio::WithHyperIo;
use rustls::pki_types::InvalidDnsNameError;
use std::error::Error;
use tokio::net::TcpStream;
use tokio::time::error::Elapsed;
use tracing::debug;

use crate::uri::FUri;

type H1ClientBuilder = hyper::client::conn::http1::Builder;

/// A fully collected response: status line and headers plus the drained
/// body. The manager itself hands out streaming responses; this is the
/// terminal form used by the CLI and tests.
#[derive(Debug)]
pub struct HttpResponse {
    pub parts: Parts,
    pub body: Bytes,
    pub trailers: Option<HeaderMap>,
}

pub async fn collect(res: Response<hyper::body::Incoming>) -> Result<HttpResponse, HttpError> {
    let (parts, body) = res.into_parts();
    let collected = body.collect().await?;
    let trailers = collected.trailers().cloned();
    let body = collected.to_bytes();
    Ok(HttpResponse {
        parts,
        body,
        trailers,
    })
}

#[derive(Debug)]
pub enum HttpError {
    Io(std::io::Error),
    Hyper(hyper::Error),
    HyperUpgrade,
    Http(http::Error),
    Uri,
    InvalidDnsName,
    Timeout,
    ProxyConnect,
    TlsError(std::io::Error),
    Rustls(rustls::Error),
    BadHost,
    /// HTTP and HTTPS requests cannot share a manager that already holds
    /// the other scheme's connection.
    SchemeMix,
    /// The connection died under the request and no further attempt was
    /// permitted (second-pass failure, or a non-idempotent request on a
    /// dead cached connection).
    StaleConnection,
}

impl Error for HttpError {}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<InvalidDnsNameError> for HttpError {
    fn from(_: InvalidDnsNameError) -> Self {
        HttpError::InvalidDnsName
    }
}

impl From<InvalidUri> for HttpError {
    fn from(_: InvalidUri) -> Self {
        HttpError::Uri
    }
}

impl From<Elapsed> for HttpError {
    fn from(_: Elapsed) -> Self {
        HttpError::Timeout
    }
}

impl From<std::io::Error> for HttpError {
    fn from(value: std::io::Error) -> Self {
        HttpError::Io(value)
    }
}

impl From<hyper::Error> for HttpError {
    fn from(value: hyper::Error) -> Self {
        HttpError::Hyper(value)
    }
}

impl From<http::Error> for HttpError {
    fn from(value: http::Error) -> Self {
        HttpError::Http(value)
    }
}

impl From<rustls::Error> for HttpError {
    fn from(value: rustls::Error) -> Self {
        HttpError::Rustls(value)
    }
}

/// Opens a tunnel to `host:port` through an HTTP proxy using CONNECT and
/// hands back the raw TCP stream once the proxy answers 200. The CONNECT
/// exchange runs over a throwaway HTTP/1.1 connection that is recovered
/// via upgrade.
pub async fn connect_proxy(
    proxy: &FUri,
    host: &str,
    port: u16,
) -> Result<WithHyperIo<TcpStream>, HttpError> {
    let io = WithHyperIo::new(TcpStream::connect(proxy.host_port()).await?);
    let (mut sender, conn) = H1ClientBuilder::new()
        .title_case_headers(true)
        .handshake(io)
        .await?;

    tokio::task::spawn(async move {
        if let Err(err) = conn.with_upgrades().await {
            debug!("proxy connection ended: {err:?}");
        }
    });

    let authority = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    let req = http::Request::builder()
        .method(Method::CONNECT)
        .uri(authority.as_str())
        .header(HOST, authority.as_str())
        .body(Empty::<Bytes>::new())?;

    let resp = sender.send_request(req).await?;
    if resp.status() != 200 {
        return Err(HttpError::ProxyConnect);
    }
    let upgraded = hyper::upgrade::on(resp).await?;
    let parts: hyper::upgrade::Parts<WithHyperIo<TcpStream>> = upgraded
        .downcast()
        .map_err(|_| HttpError::HyperUpgrade)?;
    Ok(parts.io)
}
