use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::client::conn::{http1, http2};
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;
use tracing::debug;

use foxy_shared::{
    body::BytesBody,
    http::HttpError,
    io::Transport,
    uri::Scheme,
    util::report,
};

use crate::request::{Request, WireFormat};

/// One upstream connection, owned exclusively by the manager. Releasing it
/// is dropping it: the sender half closes, the detached driver task winds
/// down once outstanding response bodies are drained, and the transport is
/// shut with it.
pub enum HttpConn {
    H1(H1Conn),
    H2(H2Conn),
}

pub struct H1Conn {
    sender: http1::SendRequest<BytesBody>,
    scheme: Scheme,
    proxied: bool,
}

pub struct H2Conn {
    sender: http2::SendRequest<BytesBody>,
    scheme: Scheme,
}

/// Builds an HTTP/1.1 connection over an opened transport. The handshake
/// adopts the transport; if it fails the transport is dropped closed.
pub async fn h1_conn(io: Transport, scheme: Scheme, proxied: bool) -> Result<HttpConn, HttpError> {
    let mut builder = http1::Builder::new();
    builder.title_case_headers(true);

    let (sender, conn) = timeout(Duration::from_secs(60), builder.handshake(io)).await??;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("upstream h1 connection ended: {}", report(&e));
        }
    });

    Ok(HttpConn::H1(H1Conn {
        sender,
        scheme,
        proxied,
    }))
}

/// Builds an HTTP/2 connection over an opened transport; used both for
/// ALPN-selected h2 over TLS and for prior-knowledge h2c over TCP.
pub async fn h2_conn(io: Transport, scheme: Scheme) -> Result<HttpConn, HttpError> {
    let (sender, conn) = timeout(
        Duration::from_secs(60),
        http2::handshake(TokioExecutor::new(), io),
    )
    .await??;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("upstream h2 connection ended: {}", report(&e));
        }
    });

    Ok(HttpConn::H2(H2Conn { sender, scheme }))
}

impl HttpConn {
    /// Submits a request on this connection. The readiness check is what
    /// detects a closed, reset, or GOAWAY-drained connection before we
    /// commit the request bytes; a failure here means the connection is
    /// dead and should be released.
    pub async fn open_stream(
        &mut self,
        host: &str,
        port: u16,
        req: &Request,
    ) -> Result<Stream, HttpError> {
        match self {
            HttpConn::H1(c) => {
                c.sender.ready().await?;
                let form = if c.proxied {
                    WireFormat::H1Absolute(c.scheme)
                } else {
                    WireFormat::H1Origin(c.scheme)
                };
                let wire = req.build(form, host, port)?;
                Ok(Stream {
                    fut: Box::pin(c.sender.send_request(wire)),
                })
            }
            HttpConn::H2(c) => {
                c.sender.ready().await?;
                let wire = req.build(WireFormat::H2(c.scheme), host, port)?;
                Ok(Stream {
                    fut: Box::pin(c.sender.send_request(wire)),
                })
            }
        }
    }

    pub fn version(&self) -> http::Version {
        match self {
            HttpConn::H1(_) => http::Version::HTTP_11,
            HttpConn::H2(_) => http::Version::HTTP_2,
        }
    }
}

type ResponseFuture =
    Pin<Box<dyn Future<Output = Result<http::Response<Incoming>, hyper::Error>> + Send>>;

/// An in-flight exchange on a connection. Owning it does not pin the
/// connection: if the manager releases the connection the stream fails,
/// which only happens on the dead-connection path where it was already
/// unusable.
pub struct Stream {
    fut: ResponseFuture,
}

impl Stream {
    /// Initial-message fetch: resolves once the status line and headers
    /// have arrived. The response body streams on afterwards.
    pub async fn initial(self) -> Result<http::Response<Incoming>, HttpError> {
        Ok(self.fut.await?)
    }
}
