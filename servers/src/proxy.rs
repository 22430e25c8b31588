use std::{
    error::Error,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use foxy_shared::{body, io::local_tcp_listener};
use http::Response;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct ProxyCxt {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl ProxyCxt {
    /// CONNECT tunnels opened (or, for the plain proxy, requests served).
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for ProxyCxt {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Forward proxy speaking only CONNECT: answers 200 and then copies bytes
/// both ways. What runs inside the tunnel (TLS, ALPN) is none of its
/// business, which is exactly the property the HTTPS-through-proxy path
/// relies on.
pub async fn connect_proxy_server() -> Result<ProxyCxt, Box<dyn Error>> {
    let listener = local_tcp_listener(None).await?;
    let addr = listener.local_addr()?;
    let hits = Arc::new(AtomicUsize::new(0));
    let count = hits.clone();

    let handle = tokio::spawn(async move {
        info!("connect proxy listening on {addr}");
        while let Ok((mut stream, _addr)) = listener.accept().await {
            let count = count.clone();
            tokio::spawn(async move {
                if let Err(err) = tunnel(&mut stream, count).await {
                    debug!("tunnel ended: {err}");
                }
            });
        }
        warn!("connect proxy stopped");
    });

    Ok(ProxyCxt { addr, hits, handle })
}

async fn tunnel(client: &mut TcpStream, count: Arc<AtomicUsize>) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = client.read(&mut buf).await?;
        if n == 0 {
            return Err(std::io::Error::other("eof before CONNECT"));
        }
        head.extend_from_slice(&buf[..n]);
        if head.len() > 8192 {
            return Err(std::io::Error::other("CONNECT preamble too long"));
        }
    }

    let preamble = String::from_utf8_lossy(&head);
    let mut parts = preamble.split_whitespace();
    let method = parts.next().unwrap_or("");
    let authority = parts.next().unwrap_or("");
    if method != "CONNECT" || authority.is_empty() {
        client
            .write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n")
            .await?;
        return Err(std::io::Error::other(format!("unexpected {method}")));
    }

    let mut upstream = TcpStream::connect(authority).await?;
    client
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await?;
    count.fetch_add(1, Ordering::SeqCst);

    tokio::io::copy_bidirectional(client, &mut upstream).await?;
    Ok(())
}

/// Plain HTTP proxy stand-in: it does not forward, it only asserts that
/// the request line reached it in absolute-form and answers with the URI
/// it saw.
pub async fn plain_proxy_server() -> Result<ProxyCxt, Box<dyn Error>> {
    let listener = local_tcp_listener(None).await?;
    let addr = listener.local_addr()?;
    let hits = Arc::new(AtomicUsize::new(0));
    let count = hits.clone();

    let handle = tokio::spawn(async move {
        info!("plain proxy listening on {addr}");
        while let Ok((stream, _addr)) = listener.accept().await {
            let count = count.clone();
            tokio::task::spawn(async move {
                let served = hyper::server::conn::http1::Builder::new()
                    .serve_connection(
                        TokioIo::new(stream),
                        service_fn(move |req| {
                            let count = count.clone();
                            async move {
                                let uri = req.uri().clone();
                                if uri.scheme().is_none() {
                                    return Response::builder()
                                        .status(400)
                                        .body(body::full("absolute-form required"));
                                }
                                count.fetch_add(1, Ordering::SeqCst);
                                Response::builder().body(body::full(format!("PROXIED {uri}")))
                            }
                        }),
                    )
                    .await;
                if let Err(err) = served {
                    error!("plain proxy error: {err:?}");
                }
            });
        }
        warn!("plain proxy stopped");
    });

    Ok(ProxyCxt { addr, hits, handle })
}
