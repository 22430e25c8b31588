use std::{
    error::Error,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use foxy_shared::{FoxyCA, io::local_tcp_listener, tls::TlsConfig};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{MockServers, local_tls_acceptor, server_alpns};

type H2ServerBuilder<TokioIo> = hyper::server::conn::http2::Builder<TokioIo>;

pub async fn h2_server(
    server: MockServers,
    ca: &FoxyCA,
    tls_config: &TlsConfig,
    accepts: Arc<AtomicUsize>,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn Error>> {
    let tcp_listener = local_tcp_listener(None).await?;
    let addr = tcp_listener.local_addr()?;
    let acceptor = local_tls_acceptor(ca, tls_config, server_alpns(server))?;

    let handle = tokio::spawn(async move {
        info!("{server} listening on {}", addr);
        while let Ok((stream, _addr)) = tcp_listener.accept().await {
            accepts.fetch_add(1, Ordering::SeqCst);
            if let Ok(client_tls) = acceptor.accept(stream).await {
                info!("{server} request from {_addr}");
                tokio::task::spawn(async move {
                    if let Err(err) = H2ServerBuilder::new(TokioExecutor::new())
                        .serve_connection(
                            TokioIo::new(client_tls),
                            service_fn(move |req| crate::serve::serve(req, server)),
                        )
                        .await
                    {
                        error!("{server} server error: {err:?}");
                    }
                });
            }
        }
        warn!("{server} stopped");
    });

    Ok((addr, handle))
}

/// Prior-knowledge HTTP/2 over plain TCP; no Upgrade dance, the client is
/// expected to start with the h2 preface.
pub async fn h2c_server(
    server: MockServers,
    accepts: Arc<AtomicUsize>,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn Error>> {
    let tcp_listener = local_tcp_listener(None).await?;
    let addr = tcp_listener.local_addr()?;

    let handle = tokio::spawn(async move {
        info!("{server} listening on {}", addr);
        while let Ok((stream, _addr)) = tcp_listener.accept().await {
            accepts.fetch_add(1, Ordering::SeqCst);
            info!("{server} request from {_addr}");
            tokio::task::spawn(async move {
                if let Err(err) = H2ServerBuilder::new(TokioExecutor::new())
                    .serve_connection(
                        TokioIo::new(stream),
                        service_fn(move |req| crate::serve::serve(req, server)),
                    )
                    .await
                {
                    error!("{server} server error: {err:?}");
                }
            });
        }
        warn!("{server} stopped");
    });

    Ok((addr, handle))
}
