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
use hyper_util::rt::TokioIo;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{MockServers, local_tls_acceptor, server_alpns};

type H1ServerBuilder = hyper::server::conn::http1::Builder;

pub async fn h1_server(
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
                if let Err(err) = H1ServerBuilder::new()
                    .preserve_header_case(true)
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

pub async fn h1s_server(
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
            info!("{server} request from {_addr}");
            if let Ok(client_tls) = acceptor.accept(stream).await {
                tokio::task::spawn(async move {
                    if let Err(err) = H1ServerBuilder::new()
                        .preserve_header_case(true)
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
