use std::{
    pin::Pin,
    task::{Context, Poll},
};

use hyper_util::rt::TokioIo;
use hyper_util::rt::tokio::WithHyperIo;
use tokio::io::{AsyncRead, AsyncWrite};

use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

pub async fn local_tcp_listener(port: Option<u16>) -> Result<TcpListener, io::Error> {
    TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port.unwrap_or(0)))).await
}

/// A byte stream usable by hyper's client connections. The dialer returns
/// one of these for both plaintext and TLS transports; the connection
/// constructors adopt it, so a transport is owned by exactly one connection.
pub trait RIo: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static {}

pub type Transport = Box<dyn RIo>;

impl RIo for WithHyperIo<TcpStream> {}
impl RIo for IoAdapter<tokio_rustls::client::TlsStream<WithHyperIo<TcpStream>>> {}

/// Bridges a tokio I/O type into hyper's `Read`/`Write`.
pub struct IoAdapter<S> {
    stream: TokioIo<S>,
}

impl<S> IoAdapter<S> {
    pub fn new(stream: TokioIo<S>) -> Self {
        Self { stream }
    }

    pub fn new_raw(stream: S) -> Self {
        Self {
            stream: TokioIo::new(stream),
        }
    }
}

impl<S: AsyncWrite + Unpin> hyper::rt::Write for IoAdapter<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl<S: AsyncRead + Unpin> hyper::rt::Read for IoAdapter<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}
