use hyper_util::rt::tokio::WithHyperIo;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use foxy_shared::{
    alpn::{alp_h1, alp_h2_h1},
    http::{HttpError, connect_proxy},
    io::Transport,
    proxy::proxy_for_url,
    tls::{TlsCredentials, client_tls},
    uri::FUri,
};

/// Canonical origin URL used for the environment proxy query: IPv6
/// literals are bracketed and an unspecified port (0) is left off.
fn canonical_origin(host: &str, port: u16, secure: bool) -> String {
    let scheme = if secure { "https" } else { "http" };
    match (host.contains(':'), port) {
        (true, 0) => format!("{scheme}://[{host}]"),
        (true, p) => format!("{scheme}://[{host}]:{p}"),
        (false, 0) => format!("{scheme}://{host}"),
        (false, p) => format!("{scheme}://{host}:{p}"),
    }
}

/// Proxy applicable to the target: an explicit override wins, otherwise
/// the process environment is consulted.
pub(crate) fn proxy_find(
    explicit: Option<&FUri>,
    host: &str,
    port: u16,
    secure: bool,
) -> Option<FUri> {
    if let Some(proxy) = explicit {
        return Some(proxy.clone());
    }
    let url: FUri = canonical_origin(host, port, secure).parse().ok()?;
    proxy_for_url(&url)
}

/// TLS dial with ALPN. On input `*http2` says whether h2 may be offered;
/// on output it reports whether the server actually selected h2. With a
/// proxy configured the transport is tunneled through CONNECT first; the
/// TLS session runs end to end either way.
pub(crate) async fn https_connect(
    creds: &TlsCredentials,
    host: &str,
    port: u16,
    http2: &mut bool,
    explicit_proxy: Option<&FUri>,
) -> Result<Transport, HttpError> {
    let dial_port = if port == 0 { 443 } else { port };
    let server_name: ServerName = host.to_string().try_into()?;
    let alpns = if *http2 { alp_h2_h1() } else { alp_h1() };

    let stream = match proxy_find(explicit_proxy, host, port, true) {
        Some(proxy) => {
            debug!("CONNECT via {proxy} to {host}:{dial_port}");
            connect_proxy(&proxy, host, dial_port).await?
        }
        None => {
            trace!("TCP dial {host}:{dial_port}");
            WithHyperIo::new(TcpStream::connect((host, dial_port)).await?)
        }
    };

    let (tls, alpn) = client_tls(server_name, stream, alpns, creds).await?;
    *http2 = alpn.is_h2();
    Ok(tls)
}

/// Plaintext dial. With a proxy configured we connect to the proxy instead
/// and flag the transport as proxied, which switches the request line to
/// absolute-form downstream. A proxied plaintext transport is never used
/// for HTTPS; that goes through the CONNECT path above.
pub(crate) async fn http_connect(
    host: &str,
    port: u16,
    proxied: &mut bool,
    explicit_proxy: Option<&FUri>,
) -> Result<Transport, HttpError> {
    match proxy_find(explicit_proxy, host, port, false) {
        Some(proxy) => {
            if proxy.inner.host().is_none() {
                return Err(HttpError::BadHost);
            }
            debug!("plain dial via proxy {proxy}");
            *proxied = true;
            let stream = TcpStream::connect((proxy.host(), proxy.port())).await?;
            Ok(Box::new(WithHyperIo::new(stream)))
        }
        None => {
            let dial_port = if port == 0 { 80 } else { port };
            trace!("TCP dial {host}:{dial_port}");
            *proxied = false;
            let stream = TcpStream::connect((host, dial_port)).await?;
            Ok(Box::new(WithHyperIo::new(stream)))
        }
    }
}
