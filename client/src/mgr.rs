use std::sync::Arc;

use http::Response;
use hyper::body::Incoming;
use rustls::RootCertStore;
use tracing::{debug, trace};

use foxy_shared::{
    http::HttpError,
    tls::{TlsConfig, TlsCredentials},
    uri::{FUri, Scheme},
};

use crate::{
    conn::{HttpConn, h1_conn, h2_conn},
    connect::{http_connect, https_connect},
    jar::CookieJar,
    request::Request,
};

/// HTTP/TLS connection manager. Holds at most one open upstream
/// connection and reuses it across requests, redialing once when a cached
/// connection turns out to be dead under an idempotent request.
///
/// No internal locking: `request` takes `&mut self`, so a manager serves
/// one dispatching caller at a time. Response bodies may still be read
/// concurrently with later requests.
pub struct HttpManager {
    // Slot order matters on drop: streams die with the connection, the
    // connection dies before the credentials.
    conn: Option<HttpConn>,
    creds: Option<TlsCredentials>,
    jar: Option<Arc<CookieJar>>,
    proxy: Option<FUri>,
    roots: Option<Arc<RootCertStore>>,
    tls: TlsConfig,
    use_h2c: bool,
}

#[derive(Default)]
pub struct ManagerBuilder {
    jar: Option<Arc<CookieJar>>,
    proxy: Option<FUri>,
    roots: Option<Arc<RootCertStore>>,
    tls: Option<TlsConfig>,
    use_h2c: bool,
}

impl ManagerBuilder {
    /// Externally owned cookie jar, handed back out via [`HttpManager::jar`].
    pub fn cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.jar = Some(jar);
        self
    }

    /// Use prior-knowledge HTTP/2 for plaintext origins instead of
    /// HTTP/1.1.
    pub fn use_h2c(mut self, use_h2c: bool) -> Self {
        self.use_h2c = use_h2c;
        self
    }

    /// Explicit proxy, consulted before the process environment.
    pub fn proxy(mut self, proxy: FUri) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Replaces the trust store used when credentials are loaded
    /// (private CAs, tests). Defaults to native roots plus the webpki
    /// bundle.
    pub fn trust_roots(mut self, roots: Arc<RootCertStore>) -> Self {
        self.roots = Some(roots);
        self
    }

    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn build(self) -> HttpManager {
        HttpManager {
            conn: None,
            creds: None,
            jar: self.jar,
            proxy: self.proxy,
            roots: self.roots,
            tls: self.tls.unwrap_or_default(),
            use_h2c: self.use_h2c,
        }
    }
}

impl HttpManager {
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::default()
    }

    pub fn new(jar: Option<Arc<CookieJar>>, use_h2c: bool) -> Self {
        let mut builder = Self::builder().use_h2c(use_h2c);
        if let Some(jar) = jar {
            builder = builder.cookie_jar(jar);
        }
        builder.build()
    }

    pub fn jar(&self) -> Option<Arc<CookieJar>> {
        self.jar.clone()
    }

    pub fn has_connection(&self) -> bool {
        self.conn.is_some()
    }

    pub fn has_credentials(&self) -> bool {
        self.creds.is_some()
    }

    /// Sends a request to `host`:`port` and returns the response once its
    /// status line and headers have arrived; the body streams on behind
    /// it. `port` 0 means the scheme default. Any failure after the
    /// bounded recovery below surfaces as an error.
    pub async fn request(
        &mut self,
        https: bool,
        host: &str,
        port: u16,
        req: &Request,
    ) -> Result<Response<Incoming>, HttpError> {
        if https {
            self.https_request(host, port, req).await
        } else {
            self.http_request(host, port, req).await
        }
    }

    /// Convenience over [`HttpManager::request`] deriving scheme, host
    /// and port from a URI.
    pub async fn fetch(
        &mut self,
        uri: &FUri,
        req: &Request,
    ) -> Result<Response<Incoming>, HttpError> {
        let host = uri.host().to_string();
        self.request(uri.is_tls(), &host, uri.port(), req).await
    }

    // Single connection, last-writer-wins; the arguments are reserved for
    // an origin-keyed cache policy.
    fn find(&mut self, _host: &str, _port: u16) -> Option<&mut HttpConn> {
        self.conn.as_mut()
    }

    fn release(&mut self) {
        debug_assert!(self.conn.is_some());
        // Dropping the handle closes the connection.
        self.conn = None;
    }

    fn install(&mut self, conn: HttpConn) {
        // The dispatcher always releases before installing.
        debug_assert!(self.conn.is_none());
        self.conn = Some(conn);
    }

    /// One attempt on the cached connection. `Ok(None)` means there is
    /// nothing usable in the cache and the caller may dial; an error means
    /// the request must not be attempted again.
    async fn try_reuse(
        &mut self,
        host: &str,
        port: u16,
        req: &Request,
    ) -> Result<Option<Response<Incoming>>, HttpError> {
        let Some(conn) = self.find(host, port) else {
            return Ok(None);
        };

        match conn.open_stream(host, port, req).await {
            Ok(stream) => match stream.initial().await {
                Ok(resp) => return Ok(Some(resp)),
                Err(err) => debug!("initial response failed: {err}"),
            },
            Err(err) => debug!("stream open failed: {err}"),
        }

        // Get rid of the closing or reset connection. Only an idempotent
        // request may fall through to another attempt; for anything else
        // we cannot know whether the origin processed it.
        self.release();
        if req.is_idempotent() {
            Ok(None)
        } else {
            Err(HttpError::StaleConnection)
        }
    }

    async fn https_request(
        &mut self,
        host: &str,
        port: u16,
        req: &Request,
    ) -> Result<Response<Incoming>, HttpError> {
        if self.creds.is_none() && self.conn.is_some() {
            // Switch from HTTP to HTTPS not implemented.
            return Err(HttpError::SchemeMix);
        }

        let creds = match &self.creds {
            Some(creds) => creds.clone(),
            None => {
                // First TLS connection: load the x509 trust anchors.
                let creds = TlsCredentials::load(&self.tls, self.roots.clone())?;
                self.creds = Some(creds.clone());
                creds
            }
        };

        let eff_port = if port == 0 { 443 } else { port };
        if let Some(resp) = self.try_reuse(host, eff_port, req).await? {
            trace!("existing connection reused");
            return Ok(resp);
        }

        let mut http2 = true;
        let tls = https_connect(&creds, host, port, &mut http2, self.proxy.as_ref()).await?;

        // ALPN picked the protocol version. An explicit "http/1.1"
        // selection must not degrade to HTTP/1.0; hyper speaks 1.1 on
        // this path either way.
        let conn = if http2 {
            h2_conn(tls, Scheme::Https).await?
        } else {
            // HTTPS through a proxy tunnels opaquely, so the request
            // line stays origin-form.
            h1_conn(tls, Scheme::Https, false).await?
        };
        debug!("connected {host}:{eff_port} over {:?}", conn.version());

        self.install(conn);

        match self.try_reuse(host, eff_port, req).await? {
            Some(resp) => Ok(resp),
            // The freshly dialed connection failed its first stream; do
            // not dial again.
            None => Err(HttpError::StaleConnection),
        }
    }

    async fn http_request(
        &mut self,
        host: &str,
        port: u16,
        req: &Request,
    ) -> Result<Response<Incoming>, HttpError> {
        if self.creds.is_some() && self.conn.is_some() {
            // Switch from HTTPS to HTTP not implemented.
            return Err(HttpError::SchemeMix);
        }

        let eff_port = if port == 0 { 80 } else { port };
        if let Some(resp) = self.try_reuse(host, eff_port, req).await? {
            trace!("existing connection reused");
            return Ok(resp);
        }

        let mut proxied = false;
        let tcp = http_connect(host, port, &mut proxied, self.proxy.as_ref()).await?;

        let conn = if self.use_h2c {
            h2_conn(tcp, Scheme::Http).await?
        } else {
            h1_conn(tcp, Scheme::Http, proxied).await?
        };
        debug!("connected {host}:{eff_port} over {:?}", conn.version());

        self.install(conn);

        match self.try_reuse(host, eff_port, req).await? {
            Some(resp) => Ok(resp),
            None => Err(HttpError::StaleConnection),
        }
    }
}
