use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Uri, header::HOST};

use foxy_shared::{
    body::{self, BytesBody},
    http::HttpError,
    uri::Scheme,
};

/// What the caller wants sent: method, target path and headers, plus an
/// optional body held as plain bytes. Cloning is cheap and the dispatcher
/// rebuilds the on-wire request for every attempt, so a retry never
/// depends on a body stream that was already consumed.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: String,
    headers: HeaderMap,
    body: Bytes,
}

/// How the request line is serialized, which depends on the connection
/// flavor it is sent over.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WireFormat {
    /// HTTP/1.1 to an origin: origin-form target plus a Host header.
    H1Origin(Scheme),
    /// HTTP/1.1 through a plain proxy: absolute-form target.
    H1Absolute(Scheme),
    /// HTTP/2: absolute URI, hyper derives `:scheme` and `:authority`.
    H2(Scheme),
}

impl Request {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        let mut target = target.into();
        if target.is_empty() {
            target.push('/');
        }
        Self {
            method,
            target,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn header(mut self, name: http::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether a dead-connection retry is safe. POST and PATCH are not:
    /// if the connection died under them there is no way to know whether
    /// the origin processed the request. CONNECT counts as idempotent
    /// because retrying it has no effect on the origin.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method.as_str(),
            "GET" | "HEAD" | "PUT" | "DELETE" | "OPTIONS" | "TRACE" | "CONNECT"
        )
    }

    pub(crate) fn build(
        &self,
        form: WireFormat,
        host: &str,
        port: u16,
    ) -> Result<http::Request<BytesBody>, HttpError> {
        let authority = authority(host, port, scheme_of(form));
        let uri: Uri = match form {
            WireFormat::H1Origin(_) => self.target.parse()?,
            WireFormat::H1Absolute(scheme) | WireFormat::H2(scheme) => {
                format!("{scheme}://{authority}{}", self.target).parse()?
            }
        };

        let builder = http::Request::builder().method(self.method.clone()).uri(uri);
        let body = if self.body.is_empty() {
            body::empty()
        } else {
            body::full(self.body.clone())
        };
        let mut req = builder.body(body)?;

        let headers = req.headers_mut();
        for (name, value) in self.headers.iter() {
            headers.append(name, value.clone());
        }
        if matches!(form, WireFormat::H1Origin(_) | WireFormat::H1Absolute(_))
            && !headers.contains_key(HOST)
        {
            let value = HeaderValue::from_str(&authority).map_err(http::Error::from)?;
            headers.insert(HOST, value);
        }
        Ok(req)
    }
}

fn scheme_of(form: WireFormat) -> Scheme {
    match form {
        WireFormat::H1Origin(scheme)
        | WireFormat::H1Absolute(scheme)
        | WireFormat::H2(scheme) => scheme,
    }
}

/// Authority string with IPv6 bracketing; the default port for the scheme
/// is left off, matching what servers expect in Host.
fn authority(host: &str, port: u16, scheme: Scheme) -> String {
    let bracketed = host.contains(':');
    match (bracketed, port == scheme.default_port()) {
        (true, true) => format!("[{host}]"),
        (true, false) => format!("[{host}]:{port}"),
        (false, true) => host.to_string(),
        (false, false) => format!("{host}:{port}"),
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_methods() {
        for m in ["GET", "HEAD", "PUT", "DELETE", "OPTIONS", "TRACE", "CONNECT"] {
            let req = Request::new(Method::from_bytes(m.as_bytes()).unwrap(), "/");
            assert!(req.is_idempotent(), "{m} should be idempotent");
        }
        for m in ["POST", "PATCH"] {
            let req = Request::new(Method::from_bytes(m.as_bytes()).unwrap(), "/");
            assert!(!req.is_idempotent(), "{m} must not be retried");
        }
    }

    #[test]
    fn origin_form_has_host_header() {
        let req = Request::get("/a/b?c=d")
            .build(WireFormat::H1Origin(Scheme::Http), "example.test", 8080)
            .unwrap();
        assert_eq!(req.uri().to_string(), "/a/b?c=d");
        assert_eq!(
            req.headers().get(HOST).unwrap().to_str().unwrap(),
            "example.test:8080"
        );
    }

    #[test]
    fn origin_form_omits_default_port() {
        let req = Request::get("/")
            .build(WireFormat::H1Origin(Scheme::Http), "example.test", 80)
            .unwrap();
        assert_eq!(
            req.headers().get(HOST).unwrap().to_str().unwrap(),
            "example.test"
        );
    }

    #[test]
    fn absolute_form_for_plain_proxies() {
        let req = Request::get("/media/item")
            .build(WireFormat::H1Absolute(Scheme::Http), "example.test", 8080)
            .unwrap();
        assert_eq!(
            req.uri().to_string(),
            "http://example.test:8080/media/item"
        );
        assert!(req.headers().contains_key(HOST));
    }

    #[test]
    fn h2_uri_is_absolute_without_host_header() {
        let req = Request::get("/stream")
            .build(WireFormat::H2(Scheme::Https), "example.test", 8443)
            .unwrap();
        assert_eq!(req.uri().to_string(), "https://example.test:8443/stream");
        assert!(!req.headers().contains_key(HOST));
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let req = Request::get("/")
            .build(WireFormat::H1Origin(Scheme::Http), "::1", 8080)
            .unwrap();
        assert_eq!(req.headers().get(HOST).unwrap().to_str().unwrap(), "[::1]:8080");
    }

    #[test]
    fn caller_host_header_is_kept() {
        let req = Request::get("/")
            .header(HOST, HeaderValue::from_static("override.test"))
            .build(WireFormat::H1Origin(Scheme::Http), "example.test", 8080)
            .unwrap();
        assert_eq!(
            req.headers().get(HOST).unwrap().to_str().unwrap(),
            "override.test"
        );
    }

    #[test]
    fn empty_target_becomes_root() {
        let req = Request::get("");
        assert_eq!(req.target(), "/");
    }
}
