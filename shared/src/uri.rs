use std::{fmt::Display, net::SocketAddr, str::FromStr};

use http::{Uri, uri::InvalidUri};
use rustls::pki_types::{InvalidDnsNameError, ServerName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FUri {
    pub inner: Uri,
}

impl Display for FUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", self.inner))
    }
}

impl FUri {
    pub fn new(uri: Uri) -> Self {
        FUri { inner: uri }
    }

    pub fn scheme_str(&self) -> Option<&str> {
        self.inner.scheme_str()
    }

    pub fn host(&self) -> &str {
        self.inner.host().unwrap_or("localhost")
    }

    pub fn path(&self) -> &str {
        self.inner.path()
    }

    pub fn path_and_query(&self) -> &str {
        self.inner
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or(self.inner.path())
    }

    pub fn port(&self) -> u16 {
        match self.inner.port_u16() {
            Some(port) => port,
            None => match self.inner.scheme() {
                Some(scheme) if scheme == &http::uri::Scheme::HTTPS => 443,
                _ => 80,
            },
        }
    }

    /// Port as given in the URI, without scheme defaulting.
    pub fn explicit_port(&self) -> Option<u16> {
        self.inner.port_u16()
    }

    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.inner.scheme_str(), Some("https"))
    }

    pub fn scheme(&self) -> Scheme {
        if self.is_tls() {
            Scheme::Https
        } else {
            Scheme::Http
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn parse(value: &str) -> Option<Scheme> {
        match value {
            "https" => Some(Scheme::Https),
            "http" => Some(Scheme::Http),
            _ => None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        write!(f, "{s}")
    }
}

impl TryFrom<&FUri> for ServerName<'static> {
    type Error = InvalidDnsNameError;

    fn try_from(value: &FUri) -> Result<Self, Self::Error> {
        let host = value.host().to_string();
        ServerName::try_from(host)
    }
}

impl FromStr for FUri {
    type Err = InvalidUri;

    #[inline]
    fn from_str(s: &str) -> Result<FUri, InvalidUri> {
        let inner = Uri::try_from(s.as_bytes())?;
        Ok(FUri { inner })
    }
}

impl From<Uri> for FUri {
    fn from(v: Uri) -> FUri {
        FUri::new(v)
    }
}

impl From<&Uri> for FUri {
    fn from(v: &Uri) -> FUri {
        FUri::new(v.clone())
    }
}

impl TryFrom<SocketAddr> for FUri {
    type Error = InvalidUri;
    fn try_from(v: SocketAddr) -> Result<FUri, InvalidUri> {
        format!("{}:{}", v.ip(), v.port()).parse()
    }
}
