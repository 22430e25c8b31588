use bytes::Bytes;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum AlpnProtocol {
    Http1,
    Http2,
    Unknown(Bytes),
    #[default]
    None,
}

const ALPN_H2: &[u8] = b"h2";
const ALPN_H11: &[u8] = b"http/1.1";

impl AlpnProtocol {
    pub fn to_bytes(&self) -> &[u8] {
        match self {
            AlpnProtocol::Http1 => ALPN_H11,
            AlpnProtocol::Http2 => ALPN_H2,
            AlpnProtocol::Unknown(bytes) => bytes,
            AlpnProtocol::None => &[],
        }
    }

    pub fn from_bytes_opt(alpn: Option<&[u8]>) -> Self {
        match alpn {
            Some(bytes) => AlpnProtocol::from_bytes(bytes),
            None => AlpnProtocol::None,
        }
    }

    pub fn from_bytes(alpn: &[u8]) -> Self {
        match alpn {
            ALPN_H2 => AlpnProtocol::Http2,
            ALPN_H11 => AlpnProtocol::Http1,
            _ => AlpnProtocol::Unknown(Bytes::from(alpn.to_owned())),
        }
    }

    pub fn is_h2(&self) -> bool {
        matches!(self, AlpnProtocol::Http2)
    }
}

pub fn alp_h2_h1() -> Vec<Vec<u8>> {
    vec![ALPN_H2.to_vec(), ALPN_H11.to_vec()]
}
pub fn alp_h1() -> Vec<Vec<u8>> {
    vec![ALPN_H11.to_vec()]
}
pub fn alp_h2() -> Vec<Vec<u8>> {
    vec![ALPN_H2.to_vec()]
}
