use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::{Empty, Full, combinators::BoxBody};

pub type BytesBody = BoxBody<Bytes, Infallible>;

pub fn full(data: impl Into<Bytes>) -> BytesBody {
    BoxBody::new(Full::new(data.into()))
}

pub fn empty() -> BytesBody {
    BoxBody::new(Empty::new())
}
