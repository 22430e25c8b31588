use http::{
    Request, Response,
    header::{CONNECTION, SET_COOKIE},
    request::Parts,
};
use http_body_util::BodyExt;
use tracing::info;

use foxy_shared::body::{self, BytesBody};

use crate::MockServers;

pub async fn serve(
    request: Request<hyper::body::Incoming>,
    server: MockServers,
) -> http::Result<Response<BytesBody>> {
    let (parts, body) = request.into_parts();
    if let Err(e) = body.collect().await {
        return Response::builder()
            .status(500)
            .body(body::full(format!("Error receiving body {e}")));
    }

    info!("{server} {} {}", parts.method, parts.uri);
    let mut resp = serve_internal(&parts, server)?;

    if matches!(server, MockServers::H11Close) {
        resp.headers_mut()
            .insert(CONNECTION, http::HeaderValue::from_static("close"));
    }
    Ok(resp)
}

fn serve_internal(parts: &Parts, server: MockServers) -> http::Result<Response<BytesBody>> {
    match parts.uri.path() {
        "/" => handle_root(server),
        "/echo-target" => handle_echo_target(parts),
        "/cookies" => handle_cookie(server),
        _ => handle_not_found(),
    }
}

fn handle_root(server: MockServers) -> http::Result<Response<BytesBody>> {
    Response::builder().body(body::full(format!("Hello, {}", server.marker())))
}

/// Echoes the request target as received, so clients can assert
/// origin-form vs absolute-form serialization.
fn handle_echo_target(parts: &Parts) -> http::Result<Response<BytesBody>> {
    Response::builder().body(body::full(parts.uri.to_string()))
}

fn handle_cookie(server: MockServers) -> http::Result<Response<BytesBody>> {
    let value = http::HeaderValue::from_str(&format!("marker={}", server.marker()))?;
    Response::builder()
        .header(SET_COOKIE, value)
        .body(body::empty())
}

fn handle_not_found() -> http::Result<Response<BytesBody>> {
    Response::builder().status(404).body(body::empty())
}
