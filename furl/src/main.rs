#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
use std::error::Error;

use clap::{Parser, command};
use foxy_client::{HttpManager, Request};
use foxy_shared::{crypto::init_crypto, http::collect, uri::FUri};
use http::{
    HeaderValue, Method,
    header::{ACCEPT, USER_AGENT},
};
use once_cell::sync::OnceCell;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

pub static INIT_LOGGER: OnceCell<()> = OnceCell::new();

pub fn init_logging() {
    INIT_LOGGER.get_or_init(|| {
        tracing_subscriber::fmt()
            .without_time()
            .with_line_number(true)
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    });
}

static FURL_USER_AGENT: &str = "furl/0.1";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    uri: FUri,

    #[arg(short, long)]
    proxy: Option<FUri>,

    #[arg(short, long, default_value = "*/*")]
    accept: String,

    #[arg(short, long, default_value = "GET")]
    request: String,

    #[arg(short, long, default_value = None)]
    data: Option<String>,

    /// Prior-knowledge HTTP/2 for http:// targets.
    #[arg(long, default_value_t = false)]
    h2c: bool,

    /// Send the request this many times over one manager; reuses the
    /// connection where the server allows it.
    #[arg(long, default_value_t = 1)]
    repeat: u32,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging();
    init_crypto();

    let args = Args::try_parse();

    let args = match args {
        Ok(args) => args,
        Err(e) => {
            error!("Error parsing args {e}");
            return Err(Box::<dyn Error>::from(e));
        }
    };
    debug!("{args:?}");

    let method: Method = args.request.parse()?;
    let mut req = Request::new(method, args.uri.path_and_query())
        .header(ACCEPT, HeaderValue::from_str(&args.accept)?)
        .header(USER_AGENT, HeaderValue::from_static(FURL_USER_AGENT));
    if let Some(data) = args.data {
        req = req.body(data);
    }

    let mut builder = HttpManager::builder().use_h2c(args.h2c);
    if let Some(proxy) = args.proxy {
        builder = builder.proxy(proxy);
    }
    let mut mgr = builder.build();

    for round in 0..args.repeat.max(1) {
        let resp = mgr.fetch(&args.uri, &req).await?;
        let resp = collect(resp).await?;

        let status = resp.parts.status;
        let version = resp.parts.version;
        info!("[{round}] {status}, {version:?}");

        for (k, v) in resp.parts.headers.iter() {
            info!("H {k}: {v:?}");
        }

        let body = resp.body;
        info!("{body:?}");

        if let Some(trailers) = resp.trailers {
            info!("Trailers ....");
            for (k, v) in trailers {
                info!("{k:?}: {v:?}");
            }
        }
    }

    Ok(())
}
