use std::env;

use crate::uri::{FUri, Scheme};

/// Proxy URL applicable to `target`, per the process environment.
/// `HTTPS_PROXY`/`HTTP_PROXY` are consulted by target scheme, then
/// `ALL_PROXY`; `NO_PROXY` exclusions win over all of them.
pub fn proxy_for_url(target: &FUri) -> Option<FUri> {
    proxy_lookup(target.scheme(), target.host(), |name| {
        env::var(name).ok()
    })
}

pub fn proxy_lookup(
    scheme: Scheme,
    host: &str,
    get: impl Fn(&str) -> Option<String>,
) -> Option<FUri> {
    if excluded(host, &get) {
        return None;
    }
    let by_scheme: &[&str] = match scheme {
        Scheme::Https => &["HTTPS_PROXY", "https_proxy"],
        Scheme::Http => &["HTTP_PROXY", "http_proxy"],
    };
    let raw = by_scheme
        .iter()
        .chain(["ALL_PROXY", "all_proxy"].iter())
        .copied()
        .find_map(|name| get(name).filter(|v| !v.is_empty()))?;
    parse_proxy(&raw)
}

fn parse_proxy(raw: &str) -> Option<FUri> {
    if raw.contains("://") {
        raw.parse().ok()
    } else {
        format!("http://{raw}").parse().ok()
    }
}

fn excluded(host: &str, get: &impl Fn(&str) -> Option<String>) -> bool {
    let Some(list) = get("NO_PROXY").or_else(|| get("no_proxy")) else {
        return false;
    };
    no_proxy_matches(&list, host)
}

/// Entry matching: `*` excludes everything; otherwise an entry matches the
/// host itself and any subdomain of it (a leading dot is ignored).
fn no_proxy_matches(list: &str, host: &str) -> bool {
    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if entry == "*" {
            return true;
        }
        let entry = entry.strip_prefix('.').unwrap_or(entry);
        if host == entry {
            return true;
        }
        if host.len() > entry.len()
            && host.ends_with(entry)
            && host.as_bytes()[host.len() - entry.len() - 1] == b'.'
        {
            return true;
        }
    }
    false
}
