//! Destination URL formatting.

use std::net::{IpAddr, Ipv6Addr};

use crate::errors::WebhookError;
use crate::types::{RequestContext, WebhookRequest};

/// Build `http://<host>:<port><callbackUrl>` for a request.
///
/// The host is the request's explicit host or else the caller's address.
/// IPv6 hosts are bracketed and IPv4-mapped IPv6 addresses are unmapped.
pub fn destination_url(
    ctx: Option<&RequestContext>,
    req: &WebhookRequest,
) -> Result<String, WebhookError> {
    let port = req
        .port
        .ok_or_else(|| WebhookError::bad_request("port is required"))?;
    let callback = req
        .callback_url
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| WebhookError::bad_request("callbackUrl is required"))?;
    let ctx = ctx.ok_or_else(|| WebhookError::bad_request("request context is required"))?;

    let host = match req.host.as_deref().filter(|h| !h.is_empty()) {
        Some(host) => format_host(host),
        None => format_ip(ctx.remote_addr),
    };
    let separator = if callback.starts_with('/') { "" } else { "/" };
    let url = format!("http://{host}:{port}{separator}{callback}");

    let parsed = reqwest::Url::parse(&url)
        .map_err(|e| WebhookError::bad_request(format!("invalid callback URL {url}: {e}")))?;
    if parsed.host().is_none() {
        return Err(WebhookError::bad_request(format!("invalid callback URL {url}")));
    }
    Ok(url)
}

fn format_host(host: &str) -> String {
    match host.parse::<IpAddr>() {
        Ok(ip) => format_ip(ip),
        Err(_) => host.to_owned(),
    }
}

fn format_ip(ip: IpAddr) -> String {
    match ip.to_canonical() {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => bracket(v6),
    }
}

fn bracket(ip: Ipv6Addr) -> String {
    format!("[{ip}]")
}
