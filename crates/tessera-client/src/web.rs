use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use serde_json::json;
use tessera_core::arguments::JobArguments;
use tessera_core::error::AppError;
use tessera_core::traits::{Backend, BackendRequest, Page};
use url::Url;

use crate::cleaner::{HtmdCleaner, page_title};
use crate::http::HttpClient;

/// Fetches a single page and returns it as Markdown.
///
/// Requests resolving to private or reserved addresses are refused unless
/// [`allow_private_urls`](Self::allow_private_urls) was called.
#[derive(Clone)]
pub struct WebBackend {
    http: HttpClient,
    cleaner: HtmdCleaner,
    ssrf_protection: bool,
}

impl WebBackend {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            http: HttpClient::new(timeout)?,
            cleaner: HtmdCleaner::new(),
            ssrf_protection: true,
        })
    }

    /// For local CLI use, where the operator owns the network.
    pub fn allow_private_urls(mut self) -> Self {
        self.ssrf_protection = false;
        self
    }
}

impl Backend for WebBackend {
    async fn call(&self, request: BackendRequest<'_>) -> Result<Page, AppError> {
        let JobArguments::Web(args) = request.arguments else {
            return Err(AppError::Generic("web backend received non-web arguments".into()));
        };

        if self.ssrf_protection {
            check_destination(&args.url).await?;
        }

        let response = self.http.send(self.http.inner().get(args.url.as_str())).await?;
        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;

        let markdown = self.cleaner.to_markdown(&html)?;
        tracing::debug!(url = %final_url, bytes = html.len(), "Page fetched");

        Ok(Page::last(vec![json!({
            "url": final_url,
            "title": page_title(&html),
            "markdown": markdown,
        })]))
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Refuse hosts that are, or resolve to, private/reserved addresses.
async fn check_destination(url: &Url) -> Result<(), AppError> {
    let host = url
        .host_str()
        .ok_or_else(|| AppError::HttpError("URL has no host".to_string()))?;
    let blocked = |ip: IpAddr| {
        AppError::HttpError(format!("SSRF blocked: {host} resolves to private/reserved IP {ip}"))
    };

    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return if is_reserved(ip) { Err(blocked(ip)) } else { Ok(()) };
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let addrs: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| AppError::NetworkError(format!("DNS resolution failed for {host}: {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err(AppError::NetworkError(format!(
            "DNS resolution returned no addresses for {host}"
        )));
    }
    match addrs.iter().map(|a| a.ip()).find(|ip| is_reserved(*ip)) {
        Some(ip) => Err(blocked(ip)),
        None => Ok(()),
    }
}

fn is_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_reserved_v4(v4),
        IpAddr::V6(v6) => is_reserved_v6(v6),
    }
}

fn is_reserved_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xC0) == 64)
}

fn is_reserved_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xFFC0) == 0xFE80
        || (first & 0xFE00) == 0xFC00
        || ip.to_ipv4_mapped().is_some_and(is_reserved_v4)
}
