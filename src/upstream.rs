use crate::error::MeasureError;
use hyper::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE, USER_AGENT};
use hyper::{Body, Client, Response, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use serde_json::Value;
use url::Url;

pub type HttpClient = Client<HttpsConnector<hyper::client::HttpConnector>>;

/// User agent sent by the direct-call measurer
pub const DIRECT_USER_AGENT: &str = "edge-latency-probe-direct";
/// User agent the proxy measurer falls back to when the caller sent none
pub const PROXY_DEFAULT_USER_AGENT: &str = "edge-latency-probe-proxy";
const DEFAULT_ACCEPT: &str = "*/*";

pub fn build_client() -> HttpClient {
    let https = HttpsConnector::new();
    Client::builder()
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .pool_max_idle_per_host(4)
        .build::<_, Body>(https)
}

/// Extract the non-empty `url` query parameter
pub fn target_url(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.trim().is_empty())
}

/// Validate a user-supplied target and convert it for hyper
pub fn parse_target(target: &str) -> Result<Uri, MeasureError> {
    let parsed = Url::parse(target).map_err(|e| MeasureError::invalid_target(target, e))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(MeasureError::invalid_target(
                target,
                format!("unsupported scheme '{other}'"),
            ))
        }
    }
    parsed
        .as_str()
        .parse::<Uri>()
        .map_err(|e| MeasureError::invalid_target(target, e))
}

/// Headers the proxy measurer passes upstream.
///
/// Only `user-agent`, `accept` and (when present) `cookie` survive; hop-by-hop
/// and routing headers such as `host` or `connection` are never copied.
pub fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(
        USER_AGENT,
        inbound
            .get(USER_AGENT)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(PROXY_DEFAULT_USER_AGENT)),
    );
    headers.insert(
        ACCEPT,
        inbound
            .get(ACCEPT)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ACCEPT)),
    );
    for cookie in inbound.get_all(COOKIE) {
        headers.append(COOKIE, cookie.clone());
    }

    headers
}

/// Fixed headers for the direct-call measurer
pub fn direct_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DIRECT_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    headers
}

/// Drain an upstream response and decode it as JSON, keeping its status
pub async fn read_json(response: Response<Body>) -> Result<(StatusCode, Value), MeasureError> {
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await?;
    let data = serde_json::from_slice::<Value>(&bytes)?;
    Ok((status, data))
}
