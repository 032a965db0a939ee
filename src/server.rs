use crate::config::Config;
use crate::direct;
use crate::logging::*;
use crate::proxy;
use crate::region::{EnvRegion, RegionProvider};
use crate::timing::{Clock, MonotonicClock};
use crate::upstream::{build_client, HttpClient};
use hyper::header::CONTENT_TYPE;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use serde::Serialize;
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use tracing::error;

/// Everything a measurer needs besides the request itself.
///
/// Cloned per request; nothing in here is mutable, so concurrent requests
/// never observe each other.
#[derive(Clone)]
pub struct MeasureContext {
    pub client: HttpClient,
    pub clock: Arc<dyn Clock>,
    pub region: Arc<dyn RegionProvider>,
}

impl MeasureContext {
    pub fn new(
        client: HttpClient,
        clock: Arc<dyn Clock>,
        region: Arc<dyn RegionProvider>,
    ) -> Self {
        Self {
            client,
            clock,
            region,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            build_client(),
            Arc::new(MonotonicClock::new()),
            Arc::new(EnvRegion::new(
                config.region.env_var.clone(),
                config.region.fallback.clone(),
            )),
        )
    }
}

/// Bind the listening socket up front so address errors surface before serving
pub fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Serve both measurers until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    ctx: MeasureContext,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let addr = listener.local_addr()?;

    let make_svc = make_service_fn(move |_conn| {
        let ctx = ctx.clone();

        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                let ctx = ctx.clone();

                async move {
                    match handle_request(req, ctx).await {
                        Ok(response) => Ok::<Response<Body>, hyper::Error>(response),
                        Err(e) => {
                            error!("Request error: {}", e);
                            let mut response = Response::new(Body::from("Internal server error"));
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            Ok(response)
                        }
                    }
                }
            }))
        }
    });

    let server = Server::from_tcp(listener)?
        .serve(make_svc)
        .with_graceful_shutdown(shutdown);

    log_server_start(addr);

    if let Err(e) = server.await {
        log_server_error(&format!("{e}"));
        return Err(anyhow::anyhow!("Server error: {}", e));
    }

    Ok(())
}

pub async fn handle_request(
    req: Request<Body>,
    ctx: MeasureContext,
) -> anyhow::Result<Response<Body>> {
    match req.uri().path() {
        "/direct-test" => direct::direct_test(req, &ctx).await,
        "/proxy-test" => proxy::proxy_test(req, &ctx).await,
        "/health" => health_handler(),
        _ => json_response(
            StatusCode::NOT_FOUND,
            &serde_json::json!({ "error": "Not found" }),
        ),
    }
}

pub(crate) fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> anyhow::Result<Response<Body>> {
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

/// 400 for a request without a usable `url` parameter; no timing is attempted
pub(crate) fn missing_url_response() -> anyhow::Result<Response<Body>> {
    json_response(
        StatusCode::BAD_REQUEST,
        &serde_json::json!({ "error": crate::error::MeasureError::MissingUrl.to_string() }),
    )
}

fn health_handler() -> anyhow::Result<Response<Body>> {
    json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::region::FixedRegion;
    use serde_json::Value;

    pub fn context_with_clock(clock: Arc<dyn Clock>) -> MeasureContext {
        MeasureContext::new(
            build_client(),
            clock,
            Arc::new(FixedRegion("test-region".to_string())),
        )
    }

    pub fn context() -> MeasureContext {
        context_with_clock(Arc::new(MonotonicClock::new()))
    }

    pub async fn body_json(response: Response<Body>) -> Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// A local address nothing listens on
    pub fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}/unreachable")
    }

    pub fn encode(target: &str) -> String {
        url::form_urlencoded::byte_serialize(target.as_bytes()).collect()
    }
}
