use crate::error::MeasureError;
use crate::logging::*;
use crate::measurement::ProxyResult;
use crate::server::{json_response, missing_url_response, MeasureContext};
use crate::timing::{Clock, ProxyStopwatch};
use crate::upstream::{forwarded_headers, parse_target, read_json, target_url};
use hyper::http::request::Parts;
use hyper::{Body, Request, Response, StatusCode};
use serde_json::Value;

/// Forward the caller's request to the target and report where the time went.
///
/// Checkpoints: `received` on entry, `dispatchStart` right before the upstream
/// call, `responseReceived` once upstream headers arrive, `sent` after the body
/// is decoded. The inbound method and body are forwarded unchanged; headers
/// go through [`forwarded_headers`].
pub async fn proxy_test(
    req: Request<Body>,
    ctx: &MeasureContext,
) -> anyhow::Result<Response<Body>> {
    let target = match target_url(req.uri()) {
        Some(target) => target,
        None => return missing_url_response(),
    };

    let region = ctx.region.region_label();
    let clock = ctx.clock.as_ref();
    let mut watch = ProxyStopwatch::start(clock);

    let (parts, body) = req.into_parts();
    let method = parts.method.to_string();
    let outcome = forward(ctx, &target, parts, body, &mut watch).await;

    match outcome {
        Ok((status, data)) => match watch.finish_success(clock) {
            Ok(timings) => {
                log_proxy_measured(
                    &method,
                    &target,
                    status.as_u16(),
                    timings.total_proxy_time,
                    timings.backend_time.unwrap_or_default(),
                );
                json_response(status, &ProxyResult::success(timings, region, data))
            }
            Err(defect) => {
                log_timing_defect("proxy-test", &defect.to_string());
                failure_response(defect, watch, clock, region)
            }
        },
        Err(e) => {
            log_proxy_failed(&method, &target, &e.to_string());
            failure_response(e, watch, clock, region)
        }
    }
}

/// 500 with receipt, send and total. A negative total replaces the original error.
fn failure_response(
    error: MeasureError,
    watch: ProxyStopwatch,
    clock: &dyn Clock,
    region: String,
) -> anyhow::Result<Response<Body>> {
    let timings = watch.finish_failure(clock);
    let error = match timings.validate() {
        Ok(()) => error,
        Err(defect) => {
            log_timing_defect("proxy-test", &defect.to_string());
            defect
        }
    };

    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &ProxyResult::failure(error, timings, region),
    )
}

async fn forward(
    ctx: &MeasureContext,
    target: &str,
    parts: Parts,
    body: Body,
    watch: &mut ProxyStopwatch,
) -> Result<(StatusCode, Value), MeasureError> {
    let uri = parse_target(target)?;
    let payload = hyper::body::to_bytes(body).await?;

    let mut request = Request::builder()
        .method(parts.method)
        .uri(uri)
        .body(Body::from(payload))
        .map_err(|e| MeasureError::invalid_target(target, e))?;
    *request.headers_mut() = forwarded_headers(&parts.headers);

    watch.mark_dispatch(ctx.clock.as_ref());
    let response = ctx.client.request(request).await?;
    watch.mark_response(ctx.clock.as_ref());

    read_json(response).await
}
