//! Direct-call measurer: one upstream GET from server context, timed end to end.

use crate::error::MeasureError;
use crate::logging::*;
use crate::measurement::DirectResult;
use crate::server::{json_response, missing_url_response, MeasureContext};
use crate::timing::DirectTimings;
use crate::upstream::{direct_headers, parse_target, read_json, target_url, HttpClient};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde_json::Value;

pub async fn direct_test(
    req: Request<Body>,
    ctx: &MeasureContext,
) -> anyhow::Result<Response<Body>> {
    let target = match target_url(req.uri()) {
        Some(target) => target,
        None => return missing_url_response(),
    };

    let region = ctx.region.region_label();
    let received = ctx.clock.now_ms();
    let outcome = call_target(&ctx.client, &target).await;
    let timings = DirectTimings::new(received, ctx.clock.now_ms());

    if let Err(defect) = timings.validate() {
        log_timing_defect("direct-test", &defect.to_string());
        return json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &DirectResult::failure(defect, timings, region),
        );
    }

    match outcome {
        Ok((status, data)) => {
            log_direct_measured(&target, status.as_u16(), timings.response_time);
            json_response(status, &DirectResult::success(timings, region, data))
        }
        Err(e) => {
            log_direct_failed(&target, &e.to_string(), timings.response_time);
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &DirectResult::failure(e, timings, region),
            )
        }
    }
}

async fn call_target(
    client: &HttpClient,
    target: &str,
) -> Result<(StatusCode, Value), MeasureError> {
    let uri = parse_target(target)?;
    let mut request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .map_err(|e| MeasureError::invalid_target(target, e))?;
    *request.headers_mut() = direct_headers();

    let response = client.request(request).await?;
    read_json(response).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_support::*;
    use crate::timing::test_support::ScriptedClock;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request_for(target: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("/direct-test?url={}", encode(target)))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_direct_success_passes_data_and_times_call() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .and(header("user-agent", "edge-latency-probe-direct"))
            .and(header("accept", "*/*"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"x": 1}))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&upstream)
            .await;

        let target = format!("{}/ok", upstream.uri());
        let before = chrono::Utc::now().timestamp_millis();
        let response = direct_test(request_for(&target), &context()).await.unwrap();
        let after = chrono::Utc::now().timestamp_millis();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], json!({"x": 1}));
        assert_eq!(body["region"], "test-region");

        let received = body["timings"]["requestReceived"].as_i64().unwrap();
        let response_time = body["timings"]["responseTime"].as_i64().unwrap();
        assert!(response_time >= 50, "responseTime was {response_time}");
        assert!(response_time < 5_000);
        assert!(received + response_time <= after + 1);
        assert!(received >= before - 1);
    }

    #[tokio::test]
    async fn test_direct_passes_through_upstream_status() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "gone"})))
            .mount(&upstream)
            .await;

        let response = direct_test(request_for(&upstream.uri()), &context())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["error"], "gone");
    }

    #[tokio::test]
    async fn test_direct_unreachable_target_reports_failure_with_timing() {
        let response = direct_test(request_for(&closed_port_url()), &context())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
        assert!(body["timings"]["responseTime"].as_i64().unwrap() >= 0);
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn test_direct_non_json_reply_is_failure() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .mount(&upstream)
            .await;

        let response = direct_test(request_for(&upstream.uri()), &context())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON response"));
        assert!(body["timings"]["responseTime"].as_i64().unwrap() >= 0);
    }

    #[tokio::test]
    async fn test_direct_invalid_target_is_failure_not_client_error() {
        let response = direct_test(request_for("not-a-url"), &context())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("not-a-url"));
        assert!(body["timings"]["responseTime"].is_i64());
    }

    #[tokio::test]
    async fn test_direct_surfaces_backwards_clock() {
        let ctx = context_with_clock(Arc::new(ScriptedClock::new(&[5_000, 4_990])));
        let response = direct_test(request_for("not-a-url"), &ctx).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("Negative duration"));
        assert_eq!(body["timings"]["responseTime"], -10);
    }
}
