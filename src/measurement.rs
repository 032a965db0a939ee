use crate::timing::{DirectTimings, ProxyTimings};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response envelope shared by both measurers.
///
/// Successful responses carry the upstream payload in `data`; failures carry
/// `error` instead. `timings` is present either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timings: T,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl<T> MeasurementResult<T> {
    pub fn success(timings: T, region: String, data: Value) -> Self {
        Self {
            success: true,
            error: None,
            timings,
            region,
            data: Some(data),
        }
    }

    pub fn failure<E: ToString>(error: E, timings: T, region: String) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            timings,
            region,
            data: None,
        }
    }
}

pub type DirectResult = MeasurementResult<DirectTimings>;
pub type ProxyResult = MeasurementResult<ProxyTimings>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let result = DirectResult::success(
            DirectTimings::new(100, 150),
            "fra1".to_string(),
            json!({"x": 1}),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "timings": {"requestReceived": 100, "responseTime": 50},
                "region": "fra1",
                "data": {"x": 1}
            })
        );
    }

    #[test]
    fn test_failure_shape_has_error_and_no_data() {
        let result = DirectResult::failure(
            "connection refused",
            DirectTimings::new(100, 103),
            "unknown".to_string(),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "connection refused");
        assert_eq!(value["timings"]["responseTime"], 3);
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_parses_failure_without_data() {
        let raw = r#"{"success":false,"error":"boom","timings":{"requestReceived":1,"responseTime":2},"region":"x"}"#;
        let parsed: DirectResult = serde_json::from_str(raw).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error.as_deref(), Some("boom"));
        assert!(parsed.data.is_none());
    }
}
