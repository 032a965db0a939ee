use crate::error::MeasureError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Milliseconds since the Unix epoch (checkpoints) or between two checkpoints (durations)
pub type Millis = i64;

/// Source of checkpoint timestamps.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Millis;
}

/// Wall-clock anchored once, then advanced by a monotonic `Instant`.
///
/// Checkpoints taken from the same clock never go backwards, even if the
/// system time is adjusted while a request is in flight.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    anchor_ms: Millis,
    anchor: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            anchor_ms: Utc::now().timestamp_millis(),
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> Millis {
        self.anchor_ms + self.anchor.elapsed().as_millis() as Millis
    }
}

/// `to - from`, rejecting negative results instead of clamping them.
pub fn duration_between(
    name: &'static str,
    from: Millis,
    to: Millis,
) -> Result<Millis, MeasureError> {
    let value = to - from;
    if value < 0 {
        return Err(MeasureError::NegativeDuration { name, value });
    }
    Ok(value)
}

/// Timings reported by the direct-call measurer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectTimings {
    pub request_received: Millis,
    pub response_time: Millis,
}

impl DirectTimings {
    /// Raw record; `response_time` may be negative if the clock misbehaved.
    pub fn new(request_received: Millis, finished: Millis) -> Self {
        Self {
            request_received,
            response_time: finished - request_received,
        }
    }

    pub fn validate(&self) -> Result<(), MeasureError> {
        duration_between("responseTime", 0, self.response_time).map(|_| ())
    }
}

/// Three-way split of the proxy total; always sums to `totalProxyTime`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyBreakdown {
    pub receipt_to_dispatch: Millis,
    pub backend_time: Millis,
    pub response_to_send: Millis,
}

impl ProxyBreakdown {
    pub fn sum(&self) -> Millis {
        self.receipt_to_dispatch + self.backend_time + self.response_to_send
    }
}

/// Timings reported by the proxy measurer.
///
/// On failure the backend fields stay `None`: `response_received` and
/// `backend_time` serialize as `null`, the processing time and breakdown are
/// left out entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyTimings {
    pub received: Millis,
    pub dispatch_start: Option<Millis>,
    pub response_received: Option<Millis>,
    pub sent: Millis,
    pub total_proxy_time: Millis,
    pub backend_time: Option<Millis>,
    #[serde(
        rename = "vercelProcessingTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub edge_processing_time: Option<Millis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ProxyBreakdown>,
}

impl ProxyTimings {
    /// Checks the one duration every record carries, success or failure
    pub fn validate(&self) -> Result<(), MeasureError> {
        duration_between("totalProxyTime", self.received, self.sent).map(|_| ())
    }
}

/// Collects the four proxy checkpoints as the request moves through the handler.
#[derive(Debug, Clone, Copy)]
pub struct ProxyStopwatch {
    received: Millis,
    dispatch_start: Option<Millis>,
    response_received: Option<Millis>,
}

impl ProxyStopwatch {
    pub fn start(clock: &dyn Clock) -> Self {
        Self {
            received: clock.now_ms(),
            dispatch_start: None,
            response_received: None,
        }
    }

    pub fn mark_dispatch(&mut self, clock: &dyn Clock) {
        self.dispatch_start = Some(clock.now_ms());
    }

    pub fn mark_response(&mut self, clock: &dyn Clock) {
        self.response_received = Some(clock.now_ms());
    }

    /// Finalize a successful exchange. Every derived duration is checked.
    pub fn finish_success(self, clock: &dyn Clock) -> Result<ProxyTimings, MeasureError> {
        let sent = clock.now_ms();
        let (dispatch_start, response_received) =
            match (self.dispatch_start, self.response_received) {
                (Some(dispatch), Some(response)) => (dispatch, response),
                _ => {
                    let timings = self.finish_failure_at(sent);
                    timings.validate()?;
                    return Ok(timings);
                }
            };

        let total = duration_between("totalProxyTime", self.received, sent)?;
        let breakdown = ProxyBreakdown {
            receipt_to_dispatch: duration_between(
                "receiptToDispatch",
                self.received,
                dispatch_start,
            )?,
            backend_time: duration_between("backendTime", dispatch_start, response_received)?,
            response_to_send: duration_between("responseToSend", response_received, sent)?,
        };
        debug_assert_eq!(breakdown.sum(), total);

        Ok(ProxyTimings {
            received: self.received,
            dispatch_start: Some(dispatch_start),
            response_received: Some(response_received),
            sent,
            total_proxy_time: total,
            backend_time: Some(breakdown.backend_time),
            edge_processing_time: Some(total - breakdown.backend_time),
            breakdown: Some(breakdown),
        })
    }

    /// Finalize a failed exchange: receipt, send and total only. The total is
    /// left raw; callers run [`ProxyTimings::validate`] before reporting it.
    pub fn finish_failure(self, clock: &dyn Clock) -> ProxyTimings {
        let sent = clock.now_ms();
        self.finish_failure_at(sent)
    }

    fn finish_failure_at(self, sent: Millis) -> ProxyTimings {
        ProxyTimings {
            received: self.received,
            dispatch_start: self.dispatch_start,
            response_received: None,
            sent,
            total_proxy_time: sent - self.received,
            backend_time: None,
            edge_processing_time: None,
            breakdown: None,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::ScriptedClock;
    use super::*;

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let first = clock.now_ms();
        let second = clock.now_ms();
        assert!(second >= first);
        assert!(first > 1_600_000_000_000, "expected epoch milliseconds");
    }

    #[test]
    fn test_duration_between_rejects_negative() {
        assert_eq!(duration_between("x", 10, 25).unwrap(), 15);
        let err = duration_between("backendTime", 30, 20).unwrap_err();
        assert!(matches!(
            err,
            MeasureError::NegativeDuration {
                name: "backendTime",
                value: -10
            }
        ));
    }

    #[test]
    fn test_direct_timings_validate() {
        let ok = DirectTimings::new(1_000, 1_050);
        assert_eq!(ok.response_time, 50);
        assert!(ok.validate().is_ok());

        let skewed = DirectTimings::new(1_000, 990);
        assert_eq!(skewed.response_time, -10);
        assert!(skewed.validate().is_err());
    }

    #[test]
    fn test_proxy_breakdown_sums_to_total() {
        let clock = ScriptedClock::new(&[1_000, 1_003, 1_047, 1_052]);
        let mut watch = ProxyStopwatch::start(&clock);
        watch.mark_dispatch(&clock);
        watch.mark_response(&clock);
        let timings = watch.finish_success(&clock).unwrap();

        let breakdown = timings.breakdown.unwrap();
        assert_eq!(timings.total_proxy_time, 52);
        assert_eq!(breakdown.receipt_to_dispatch, 3);
        assert_eq!(breakdown.backend_time, 44);
        assert_eq!(breakdown.response_to_send, 5);
        assert_eq!(breakdown.sum(), timings.total_proxy_time);
        assert_eq!(timings.edge_processing_time, Some(8));
    }

    #[test]
    fn test_proxy_success_surfaces_clock_defect() {
        let clock = ScriptedClock::new(&[1_000, 1_010, 1_005, 1_020]);
        let mut watch = ProxyStopwatch::start(&clock);
        watch.mark_dispatch(&clock);
        watch.mark_response(&clock);
        let err = watch.finish_success(&clock).unwrap_err();
        assert!(matches!(
            err,
            MeasureError::NegativeDuration {
                name: "backendTime",
                ..
            }
        ));
    }

    #[test]
    fn test_proxy_failure_serializes_without_backend_fields() {
        let clock = ScriptedClock::new(&[2_000, 2_001, 2_030]);
        let mut watch = ProxyStopwatch::start(&clock);
        watch.mark_dispatch(&clock);
        let timings = watch.finish_failure(&clock);
        assert_eq!(timings.total_proxy_time, 30);

        let json = serde_json::to_value(&timings).unwrap();
        assert_eq!(json["received"], 2_000);
        assert_eq!(json["dispatchStart"], 2_001);
        assert!(json["responseReceived"].is_null());
        assert!(json["backendTime"].is_null());
        assert!(json.get("vercelProcessingTime").is_none());
        assert!(json.get("breakdown").is_none());
    }

    #[test]
    fn test_proxy_failure_total_validated() {
        let clock = ScriptedClock::new(&[1_000, 990, 980]);
        let mut watch = ProxyStopwatch::start(&clock);
        watch.mark_dispatch(&clock);
        let timings = watch.finish_failure(&clock);
        assert_eq!(timings.total_proxy_time, -20);
        assert!(matches!(
            timings.validate(),
            Err(MeasureError::NegativeDuration {
                name: "totalProxyTime",
                value: -20
            })
        ));
    }

    #[test]
    fn test_proxy_timings_wire_names() {
        let clock = ScriptedClock::new(&[0, 1, 2, 3]);
        let mut watch = ProxyStopwatch::start(&clock);
        watch.mark_dispatch(&clock);
        watch.mark_response(&clock);
        let json = serde_json::to_value(watch.finish_success(&clock).unwrap()).unwrap();
        assert_eq!(json["vercelProcessingTime"], 2);
        assert_eq!(json["breakdown"]["receiptToDispatch"], 1);
        assert_eq!(json["breakdown"]["responseToSend"], 1);

        let back: ProxyTimings = serde_json::from_value(json).unwrap();
        assert_eq!(back.edge_processing_time, Some(2));
    }
}
