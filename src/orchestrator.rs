use crate::config::{clamp_iterations, OrchestratorConfig};
use crate::error::MeasureError;
use crate::events::{IterationOutcome, OrchestratorEvent, RunState};
use crate::logging::*;
use crate::measurement::{DirectResult, ProxyResult};
use crate::stats::{
    derive_metrics, AggregateStats, DerivedMetrics, Metric, PathSummary, TestPath,
};
use crate::timing::ProxyTimings;
use crate::upstream::{parse_target, read_json, HttpClient};
use chrono::{DateTime, Utc};
use hyper::Uri;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use url::Url;

/// Commands accepted by a running orchestrator task
#[derive(Debug, Clone)]
pub enum OrchestratorCommand {
    Run { target_url: String, iterations: u32 },
}

/// Everything one run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub target_url: String,
    pub measurer_url: String,
    pub iterations: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub proxy: PathSummary,
    pub direct: PathSummary,
    pub client_only: PathSummary,
    pub derived: DerivedMetrics,
    /// Serving region reported by the measurers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Raw per-iteration samples
    pub stats: AggregateStats,
}

struct ProxySample {
    round_trip_ms: f64,
    timings: ProxyTimings,
    region: String,
}

impl ProxySample {
    fn metrics(&self) -> Vec<(Metric, f64)> {
        let timings = &self.timings;
        let mut metrics = vec![
            (Metric::RoundTrip, self.round_trip_ms),
            (Metric::TotalProxyTime, timings.total_proxy_time as f64),
        ];
        if let Some(backend) = timings.backend_time {
            metrics.push((Metric::BackendTime, backend as f64));
        }
        if let Some(processing) = timings.edge_processing_time {
            metrics.push((Metric::EdgeProcessing, processing as f64));
        }
        if let Some(breakdown) = timings.breakdown {
            metrics.push((Metric::ReceiptToDispatch, breakdown.receipt_to_dispatch as f64));
            metrics.push((Metric::ResponseToSend, breakdown.response_to_send as f64));
        }
        metrics
    }
}

struct DirectSample {
    backend_ms: f64,
    region: String,
}

struct ClientOnlySample {
    round_trip_ms: f64,
    rejected: bool,
}

/// Drives repeated, strictly sequential measurement runs.
///
/// Each iteration calls the proxy measurer, then the direct-call measurer,
/// then the target itself with no edge hop. A failing sub-call is logged and
/// left out of the aggregate; the run always goes on to completion.
pub struct TestOrchestrator {
    client: HttpClient,
    measurer_base: Url,
    pause: Duration,
    assumed_calls: u32,
    state: RunState,
    stats: AggregateStats,
    event_sender: Option<mpsc::UnboundedSender<OrchestratorEvent>>,
}

impl TestOrchestrator {
    pub fn new(client: HttpClient, measurer_base: Url, config: &OrchestratorConfig) -> Self {
        Self {
            client,
            measurer_base: with_trailing_slash(measurer_base),
            pause: config.pause(),
            assumed_calls: config.assumed_calls,
            state: RunState::Idle,
            stats: AggregateStats::new(),
            event_sender: None,
        }
    }

    pub fn with_events(mut self, sender: mpsc::UnboundedSender<OrchestratorEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> RunState {
        self.state
    }

    #[cfg(test)]
    pub fn stats(&self) -> &AggregateStats {
        &self.stats
    }

    /// Process run commands until every sender is gone. Commands that arrive
    /// mid-run wait for the current run to finish.
    pub async fn run_commands(
        mut self,
        mut commands: mpsc::UnboundedReceiver<OrchestratorCommand>,
    ) {
        while let Some(command) = commands.recv().await {
            match command {
                OrchestratorCommand::Run {
                    target_url,
                    iterations,
                } => {
                    self.run(&target_url, iterations).await;
                }
            }
        }
    }

    /// Execute one full run. Results of the previous run are discarded first.
    pub async fn run(&mut self, target_url: &str, iterations: u32) -> RunReport {
        let total = clamp_iterations(iterations);
        self.stats.clear();
        self.set_state(RunState::Running {
            iteration: 0,
            total,
        });

        log_run_started(target_url, total, self.measurer_base.as_str());
        self.emit(OrchestratorEvent::RunStarted {
            target_url: target_url.to_string(),
            iterations: total,
        });

        let started_at = Utc::now();
        for iteration in 1..=total {
            self.set_state(RunState::Running { iteration, total });
            let outcome = self.run_iteration(target_url, iteration, total).await;

            log_iteration(
                iteration,
                total,
                outcome.proxy_ms,
                outcome.direct_ms,
                outcome.client_only_ms,
            );
            self.emit(OrchestratorEvent::IterationCompleted(outcome));

            if iteration < total && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        let report = self.build_report(target_url, total, started_at);
        self.set_state(RunState::Complete);

        log_run_completed(self.stats.total_samples(), report.derived.added_overhead_ms);
        self.emit(OrchestratorEvent::RunCompleted(Box::new(report.clone())));
        report
    }

    fn set_state(&mut self, state: RunState) {
        self.state = state;
        log_run_state(&self.state.to_string());
    }

    async fn run_iteration(
        &mut self,
        target_url: &str,
        iteration: u32,
        total: u32,
    ) -> IterationOutcome {
        let proxy_ms = match self.probe_proxy(target_url).await {
            Ok(sample) => {
                self.stats
                    .record(TestPath::Proxy, &sample.metrics(), Some(sample.region.as_str()));
                Some(sample.round_trip_ms)
            }
            Err(e) => {
                self.report_failure(TestPath::Proxy, iteration, &e);
                None
            }
        };

        let direct_ms = match self.probe_direct(target_url).await {
            Ok(sample) => {
                self.stats.record(
                    TestPath::Direct,
                    &[(Metric::BackendTime, sample.backend_ms)],
                    Some(sample.region.as_str()),
                );
                Some(sample.backend_ms)
            }
            Err(e) => {
                self.report_failure(TestPath::Direct, iteration, &e);
                None
            }
        };

        let client = self.probe_client_only(target_url).await;
        self.stats.record(
            TestPath::ClientOnly,
            &[(Metric::RoundTrip, client.round_trip_ms)],
            None,
        );

        IterationOutcome {
            iteration,
            total,
            proxy_ms,
            direct_ms,
            client_only_ms: client.round_trip_ms,
            client_only_rejected: client.rejected,
        }
    }

    async fn probe_proxy(&self, target_url: &str) -> Result<ProxySample, MeasureError> {
        let uri = self.measurer_uri("proxy-test", target_url)?;
        let started = Instant::now();
        let response = self.client.get(uri).await?;
        let round_trip_ms = elapsed_ms(started);

        let (_, body) = read_json(response).await?;
        let result: ProxyResult = serde_json::from_value(body)?;
        if !result.success {
            return Err(MeasureError::Reported(result.error.unwrap_or_default()));
        }

        Ok(ProxySample {
            round_trip_ms,
            timings: result.timings,
            region: result.region,
        })
    }

    async fn probe_direct(&self, target_url: &str) -> Result<DirectSample, MeasureError> {
        let uri = self.measurer_uri("direct-test", target_url)?;
        let response = self.client.get(uri).await?;

        let (_, body) = read_json(response).await?;
        let result: DirectResult = serde_json::from_value(body)?;
        if !result.success {
            return Err(MeasureError::Reported(result.error.unwrap_or_default()));
        }

        Ok(DirectSample {
            backend_ms: result.timings.response_time as f64,
            region: result.region,
        })
    }

    /// Uninstrumented call straight at the target. Sends no credentials and
    /// never reads the body; the elapsed time counts whether the call
    /// resolves or rejects.
    async fn probe_client_only(&self, target_url: &str) -> ClientOnlySample {
        let started = Instant::now();
        let outcome = match parse_target(target_url) {
            Ok(uri) => self.client.get(uri).await.map(drop).map_err(MeasureError::from),
            Err(e) => Err(e),
        };

        ClientOnlySample {
            round_trip_ms: elapsed_ms(started),
            rejected: outcome.is_err(),
        }
    }

    fn measurer_uri(&self, endpoint: &str, target_url: &str) -> Result<Uri, MeasureError> {
        let mut url = self
            .measurer_base
            .join(endpoint)
            .map_err(|e| MeasureError::invalid_target(self.measurer_base.as_str(), e))?;
        url.query_pairs_mut().append_pair("url", target_url);
        url.as_str()
            .parse::<Uri>()
            .map_err(|e| MeasureError::invalid_target(url.as_str(), e))
    }

    fn report_failure(&self, path: TestPath, iteration: u32, error: &MeasureError) {
        let message = error.to_string();
        log_subcall_failed(&path.to_string(), iteration, &message);
        self.emit(OrchestratorEvent::SubCallFailed {
            path,
            iteration,
            error: message,
        });
    }

    fn build_report(
        &self,
        target_url: &str,
        iterations: u32,
        started_at: DateTime<Utc>,
    ) -> RunReport {
        let proxy = self.stats.summary(TestPath::Proxy);
        let direct = self.stats.summary(TestPath::Direct);
        let client_only = self.stats.summary(TestPath::ClientOnly);
        let derived = derive_metrics(&proxy, &direct, &client_only, self.assumed_calls);
        let region = proxy.region.clone().or_else(|| direct.region.clone());

        RunReport {
            target_url: target_url.to_string(),
            measurer_url: self.measurer_base.to_string(),
            iterations,
            started_at,
            finished_at: Utc::now(),
            proxy,
            direct,
            client_only,
            derived,
            region,
            stats: self.stats.clone(),
        }
    }

    fn emit(&self, event: OrchestratorEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event);
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
