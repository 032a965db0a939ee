use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The three request paths being compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestPath {
    /// Edge server → backend, timed by the direct-call measurer
    Direct,
    /// Client → edge → backend through the proxy measurer
    Proxy,
    /// Client → backend with no edge hop
    ClientOnly,
}

impl fmt::Display for TestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestPath::Direct => write!(f, "direct"),
            TestPath::Proxy => write!(f, "proxy"),
            TestPath::ClientOnly => write!(f, "clientOnly"),
        }
    }
}

/// Per-iteration quantities recorded for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    /// Wall-clock time observed by the orchestrator for the whole call
    RoundTrip,
    /// `totalProxyTime` as reported by the proxy measurer
    TotalProxyTime,
    /// Upstream latency as seen from the edge
    BackendTime,
    /// Time spent in the edge outside the upstream call
    EdgeProcessing,
    ReceiptToDispatch,
    ResponseToSend,
}

/// Arithmetic mean; `None` for an empty sample set
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Samples recorded for one path during a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathStats {
    /// Iterations whose sub-call for this path succeeded
    pub samples: usize,
    pub metrics: BTreeMap<Metric, Vec<f64>>,
    /// Region label from the first sample that carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Accumulates per-iteration durations for every path across a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateStats {
    paths: BTreeMap<TestPath, PathStats>,
}

impl AggregateStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful sub-call: every metric it produced plus its region
    pub fn record(&mut self, path: TestPath, metrics: &[(Metric, f64)], region: Option<&str>) {
        let stats = self.paths.entry(path).or_default();
        stats.samples += 1;
        for &(metric, value) in metrics {
            stats.metrics.entry(metric).or_default().push(value);
        }
        if stats.region.is_none() {
            stats.region = region.map(str::to_string);
        }
    }

    #[cfg(test)]
    pub fn samples(&self, path: TestPath, metric: Metric) -> &[f64] {
        self.paths
            .get(&path)
            .and_then(|stats| stats.metrics.get(&metric))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn sample_count(&self, path: TestPath) -> usize {
        self.paths.get(&path).map_or(0, |stats| stats.samples)
    }

    pub fn total_samples(&self) -> usize {
        self.paths.values().map(|stats| stats.samples).sum()
    }

    pub fn region(&self, path: TestPath) -> Option<&str> {
        self.paths.get(&path).and_then(|stats| stats.region.as_deref())
    }

    pub fn summary(&self, path: TestPath) -> PathSummary {
        let means = self
            .paths
            .get(&path)
            .map(|stats| {
                stats
                    .metrics
                    .iter()
                    .filter_map(|(metric, values)| mean(values).map(|m| (*metric, m)))
                    .collect()
            })
            .unwrap_or_default();

        PathSummary {
            path,
            samples: self.sample_count(path),
            means,
            region: self.region(path).map(str::to_string),
        }
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }
}

/// Means for one path; metrics with no samples are absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSummary {
    pub path: TestPath,
    pub samples: usize,
    pub means: BTreeMap<Metric, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl PathSummary {
    pub fn mean(&self, metric: Metric) -> Option<f64> {
        self.means.get(&metric).copied()
    }
}

/// Comparison figures derived from the three path summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    pub client_only_ms: Option<f64>,
    pub proxied_ms: Option<f64>,
    pub edge_to_backend_ms: Option<f64>,
    /// Proxied round trip minus client-only round trip
    pub added_overhead_ms: Option<f64>,
    pub overhead_percent: Option<f64>,
    /// Overhead multiplied by `assumed_calls`; illustrative only
    pub projected_impact_ms: Option<f64>,
    pub assumed_calls: u32,
}

/// Derive the comparison figures. Anything computed from an undefined mean is
/// itself undefined.
pub fn derive_metrics(
    proxy: &PathSummary,
    direct: &PathSummary,
    client_only: &PathSummary,
    assumed_calls: u32,
) -> DerivedMetrics {
    let proxied = proxy.mean(Metric::RoundTrip);
    let client = client_only.mean(Metric::RoundTrip);
    let overhead = proxied.zip(client).map(|(p, c)| p - c);
    let percent = overhead
        .zip(client)
        .filter(|(_, c)| *c > 0.0)
        .map(|(o, c)| o / c * 100.0);

    DerivedMetrics {
        client_only_ms: client,
        proxied_ms: proxied,
        edge_to_backend_ms: direct.mean(Metric::BackendTime),
        added_overhead_ms: overhead,
        overhead_percent: percent,
        projected_impact_ms: overhead.map(|o| o * f64::from(assumed_calls)),
        assumed_calls,
    }
}
