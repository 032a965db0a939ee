use crate::orchestrator::RunReport;
use crate::stats::Metric;
use std::fmt::Write;

/// How to read the three figures
pub const INTERPRETATION: &str = "Client only is today's latency with no edge hop. \
Proxied is what callers see through the edge proxy. \
Edge → backend is the raw server-to-API time.";

/// What to do with the added overhead
pub const RECOMMENDATION: &str = "If the added latency is acceptable, proxy through the edge. \
If not, keep only auth routes proxied and call the backend directly with tokens.";

/// `~123ms`, or `n/a` when every sample for the metric failed
pub fn format_ms(value: Option<f64>) -> String {
    match value {
        Some(ms) => format!("~{}ms", ms.round() as i64),
        None => "n/a".to_string(),
    }
}

/// Signed variant for overhead figures
pub fn format_delta_ms(value: Option<f64>) -> String {
    match value {
        Some(ms) => format!("{:+}ms", ms.round() as i64),
        None => "n/a".to_string(),
    }
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(pct) => format!("{:+.0}%", pct),
        None => "n/a".to_string(),
    }
}

/// Plain-text comparison of one run
pub fn render_report(report: &RunReport) -> String {
    let derived = &report.derived;
    let mut out = String::new();

    let _ = writeln!(out, "══════════════════════════════════");
    let _ = writeln!(out, "🧪 Latency comparison for {}", report.target_url);
    let _ = writeln!(
        out,
        "   {} iterations via {} (region: {})",
        report.iterations,
        report.measurer_url,
        report.region.as_deref().unwrap_or("unknown")
    );
    let _ = writeln!(out, "══════════════════════════════════");

    let _ = writeln!(
        out,
        "🟢 Client only      {:>10}  ({} samples)",
        format_ms(derived.client_only_ms),
        report.client_only.samples
    );
    let _ = writeln!(
        out,
        "🟠 Through proxy    {:>10}  ({} samples)",
        format_ms(derived.proxied_ms),
        report.proxy.samples
    );
    let _ = writeln!(
        out,
        "     edge total      {:>10}",
        format_ms(report.proxy.mean(Metric::TotalProxyTime))
    );
    let _ = writeln!(
        out,
        "     receipt→fetch   {:>10}",
        format_ms(report.proxy.mean(Metric::ReceiptToDispatch))
    );
    let _ = writeln!(
        out,
        "     edge→backend    {:>10}",
        format_ms(report.proxy.mean(Metric::BackendTime))
    );
    let _ = writeln!(
        out,
        "     backend→send    {:>10}",
        format_ms(report.proxy.mean(Metric::ResponseToSend))
    );
    let _ = writeln!(
        out,
        "🔵 Edge → backend   {:>10}  ({} samples)",
        format_ms(derived.edge_to_backend_ms),
        report.direct.samples
    );

    let _ = writeln!(out, "──────────────────────────────────");
    let _ = writeln!(
        out,
        "Added overhead:     {} ({})",
        format_delta_ms(derived.added_overhead_ms),
        format_percent(derived.overhead_percent)
    );
    let _ = writeln!(
        out,
        "⚠️  Impact: {} proxied calls per page ≈ {} extra",
        derived.assumed_calls,
        format_delta_ms(derived.projected_impact_ms)
    );
    let _ = writeln!(out, "──────────────────────────────────");
    let _ = writeln!(out, "{INTERPRETATION}");
    let _ = writeln!(out, "💡 {RECOMMENDATION}");

    out
}
