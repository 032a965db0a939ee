use crate::config::LoggingConfig;
use std::net::SocketAddr;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Log categories for better visual distinction
pub mod log_cat {
    pub const DIRECT: &str = "📡";
    pub const PROXY: &str = "🔄";
    pub const RUN: &str = "🧪";
    pub const SERVER: &str = "🚀";
    pub const CONFIG: &str = "⚙️";
    pub const ERROR: &str = "❌";
    pub const SUCCESS: &str = "✅";
}

/// Install the console subscriber on stderr, keeping stdout for reports.
/// `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Direct-call measurer logs
pub fn log_direct_measured(target: &str, status: u16, response_time: i64) {
    info!(
        "{} {} Direct call: {} → {} ({}ms)",
        log_cat::DIRECT,
        log_cat::SUCCESS,
        target,
        status,
        response_time
    );
}

pub fn log_direct_failed(target: &str, error: &str, response_time: i64) {
    warn!(
        "{} {} Direct call failed: {} - {} (after {}ms)",
        log_cat::DIRECT,
        log_cat::ERROR,
        target,
        error,
        response_time
    );
}

/// Proxy measurer logs
pub fn log_proxy_measured(method: &str, target: &str, status: u16, total: i64, backend: i64) {
    info!(
        "{} {} {} → {} ({}ms total, {}ms backend)",
        log_cat::PROXY,
        method,
        target,
        status,
        total,
        backend
    );
}

pub fn log_proxy_failed(method: &str, target: &str, error: &str) {
    warn!(
        "{} {} {} {} failed: {}",
        log_cat::PROXY,
        log_cat::ERROR,
        method,
        target,
        error
    );
}

pub fn log_timing_defect(context: &str, error: &str) {
    error!(
        "{} Timing defect in {}: {}",
        log_cat::ERROR,
        context,
        error
    );
}

/// Orchestrator logs
pub fn log_run_started(target: &str, iterations: u32, measurer: &str) {
    info!(
        "{} Run started: {} iterations against {} (measurers at {})",
        log_cat::RUN,
        iterations,
        target,
        measurer
    );
}

pub fn log_iteration(
    iteration: u32,
    total: u32,
    proxy: Option<f64>,
    direct: Option<f64>,
    client: f64,
) {
    info!(
        "{} Iteration {}/{}: proxy {} | direct {} | client-only {:.0}ms",
        log_cat::RUN,
        iteration,
        total,
        proxy.map_or_else(|| "failed".to_string(), |ms| format!("{ms:.0}ms")),
        direct.map_or_else(|| "failed".to_string(), |ms| format!("{ms:.0}ms")),
        client
    );
}

pub fn log_run_state(state: &str) {
    debug!("{} Orchestrator state: {}", log_cat::RUN, state);
}

pub fn log_subcall_failed(path: &str, iteration: u32, error: &str) {
    warn!(
        "{} {} {} call failed in iteration {}: {}",
        log_cat::RUN,
        log_cat::ERROR,
        path,
        iteration,
        error
    );
}

pub fn log_run_completed(samples: usize, overhead: Option<f64>) {
    match overhead {
        Some(ms) => info!(
            "{} {} Run complete: {} samples, added overhead ~{:.0}ms",
            log_cat::RUN,
            log_cat::SUCCESS,
            samples,
            ms
        ),
        None => info!(
            "{} {} Run complete: {} samples, overhead undefined",
            log_cat::RUN,
            log_cat::SUCCESS,
            samples
        ),
    }
}

/// Server related logs
pub fn log_server_start(addr: SocketAddr) {
    info!("{} ══════════════════════════════════", log_cat::SERVER);
    info!("{} 🎯 Edge Latency Probe", log_cat::SERVER);
    info!("{} ⚡ Server: http://{}", log_cat::SERVER, addr);
    info!(
        "{} 📡 Direct: http://{}/direct-test?url=<target>",
        log_cat::SERVER,
        addr
    );
    info!(
        "{} 🔄 Proxy:  http://{}/proxy-test?url=<target>",
        log_cat::SERVER,
        addr
    );
    info!("{} ══════════════════════════════════", log_cat::SERVER);
}

pub fn log_server_error(error: &str) {
    error!(
        "{} {} Server error: {}",
        log_cat::SERVER,
        log_cat::ERROR,
        error
    );
}

/// Configuration related logs
pub fn log_config_loaded(source: &str) {
    info!("{} Configuration loaded from {}", log_cat::CONFIG, source);
}

pub fn log_config_error(error: &str) {
    error!(
        "{} {} Configuration error: {}",
        log_cat::CONFIG,
        log_cat::ERROR,
        error
    );
}
