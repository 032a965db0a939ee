use crate::orchestrator::RunReport;
use crate::stats::TestPath;
use serde::{Deserialize, Serialize};

/// Lifecycle of the test orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RunState {
    /// Nothing has run yet
    #[default]
    Idle,
    /// A run is in progress; `iteration` is 1-based, 0 before the first one starts
    Running { iteration: u32, total: u32 },
    /// The last run finished (possibly with failed sub-calls)
    Complete,
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running { .. })
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "IDLE"),
            RunState::Running { iteration, total } => write!(f, "RUNNING {iteration}/{total}"),
            RunState::Complete => write!(f, "COMPLETE"),
        }
    }
}

/// What one iteration produced, per path. `None` means the sub-call failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationOutcome {
    pub iteration: u32,
    pub total: u32,
    pub proxy_ms: Option<f64>,
    pub direct_ms: Option<f64>,
    pub client_only_ms: f64,
    /// The client-only call rejected (expected for many targets; the timing still counts)
    pub client_only_rejected: bool,
}

/// Events emitted while measuring
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// In-process measurer server is listening
    ServerStarted { measurer_url: String },
    RunStarted { target_url: String, iterations: u32 },
    SubCallFailed {
        path: TestPath,
        iteration: u32,
        error: String,
    },
    IterationCompleted(IterationOutcome),
    RunCompleted(Box<RunReport>),
}
