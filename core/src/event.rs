//! Workflow events: the audit trail of a coordinator run.
//!
//! RULE: every stage transition and every per-risk decision is recorded
//! as an event and persisted to the event log before the run moves on.

use crate::{
    coordinator::WorkflowStage,
    response_strategy::Strategy,
    risk::{RiskCategory, RiskLevel},
    types::{ControlId, KriId, RiskId, RunId},
};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    // ── Run lifecycle ──────────────────────────────
    RunStarted {
        run_id: RunId,
        context: String,
    },
    StageEntered {
        stage: WorkflowStage,
    },
    RunCompleted {
        run_id: RunId,
        risks: usize,
        failures: usize,
    },

    // ── Data collection ────────────────────────────
    SignalsCollected {
        worker_id: String,
        signal_count: usize,
    },
    WorkerFailed {
        worker_id: String,
        reason: String,
    },

    // ── Per-risk decisions ─────────────────────────
    RiskIdentified {
        risk_id: RiskId,
        category: RiskCategory,
        description: String,
    },
    RiskAssessed {
        risk_id: RiskId,
        risk_level: Option<RiskLevel>,
        failures: usize,
    },
    RiskPrioritized {
        risk_id: RiskId,
        rank: usize,
    },
    StrategyAssigned {
        risk_id: RiskId,
        strategy: Strategy,
    },
    MonitoringRegistered {
        risk_id: RiskId,
        kris: Vec<KriId>,
        controls: Vec<ControlId>,
    },
}

impl WorkflowEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::StageEntered { .. } => "stage_entered",
            Self::RunCompleted { .. } => "run_completed",
            Self::SignalsCollected { .. } => "signals_collected",
            Self::WorkerFailed { .. } => "worker_failed",
            Self::RiskIdentified { .. } => "risk_identified",
            Self::RiskAssessed { .. } => "risk_assessed",
            Self::RiskPrioritized { .. } => "risk_prioritized",
            Self::StrategyAssigned { .. } => "strategy_assigned",
            Self::MonitoringRegistered { .. } => "monitoring_registered",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    /// Position of the event within its run, starting at 1.
    pub seq: u64,
    pub stage: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized WorkflowEvent
}
