//! Report payloads handed back to callers.
//!
//! `FinalReport` is the coordinator's output once the workflow completes.
//! `MonitoringReport` is the monitoring engine's read-only snapshot.
//! Field names here are the wire contract; rename nothing.

use crate::{
    alert::Alert,
    coordinator::WorkflowStage,
    monitoring_engine::SetupConfirmation,
    response_strategy::ResponseStrategy,
    risk::RiskRecord,
    types::{KriId, RunId, Timestamp},
};
use serde::{Deserialize, Serialize};

// ── Workflow ─────────────────────────────────────────────────────────────────

/// A partial failure the run absorbed instead of aborting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureNote {
    pub stage: WorkflowStage,
    /// Worker id, risk id or KRI/control id the failure is about.
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizedRisk {
    /// 1-based position in the prioritized list.
    pub rank: usize,
    pub record: RiskRecord,
    pub strategy: Option<ResponseStrategy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub run_id: RunId,
    pub context: String,
    pub started_at: Timestamp,
    pub completed_at: Timestamp,
    pub workers_dispatched: usize,
    pub signals_collected: usize,
    pub prioritized: Vec<PrioritizedRisk>,
    pub monitoring: Vec<SetupConfirmation>,
    pub failures: Vec<FailureNote>,
}

impl FinalReport {
    pub fn risk(&self, risk_id: &str) -> Option<&PrioritizedRisk> {
        self.prioritized.iter().find(|p| p.record.risk_id == risk_id)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ── Monitoring ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Periodic,
    OnDemand,
    Dashboard,
}

impl ReportType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "periodic" => Some(Self::Periodic),
            "on_demand" | "ondemand" => Some(Self::OnDemand),
            "dashboard" | "dashboard_data" => Some(Self::Dashboard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredRiskSummary {
    pub total: usize,
    pub active: usize,
    pub suspended: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KriSummary {
    pub total_defined: usize,
    pub missing_definitions: Vec<KriId>,
    /// KRIs whose latest reading breached its threshold.
    pub currently_breached: Vec<KriId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSummary {
    pub total_tracked: usize,
    pub effective: usize,
    pub ineffective: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub report_type: ReportType,
    pub generated_at: Timestamp,
    pub cycles_run: u64,
    pub monitored_risks: MonitoredRiskSummary,
    pub kri_summary: KriSummary,
    pub control_summary: ControlSummary,
    pub recent_alerts: Vec<Alert>,
}
