//! Specialist worker boundary.
//!
//! A worker is anything that can produce a `SignalReport` on request:
//! internal scanners, external monitors, market analysts. How it gathers
//! its signals is its own business; the coordinator only sees the report.

use crate::{error::RiskResult, signal::SignalReport};
use async_trait::async_trait;

#[async_trait]
pub trait SpecialistWorker: Send + Sync {
    /// Stable identifier used in logs and failure reports.
    fn id(&self) -> &str;

    async fn invoke(&self) -> RiskResult<SignalReport>;
}

/// Replays a fixed report. Used by the runner (fixtures under
/// `data/signals/`) and by tests.
pub struct StaticWorker {
    id: String,
    report: SignalReport,
}

impl StaticWorker {
    pub fn new(report: SignalReport) -> Self {
        Self {
            id: report.source_id.clone(),
            report,
        }
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let report: SignalReport = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(Self::new(report))
    }
}

#[async_trait]
impl SpecialistWorker for StaticWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self) -> RiskResult<SignalReport> {
        Ok(self.report.clone())
    }
}
