//! Data-source boundary for KRI readings and control checks.
//!
//! Both calls may fail; failures must come back as
//! `RiskError::DataSource` so the monitoring cycle can tell them apart
//! from its own errors.

use crate::error::{RiskError, RiskResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, data_source_ref: &str) -> RiskResult<f64>;

    async fn check_effectiveness(&self, control_id: &str) -> RiskResult<bool>;
}

/// Map-backed source. Unknown references and controls are errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticDataSource {
    #[serde(default)]
    pub readings: BTreeMap<String, f64>,
    #[serde(default)]
    pub controls: BTreeMap<String, bool>,
}

impl StaticDataSource {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_reading(mut self, data_source_ref: impl Into<String>, value: f64) -> Self {
        self.readings.insert(data_source_ref.into(), value);
        self
    }

    pub fn with_control(mut self, control_id: impl Into<String>, effective: bool) -> Self {
        self.controls.insert(control_id.into(), effective);
        self
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn fetch(&self, data_source_ref: &str) -> RiskResult<f64> {
        self.readings
            .get(data_source_ref)
            .copied()
            .ok_or_else(|| RiskError::DataSource {
                reference: data_source_ref.to_string(),
                reason: "no reading available".into(),
            })
    }

    async fn check_effectiveness(&self, control_id: &str) -> RiskResult<bool> {
        self.controls
            .get(control_id)
            .copied()
            .ok_or_else(|| RiskError::DataSource {
                reference: control_id.to_string(),
                reason: "control not tracked by source".into(),
            })
    }
}
