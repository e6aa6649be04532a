//! Risk register: the set of known risk records and their audit trail.
//!
//! RULES:
//!   - Records are never deleted.
//!   - Status only moves forward (Candidate → … → Monitored). Skipping
//!     ahead is allowed, going back or staying put is not.
//!   - Every status change is appended to the history.

use crate::{
    error::{RiskError, RiskResult},
    risk::{Assessment, RiskCategory, RiskLevel, RiskRecord, RiskStatus},
    types::{RiskId, Timestamp},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub risk_id: RiskId,
    /// None for the initial registration.
    pub from: Option<RiskStatus>,
    pub to: RiskStatus,
    pub at: Timestamp,
}

#[derive(Debug, Default)]
pub struct RiskRegister {
    records: BTreeMap<RiskId, RiskRecord>,
    history: Vec<StatusChange>,
    next_seq: u32,
}

impl RiskRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new candidate under the next system-assigned id
    /// (`RISK-001`, `RISK-002`, ...).
    pub fn add_candidate(
        &mut self,
        description: impl Into<String>,
        category: RiskCategory,
        contributing_factors: BTreeSet<String>,
    ) -> RiskId {
        let risk_id = loop {
            self.next_seq += 1;
            let candidate = format!("RISK-{:03}", self.next_seq);
            if !self.records.contains_key(&candidate) {
                break candidate;
            }
        };
        let record =
            RiskRecord::candidate(risk_id.clone(), description, category, contributing_factors);
        self.push(record);
        risk_id
    }

    /// Register a record with a caller-assigned id.
    pub fn insert(&mut self, record: RiskRecord) -> RiskResult<()> {
        if self.records.contains_key(&record.risk_id) {
            return Err(RiskError::Other(anyhow::anyhow!(
                "risk '{}' already registered",
                record.risk_id
            )));
        }
        self.push(record);
        Ok(())
    }

    fn push(&mut self, record: RiskRecord) {
        self.history.push(StatusChange {
            risk_id: record.risk_id.clone(),
            from: None,
            to: record.status,
            at: Utc::now(),
        });
        self.records.insert(record.risk_id.clone(), record);
    }

    pub fn get(&self, risk_id: &str) -> Option<&RiskRecord> {
        self.records.get(risk_id)
    }

    /// Merge extra contributing factors into an existing record.
    pub fn merge_factors(
        &mut self,
        risk_id: &str,
        factors: impl IntoIterator<Item = String>,
    ) -> RiskResult<()> {
        let record = self
            .records
            .get_mut(risk_id)
            .ok_or_else(|| RiskError::RiskNotFound(risk_id.to_string()))?;
        record.contributing_factors.extend(factors);
        Ok(())
    }

    /// Attach assessment results and move the record to Assessed.
    pub fn record_assessment(
        &mut self,
        risk_id: &str,
        assessments: Vec<Assessment>,
        risk_level: Option<RiskLevel>,
    ) -> RiskResult<()> {
        let record = self
            .records
            .get_mut(risk_id)
            .ok_or_else(|| RiskError::RiskNotFound(risk_id.to_string()))?;
        record.assessments = assessments;
        record.risk_level = risk_level;
        self.advance(risk_id, RiskStatus::Assessed)
    }

    pub fn advance(&mut self, risk_id: &str, to: RiskStatus) -> RiskResult<()> {
        let record = self
            .records
            .get_mut(risk_id)
            .ok_or_else(|| RiskError::RiskNotFound(risk_id.to_string()))?;
        if to <= record.status {
            return Err(RiskError::InvalidTransition {
                from: record.status.to_string(),
                to: to.to_string(),
            });
        }
        let from = record.status;
        record.status = to;
        log::debug!("register: {risk_id} {from} -> {to}");
        self.history.push(StatusChange {
            risk_id: risk_id.to_string(),
            from: Some(from),
            to,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Records in id order.
    pub fn records(&self) -> impl Iterator<Item = &RiskRecord> {
        self.records.values()
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    pub fn history_for<'a>(&'a self, risk_id: &'a str) -> impl Iterator<Item = &'a StatusChange> {
        self.history.iter().filter(move |c| c.risk_id == risk_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
