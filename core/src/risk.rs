//! Risk records and the assessment payloads attached to them.
//!
//! Variants of the enums here are part of the persisted wire format:
//! add new ones at the end, never rename or reorder.

use crate::types::RiskId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ── Category ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskCategory {
    Operational,
    Financial,
    Market,
    Reputational,
    Compliance,
    Strategic,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 6] = [
        Self::Operational,
        Self::Financial,
        Self::Market,
        Self::Reputational,
        Self::Compliance,
        Self::Strategic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operational => "Operational",
            Self::Financial => "Financial",
            Self::Market => "Market",
            Self::Reputational => "Reputational",
            Self::Compliance => "Compliance",
            Self::Strategic => "Strategic",
        }
    }

    /// Which assessor(s) a candidate of this category is routed to.
    pub fn assessment_route(&self) -> AssessmentRoute {
        match self {
            Self::Financial | Self::Market => AssessmentRoute::Quantitative,
            Self::Operational | Self::Compliance | Self::Reputational => {
                AssessmentRoute::Qualitative
            }
            Self::Strategic => AssessmentRoute::Both,
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentRoute {
    Quantitative,
    Qualitative,
    Both,
}

impl AssessmentRoute {
    pub fn quantitative(&self) -> bool {
        matches!(self, Self::Quantitative | Self::Both)
    }

    pub fn qualitative(&self) -> bool {
        matches!(self, Self::Qualitative | Self::Both)
    }
}

// ── Level ────────────────────────────────────────────────────────────────────

/// Ordinal risk level. Declaration order is severity order:
/// `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    /// High and Critical risks are registered for continuous monitoring.
    pub fn requires_monitoring(&self) -> bool {
        *self >= Self::High
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Status ───────────────────────────────────────────────────────────────────

/// Lifecycle of a record. Status only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskStatus {
    Candidate,
    Assessed,
    Prioritized,
    Strategized,
    Monitored,
}

impl RiskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candidate => "Candidate",
            Self::Assessed => "Assessed",
            Self::Prioritized => "Prioritized",
            Self::Strategized => "Strategized",
            Self::Monitored => "Monitored",
        }
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Assessment payloads ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantitativeResult {
    pub metric_name: String,
    pub value: f64,
    pub method: String,
    pub assumptions: Vec<String>,
    /// Magnitude of `value` relative to the exposure it was computed on.
    pub loss_ratio: f64,
    #[serde(default)]
    pub details: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualitativeMethod {
    RiskMatrix,
    RuleBased,
}

impl QualitativeMethod {
    /// Case-insensitive parse of a requested method name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "riskmatrix" | "risk_matrix" => Some(Self::RiskMatrix),
            "rulebased" | "rule_based" => Some(Self::RuleBased),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitativeResult {
    pub method: QualitativeMethod,
    /// Set when the requested method was unknown and RiskMatrix was used.
    pub defaulted: bool,
    pub likelihood: Option<String>,
    pub impact: Option<String>,
    pub risk_level: RiskLevel,
    pub justification: String,
    #[serde(default)]
    pub fired_rules: Vec<String>,
}

/// Explicit error artifact recorded in place of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentFailure {
    pub assessor: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Assessment {
    Quantitative(QuantitativeResult),
    Qualitative(QualitativeResult),
    Failed(AssessmentFailure),
}

// ── Record ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
    pub risk_id: RiskId,
    pub description: String,
    pub category: RiskCategory,
    pub contributing_factors: BTreeSet<String>,
    /// Empty until assessed; holds one entry per assessor that ran.
    pub assessments: Vec<Assessment>,
    pub risk_level: Option<RiskLevel>,
    pub status: RiskStatus,
}

impl RiskRecord {
    pub fn candidate(
        risk_id: RiskId,
        description: impl Into<String>,
        category: RiskCategory,
        contributing_factors: BTreeSet<String>,
    ) -> Self {
        Self {
            risk_id,
            description: description.into(),
            category,
            contributing_factors,
            assessments: Vec::new(),
            risk_level: None,
            status: RiskStatus::Candidate,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &AssessmentFailure> {
        self.assessments.iter().filter_map(|a| match a {
            Assessment::Failed(f) => Some(f),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_order_by_severity() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
        assert!(RiskLevel::High.requires_monitoring());
        assert!(!RiskLevel::Medium.requires_monitoring());
    }

    #[test]
    fn routes_follow_category() {
        assert_eq!(RiskCategory::Market.assessment_route(), AssessmentRoute::Quantitative);
        assert_eq!(RiskCategory::Compliance.assessment_route(), AssessmentRoute::Qualitative);
        assert!(RiskCategory::Strategic.assessment_route().quantitative());
        assert!(RiskCategory::Strategic.assessment_route().qualitative());
    }

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(QualitativeMethod::parse("RISKMATRIX"), Some(QualitativeMethod::RiskMatrix));
        assert_eq!(QualitativeMethod::parse("ruleBased"), Some(QualitativeMethod::RuleBased));
        assert_eq!(QualitativeMethod::parse("delphi"), None);
    }
}
