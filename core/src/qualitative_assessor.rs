//! Qualitative assessor: risk matrix and rule-based reasoning.
//!
//! This assessor:
//!   1. Scores likelihood / impact through a pluggable `RiskScorer`
//!   2. Looks the pair up in the validated risk matrix
//!   3. Evaluates ordered condition → level rules (highest level wins)
//!   4. Falls back to the matrix for unknown methods, marking the result
//!
//! The default scorer is a deterministic keyword / factor heuristic so the
//! whole pipeline stays reproducible; callers inject their own scorer at
//! construction time when a different policy is wanted.

use crate::{
    error::{RiskError, RiskResult},
    risk::{QualitativeMethod, QualitativeResult, RiskCategory, RiskLevel, RiskRecord},
    risk_matrix::RiskMatrixConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ── Inputs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskInfo {
    pub description: String,
    pub category: RiskCategory,
    pub contributing_factors: BTreeSet<String>,
    #[serde(default)]
    pub potential_impact: Option<String>,
}

impl From<&RiskRecord> for RiskInfo {
    fn from(record: &RiskRecord) -> Self {
        Self {
            description: record.description.clone(),
            category: record.category,
            contributing_factors: record.contributing_factors.clone(),
            potential_impact: None,
        }
    }
}

// ── Scoring ──────────────────────────────────────────────────────────────────

/// Maps a risk onto (likelihood_index, impact_index). Indices beyond the
/// matrix are clamped by the assessor.
pub trait RiskScorer: Send + Sync {
    fn name(&self) -> &'static str;
    fn score(&self, info: &RiskInfo, matrix: &RiskMatrixConfig) -> (usize, usize);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    pub base_likelihood: usize,
    pub likelihood_keywords: Vec<String>,
    pub impact_keywords: Vec<String>,
    pub category_impact: BTreeMap<RiskCategory, usize>,
    pub default_impact: usize,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        let category_impact = [
            (RiskCategory::Operational, 2),
            (RiskCategory::Financial, 2),
            (RiskCategory::Market, 2),
            (RiskCategory::Reputational, 2),
            (RiskCategory::Compliance, 3),
            (RiskCategory::Strategic, 1),
        ]
        .into_iter()
        .collect();

        Self {
            base_likelihood: 1,
            likelihood_keywords: to_strings(&[
                "increased", "rising", "multiple", "spike", "declining", "emergence", "upcoming",
            ]),
            impact_keywords: to_strings(&[
                "outage", "fine", "regulation", "disruptive", "loss", "breach", "unstable",
            ]),
            category_impact,
            default_impact: 2,
        }
    }
}

/// Deterministic heuristic: every contributing factor beyond the first and
/// every likelihood keyword raises likelihood by one step; impact starts at
/// the category baseline and rises per impact keyword.
pub struct KeywordScorer {
    policy: ScoringPolicy,
}

impl KeywordScorer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }
}

impl RiskScorer for KeywordScorer {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn score(&self, info: &RiskInfo, _matrix: &RiskMatrixConfig) -> (usize, usize) {
        let text = info.description.to_lowercase();
        let hits = |words: &[String]| {
            words
                .iter()
                .filter(|w| text.contains(&w.to_lowercase()))
                .count()
        };

        let likelihood = self.policy.base_likelihood
            + info.contributing_factors.len().saturating_sub(1)
            + hits(&self.policy.likelihood_keywords);
        let impact = self
            .policy
            .category_impact
            .get(&info.category)
            .copied()
            .unwrap_or(self.policy.default_impact)
            + hits(&self.policy.impact_keywords);

        (likelihood, impact)
    }
}

// ── Rules ────────────────────────────────────────────────────────────────────

/// Fires when the category matches (if set) and any keyword appears in the
/// description (if keywords are set). A rule must set at least one of the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitativeRule {
    pub rule_id: String,
    #[serde(default)]
    pub category: Option<RiskCategory>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub level: RiskLevel,
}

impl QualitativeRule {
    fn fires(&self, info: &RiskInfo) -> bool {
        if self.category.is_none() && self.keywords.is_empty() {
            return false;
        }
        let category_ok = self.category.map_or(true, |c| c == info.category);
        let text = info.description.to_lowercase();
        let keyword_ok = self.keywords.is_empty()
            || self.keywords.iter().any(|k| text.contains(&k.to_lowercase()));
        category_ok && keyword_ok
    }
}

pub fn default_rules() -> Vec<QualitativeRule> {
    vec![
        QualitativeRule {
            rule_id: "Rule_OperationalOutage".into(),
            category: Some(RiskCategory::Operational),
            keywords: to_strings(&["outage"]),
            level: RiskLevel::Medium,
        },
        QualitativeRule {
            rule_id: "Rule_ComplianceCategory".into(),
            category: Some(RiskCategory::Compliance),
            keywords: Vec::new(),
            level: RiskLevel::High,
        },
        QualitativeRule {
            rule_id: "Rule_ComplianceMention".into(),
            category: None,
            keywords: to_strings(&["compliance"]),
            level: RiskLevel::High,
        },
    ]
}

// ── Assessor ─────────────────────────────────────────────────────────────────

pub struct QualitativeAssessor {
    matrix: RiskMatrixConfig,
    scorer: Box<dyn RiskScorer>,
    rules: Vec<QualitativeRule>,
}

impl QualitativeAssessor {
    /// `matrix` must already be validated (see `RiskConfig::validate`).
    pub fn new(
        matrix: RiskMatrixConfig,
        scorer: Box<dyn RiskScorer>,
        rules: Vec<QualitativeRule>,
    ) -> Self {
        Self {
            matrix,
            scorer,
            rules,
        }
    }

    pub fn matrix(&self) -> &RiskMatrixConfig {
        &self.matrix
    }

    pub fn assess(&self, risk_id: &str, info: &RiskInfo, method: &str) -> QualitativeResult {
        let result = match QualitativeMethod::parse(method) {
            Some(QualitativeMethod::RiskMatrix) => self.apply_risk_matrix(info, false),
            Some(QualitativeMethod::RuleBased) => self.apply_rules(info),
            None => {
                log::warn!(
                    "qual: unsupported method '{method}' for {risk_id}, defaulting to RiskMatrix"
                );
                self.apply_risk_matrix(info, true)
            }
        };
        log::debug!(
            "qual: {risk_id} assessed {:?} -> {}",
            result.method,
            result.risk_level
        );
        result
    }

    /// Like `assess`, but an unknown method is an error instead of a
    /// defaulted RiskMatrix result.
    pub fn assess_strict(
        &self,
        risk_id: &str,
        info: &RiskInfo,
        method: &str,
    ) -> RiskResult<QualitativeResult> {
        if QualitativeMethod::parse(method).is_none() {
            return Err(RiskError::UnsupportedMethod(method.to_string()));
        }
        Ok(self.assess(risk_id, info, method))
    }

    fn apply_risk_matrix(&self, info: &RiskInfo, defaulted: bool) -> QualitativeResult {
        let (n, m) = self.matrix.dimensions();
        let (l, i) = self.scorer.score(info, &self.matrix);
        let l = l.min(n.saturating_sub(1));
        let i = i.min(m.saturating_sub(1));

        let risk_level = self.matrix.lookup(l, i).unwrap_or(RiskLevel::Low);
        let likelihood = self.matrix.likelihood_label(l).unwrap_or_default().to_string();
        let impact = self.matrix.impact_label(i).unwrap_or_default().to_string();

        let mut justification = format!(
            "Likelihood estimated as {likelihood}, impact as {impact} ({} scorer).",
            self.scorer.name()
        );
        justification.push_str(&factors_clause(info));
        if let Some(potential) = &info.potential_impact {
            justification.push_str(&format!(" Potential impact: {potential}."));
        }

        QualitativeResult {
            method: QualitativeMethod::RiskMatrix,
            defaulted,
            likelihood: Some(likelihood),
            impact: Some(impact),
            risk_level,
            justification,
            fired_rules: Vec::new(),
        }
    }

    fn apply_rules(&self, info: &RiskInfo) -> QualitativeResult {
        let fired: Vec<&QualitativeRule> = self.rules.iter().filter(|r| r.fires(info)).collect();
        let risk_level = fired
            .iter()
            .map(|r| r.level)
            .max()
            .unwrap_or(RiskLevel::Low);

        let mut justification = if fired.is_empty() {
            "No specific rules triggered.".to_string()
        } else {
            format!(
                "Rules triggered: {}; highest level {risk_level}.",
                fired
                    .iter()
                    .map(|r| r.rule_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        justification.push_str(&factors_clause(info));

        QualitativeResult {
            method: QualitativeMethod::RuleBased,
            defaulted: false,
            likelihood: None,
            impact: None,
            risk_level,
            justification,
            fired_rules: fired.iter().map(|r| r.rule_id.clone()).collect(),
        }
    }
}

fn factors_clause(info: &RiskInfo) -> String {
    if info.contributing_factors.is_empty() {
        " No contributing factors recorded.".to_string()
    } else {
        format!(
            " Factors considered: {}.",
            info.contributing_factors
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}
