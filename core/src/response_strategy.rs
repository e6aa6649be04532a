//! Response strategy engine: appetite policy → action per assessed risk.
//!
//! This engine:
//!   1. Looks up appetite guidance for (category, level) with fallbacks
//!   2. Picks the first valid candidate from slash-separated guidance
//!   3. Forces `Accept` for Low risks unless the category defines a Low entry
//!   4. Suggests controls from the library (Mitigate) or a fixed catalogue
//!   5. Builds a templated rationale from the inputs alone
//!
//! RULE: selection is a pure function of (record, appetite, library).
//! Running it twice on the same inputs yields the same strategies.

use crate::{
    risk::{RiskLevel, RiskRecord},
    types::{ControlId, RiskId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key used both as a category row and as a level column fallback.
pub const DEFAULT_KEY: &str = "Default";

/// category (or "Default") → level (or "Default") → guidance such as "Avoid/Transfer".
pub type AppetiteConfig = BTreeMap<String, BTreeMap<String, String>>;

/// category → available controls.
pub type ControlLibrary = BTreeMap<String, Vec<ControlDefinition>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDefinition {
    pub id: ControlId,
    pub name: String,
    #[serde(default)]
    pub cost: Option<String>,
    pub effectiveness: String,
}

impl ControlDefinition {
    /// Rank for suggestion ordering; only High and Medium controls qualify.
    fn effectiveness_rank(&self) -> Option<u8> {
        match self.effectiveness.as_str() {
            "High" => Some(0),
            "Medium" => Some(1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    Avoid,
    Transfer,
    Mitigate,
    Accept,
}

impl Strategy {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "Avoid" => Some(Self::Avoid),
            "Transfer" => Some(Self::Transfer),
            "Mitigate" => Some(Self::Mitigate),
            "Accept" => Some(Self::Accept),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Avoid => "Avoid",
            Self::Transfer => "Transfer",
            Self::Mitigate => "Mitigate",
            Self::Accept => "Accept",
        }
    }

    fn gerund(&self) -> &'static str {
        match self {
            Self::Avoid => "avoiding",
            Self::Transfer => "transferring",
            Self::Mitigate => "mitigating",
            Self::Accept => "accepting",
        }
    }

    fn catalogue(&self) -> &'static [&'static str] {
        match self {
            Self::Transfer => &[
                "Explore relevant insurance options",
                "Assess outsourcing possibilities",
                "Review contractual risk transfer clauses",
            ],
            Self::Avoid => &[
                "Evaluate ceasing the associated activity",
                "Re-scope project/process to eliminate risk source",
                "Reject the proposed initiative",
            ],
            Self::Accept => &[
                "Acknowledge risk and monitor",
                "Allocate contingency budget if applicable",
            ],
            Self::Mitigate => &[],
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseStrategy {
    pub risk_id: RiskId,
    pub strategy: Strategy,
    pub control_suggestions: Vec<String>,
    /// Library ids behind `control_suggestions`; empty for catalogue text.
    #[serde(default)]
    pub control_ids: Vec<ControlId>,
    pub appetite_guidance: String,
    pub rationale: String,
}

pub struct ResponseStrategyEngine {
    max_suggestions: usize,
}

impl Default for ResponseStrategyEngine {
    fn default() -> Self {
        Self { max_suggestions: 2 }
    }
}

impl ResponseStrategyEngine {
    pub fn new(max_suggestions: usize) -> Self {
        Self { max_suggestions }
    }

    /// Strategies for every record that carries a level. Records without a
    /// level (all assessments failed) get none.
    pub fn develop(
        &self,
        prioritized: &[RiskRecord],
        appetite: &AppetiteConfig,
        library: &ControlLibrary,
    ) -> BTreeMap<RiskId, ResponseStrategy> {
        let mut out = BTreeMap::new();
        for record in prioritized {
            let Some(level) = record.risk_level else {
                log::warn!("strategy: {} has no risk level, skipped", record.risk_id);
                continue;
            };
            let strategy = self.develop_one(record, level, appetite, library);
            log::debug!(
                "strategy: {} {}/{} -> {}",
                record.risk_id,
                record.category,
                level,
                strategy.strategy
            );
            out.insert(record.risk_id.clone(), strategy);
        }
        out
    }

    pub fn develop_one(
        &self,
        record: &RiskRecord,
        level: RiskLevel,
        appetite: &AppetiteConfig,
        library: &ControlLibrary,
    ) -> ResponseStrategy {
        let category = record.category.as_str();
        let guidance = appetite_guidance(appetite, category, level);

        let mut strategy = guidance
            .split('/')
            .find_map(Strategy::parse)
            .unwrap_or_else(|| {
                log::warn!("strategy: guidance '{guidance}' names no known strategy, using Accept");
                Strategy::Accept
            });

        let explicit_low = appetite
            .get(category)
            .is_some_and(|row| row.contains_key(RiskLevel::Low.as_str()));
        if level == RiskLevel::Low && strategy != Strategy::Accept && !explicit_low {
            strategy = Strategy::Accept;
        }

        let (control_suggestions, control_ids) = match strategy {
            Strategy::Mitigate => self.suggest_controls(record, library),
            other => (
                other.catalogue().iter().map(|s| s.to_string()).collect(),
                Vec::new(),
            ),
        };

        let mut rationale = format!(
            "Risk level assessed as '{level}' for '{category}' category. \
             Company risk appetite suggests '{guidance}'. \
             Primary strategy chosen: {strategy}."
        );
        if strategy == Strategy::Accept {
            rationale.push_str(" Risk accepted based on level and appetite.");
        } else {
            rationale.push_str(&format!(
                " Suggested actions focus on {} the risk.",
                strategy.gerund()
            ));
        }

        ResponseStrategy {
            risk_id: record.risk_id.clone(),
            strategy,
            control_suggestions,
            control_ids,
            appetite_guidance: guidance,
            rationale,
        }
    }

    fn suggest_controls(
        &self,
        record: &RiskRecord,
        library: &ControlLibrary,
    ) -> (Vec<String>, Vec<ControlId>) {
        let mut relevant: Vec<(u8, &ControlDefinition)> = library
            .get(record.category.as_str())
            .into_iter()
            .flatten()
            .filter_map(|c| c.effectiveness_rank().map(|rank| (rank, c)))
            .collect();
        relevant.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.name.cmp(&b.name)));
        relevant.truncate(self.max_suggestions);

        if relevant.is_empty() {
            return (
                vec![
                    format!("Implement enhanced monitoring for {} risks", record.category),
                    format!("Develop contingency plan for {}", record.description),
                ],
                Vec::new(),
            );
        }

        relevant
            .into_iter()
            .map(|(_, c)| (format!("{} ({})", c.name, c.id), c.id.clone()))
            .unzip()
    }
}

/// category[level] → category["Default"] → "Default"[level] → "Default"["Default"] → "Accept".
pub fn appetite_guidance(appetite: &AppetiteConfig, category: &str, level: RiskLevel) -> String {
    let row = appetite.get(category).or_else(|| appetite.get(DEFAULT_KEY));
    row.and_then(|r| r.get(level.as_str()).or_else(|| r.get(DEFAULT_KEY)))
        .cloned()
        .unwrap_or_else(|| Strategy::Accept.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guidance_falls_back_through_default_row() {
        let mut appetite = AppetiteConfig::new();
        appetite.insert(
            DEFAULT_KEY.into(),
            [("Critical".to_string(), "Avoid/Transfer".to_string())].into(),
        );
        assert_eq!(
            appetite_guidance(&appetite, "Market", RiskLevel::Critical),
            "Avoid/Transfer"
        );
        assert_eq!(appetite_guidance(&appetite, "Market", RiskLevel::Low), "Accept");
        assert_eq!(
            appetite_guidance(&AppetiteConfig::new(), "Market", RiskLevel::High),
            "Accept"
        );
    }

    #[test]
    fn strategy_parse_trims() {
        assert_eq!(Strategy::parse(" Transfer"), Some(Strategy::Transfer));
        assert_eq!(Strategy::parse("Ignore"), None);
    }
}
