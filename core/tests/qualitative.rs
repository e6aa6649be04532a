use riskflow_core::{
    error::RiskError,
    qualitative_assessor::{
        default_rules, KeywordScorer, QualitativeAssessor, QualitativeRule, RiskInfo, RiskScorer,
        ScoringPolicy,
    },
    risk::{QualitativeMethod, RiskCategory, RiskLevel},
    risk_matrix::RiskMatrixConfig,
};
use std::collections::BTreeSet;

/// Returns the same indices for every risk.
struct FixedScorer(usize, usize);

impl RiskScorer for FixedScorer {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn score(&self, _info: &RiskInfo, _matrix: &RiskMatrixConfig) -> (usize, usize) {
        (self.0, self.1)
    }
}

fn info(description: &str, category: RiskCategory, factors: &[&str]) -> RiskInfo {
    RiskInfo {
        description: description.into(),
        category,
        contributing_factors: factors.iter().map(|f| f.to_string()).collect::<BTreeSet<_>>(),
        potential_impact: None,
    }
}

fn fixed(likelihood: usize, impact: usize) -> QualitativeAssessor {
    QualitativeAssessor::new(
        RiskMatrixConfig::standard(),
        Box::new(FixedScorer(likelihood, impact)),
        default_rules(),
    )
}

#[test]
fn matrix_lookup_uses_scorer_indices() {
    let risk = info("Vendor lock-in", RiskCategory::Strategic, &[]);
    let result = fixed(3, 3).assess("RISK-001", &risk, "RiskMatrix");
    assert_eq!(result.method, QualitativeMethod::RiskMatrix);
    assert_eq!(result.risk_level, RiskLevel::High);
    assert_eq!(result.likelihood.as_deref(), Some("High"));
    assert_eq!(result.impact.as_deref(), Some("Major"));
    assert!(!result.defaulted);
    assert!(result.justification.contains("fixed scorer"));
}

#[test]
fn scorer_indices_past_the_scale_are_clamped() {
    let risk = info("Anything", RiskCategory::Operational, &[]);
    let result = fixed(99, 99).assess("RISK-001", &risk, "RiskMatrix");
    assert_eq!(result.risk_level, RiskLevel::Critical);
    assert_eq!(result.likelihood.as_deref(), Some("Very High"));
    assert_eq!(result.impact.as_deref(), Some("Catastrophic"));
}

#[test]
fn keyword_scorer_reads_factors_and_keywords() {
    let assessor = QualitativeAssessor::new(
        RiskMatrixConfig::standard(),
        Box::new(KeywordScorer::new(ScoringPolicy::default())),
        default_rules(),
    );
    // likelihood 1 + "multiple" = 2, impact 2 + "outage" = 3 -> High
    let risk = info(
        "Multiple server outage reports",
        RiskCategory::Operational,
        &["audit/operational_issues"],
    );
    let result = assessor.assess("RISK-002", &risk, "RiskMatrix");
    assert_eq!(result.risk_level, RiskLevel::High);
    assert!(result.justification.contains("audit/operational_issues"));
}

#[test]
fn unknown_method_defaults_to_matrix() {
    let risk = info("Minor typo", RiskCategory::Reputational, &[]);
    let result = fixed(0, 0).assess("RISK-003", &risk, "Delphi");
    assert_eq!(result.method, QualitativeMethod::RiskMatrix);
    assert!(result.defaulted);
    assert_eq!(result.risk_level, RiskLevel::Low);
}

#[test]
fn strict_assessment_rejects_unknown_method() {
    let err = fixed(0, 0)
        .assess_strict("RISK-003", &info("Minor typo", RiskCategory::Reputational, &[]), "Delphi")
        .unwrap_err();
    assert!(matches!(err, RiskError::UnsupportedMethod(m) if m == "Delphi"));
}

#[test]
fn rules_take_highest_fired_level() {
    let result = fixed(0, 0).assess(
        "RISK-004",
        &info("Operational outage hits compliance reporting", RiskCategory::Operational, &[]),
        "RuleBased",
    );
    assert_eq!(result.method, QualitativeMethod::RuleBased);
    assert_eq!(result.risk_level, RiskLevel::High);
    assert_eq!(
        result.fired_rules,
        vec!["Rule_OperationalOutage".to_string(), "Rule_ComplianceMention".to_string()]
    );
    assert!(result.likelihood.is_none());
}

#[test]
fn no_fired_rule_means_low() {
    let risk = info("Office relocation", RiskCategory::Strategic, &[]);
    let result = fixed(4, 4).assess("RISK-005", &risk, "RuleBased");
    assert_eq!(result.risk_level, RiskLevel::Low);
    assert!(result.fired_rules.is_empty());
    assert!(result.justification.starts_with("No specific rules triggered."));
}

#[test]
fn category_rule_needs_matching_category() {
    let rules = vec![QualitativeRule {
        rule_id: "Rule_Market".into(),
        category: Some(RiskCategory::Market),
        keywords: vec!["volatility".into()],
        level: RiskLevel::Critical,
    }];
    let assessor =
        QualitativeAssessor::new(RiskMatrixConfig::standard(), Box::new(FixedScorer(0, 0)), rules);

    let financial = info("Rising volatility", RiskCategory::Financial, &[]);
    let wrong_category = assessor.assess("R1", &financial, "RuleBased");
    assert_eq!(wrong_category.risk_level, RiskLevel::Low);

    let market = info("Rising volatility", RiskCategory::Market, &[]);
    let matching = assessor.assess("R2", &market, "RuleBased");
    assert_eq!(matching.risk_level, RiskLevel::Critical);
}
