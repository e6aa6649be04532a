use riskflow_core::{
    config::ScoringConfig,
    error::RiskError,
    quantitative_assessor::{AssessmentParameters, QuantitativeAssessor},
};
use std::collections::BTreeMap;

fn assessor() -> QuantitativeAssessor {
    QuantitativeAssessor::new(ScoringConfig::default().stress_scenarios, 42)
}

fn data(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[test]
fn var_at_99_percent_one_day() {
    let params = AssessmentParameters {
        confidence_level: Some(0.99),
        time_horizon_days: Some(1.0),
        ..Default::default()
    };
    let result = assessor()
        .assess(
            "FX exposure",
            &data(&[("portfolio_value", 1_000_000.0), ("volatility", 0.2)]),
            "VaR",
            &params,
        )
        .unwrap();

    // 1e6 * 0.2 * z(0.99) * sqrt(1/252)
    assert!((result.value - 29_309.0).abs() < 5.0, "VaR was {}", result.value);
    assert_eq!(result.metric_name, "VaR_99_1day");
    assert_eq!(result.method, "Parametric VaR");
    assert!((result.loss_ratio - 0.0293).abs() < 1e-3);
}

#[test]
fn var_without_volatility_is_insufficient_data() {
    let err = assessor()
        .assess(
            "FX exposure",
            &data(&[("portfolio_value", 1_000_000.0)]),
            "VaR",
            &AssessmentParameters::default(),
        )
        .unwrap_err();
    assert!(matches!(err, RiskError::InsufficientData { .. }));
}

#[test]
fn var_rejects_non_finite_inputs() {
    let nan_confidence = AssessmentParameters {
        confidence_level: Some(f64::NAN),
        ..Default::default()
    };
    let infinite_horizon = AssessmentParameters {
        time_horizon_days: Some(f64::INFINITY),
        ..Default::default()
    };
    let valid = data(&[("portfolio_value", 1_000_000.0), ("volatility", 0.2)]);
    let infinite_volatility =
        data(&[("portfolio_value", 1_000_000.0), ("volatility", f64::INFINITY)]);
    let nan_value = data(&[("portfolio_value", f64::NAN), ("volatility", 0.2)]);

    let cases = [
        (&valid, &nan_confidence),
        (&valid, &infinite_horizon),
        (&infinite_volatility, &AssessmentParameters::default()),
        (&nan_value, &AssessmentParameters::default()),
    ];
    for (input, params) in cases {
        let err = assessor().assess("FX exposure", input, "VaR", params).unwrap_err();
        assert!(matches!(err, RiskError::InsufficientData { .. }), "{input:?} {params:?}");
    }
}

#[test]
fn named_stress_scenario_applies_its_shock() {
    let params = AssessmentParameters {
        scenario_name: Some("Market Crash".into()),
        ..Default::default()
    };
    let input = data(&[("portfolio_value", 1_000_000.0)]);
    let result = assessor()
        .assess("Equity drawdown", &input, "StressTest", &params)
        .unwrap();
    assert_eq!(result.value, -200_000.0);
    assert_eq!(result.method, "Stress Test (Market Crash)");
    assert!((result.loss_ratio - 0.2).abs() < 1e-9);
}

#[test]
fn unknown_stress_scenario_falls_back_to_generic() {
    let params = AssessmentParameters {
        scenario_name: Some("Alien Invasion".into()),
        ..Default::default()
    };
    let result = assessor()
        .assess("Tail event", &data(&[("portfolio_value", 500_000.0)]), "StressTest", &params)
        .unwrap();
    assert_eq!(result.value, -50_000.0);
    assert_eq!(result.method, "Stress Test (Generic Stress)");
}

#[test]
fn explicit_shock_overrides_scenario_table() {
    let params = AssessmentParameters {
        scenario_name: Some("Custom".into()),
        market_shock: Some(-0.3),
        ..Default::default()
    };
    let result = assessor()
        .assess("Custom shock", &data(&[("portfolio_value", 100_000.0)]), "StressTest", &params)
        .unwrap();
    assert_eq!(result.value, -30_000.0);
}

#[test]
fn monte_carlo_is_reproducible_for_a_seed() {
    let params = AssessmentParameters {
        num_simulations: Some(5_000),
        dispersion: Some(0.05),
        seed: Some(7),
        ..Default::default()
    };
    let input = data(&[("portfolio_value", 1_000_000.0)]);
    let a = assessor().assess("Project NPV", &input, "MonteCarlo", &params).unwrap();
    let b = assessor().assess("Project NPV", &input, "MonteCarlo", &params).unwrap();
    assert_eq!(a, b);

    let mean = a.details["mean_outcome"];
    let p5 = a.details["percentile_5"];
    assert!((mean - 1_000_000.0).abs() < 5_000.0, "mean drifted: {mean}");
    assert!(p5 < mean);
    assert!(a.loss_ratio > 0.0);
}

#[test]
fn monte_carlo_seed_changes_outcome() {
    let base = AssessmentParameters {
        num_simulations: Some(1_000),
        ..Default::default()
    };
    let input = data(&[("portfolio_value", 1_000_000.0)]);
    let first = AssessmentParameters {
        seed: Some(1),
        ..base.clone()
    };
    let second = AssessmentParameters {
        seed: Some(2),
        ..base
    };
    let a = assessor().assess("NPV", &input, "MonteCarlo", &first).unwrap();
    let b = assessor().assess("NPV", &input, "MonteCarlo", &second).unwrap();
    assert_ne!(a.value, b.value);
}

#[test]
fn unknown_type_is_rejected() {
    let err = assessor()
        .assess(
            "Anything",
            &data(&[("portfolio_value", 1.0)]),
            "Copula",
            &AssessmentParameters::default(),
        )
        .unwrap_err();
    assert!(matches!(err, RiskError::UnsupportedAssessmentType(name) if name == "Copula"));
}
