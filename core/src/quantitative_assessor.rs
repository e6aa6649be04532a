//! Quantitative assessor: VaR, stress tests and Monte Carlo.
//!
//! This assessor:
//!   1. Computes parametric Value-at-Risk from exposure and volatility
//!   2. Applies named stress scenarios to a base value
//!   3. Runs seeded Monte Carlo draws and summarises the outcome
//!
//! Every failure is an explicit error: missing inputs are
//! `InsufficientData`, unknown assessment types are
//! `UnsupportedAssessmentType`. Nothing falls back silently.

use crate::{
    error::{RiskError, RiskResult},
    risk::QuantitativeResult,
    rng::SimulationRng,
};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::BTreeMap;

// ── Constants ────────────────────────────────────────────────────────────────

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
pub const DEFAULT_CONFIDENCE: f64 = 0.95;
pub const DEFAULT_HORIZON_DAYS: f64 = 1.0;
pub const DEFAULT_SIMULATIONS: usize = 10_000;
pub const DEFAULT_DISPERSION: f64 = 0.1;
pub const GENERIC_STRESS: &str = "Generic Stress";
pub const GENERIC_STRESS_SHOCK: f64 = -0.1;

// ── Inputs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssessmentType {
    VaR,
    StressTest,
    MonteCarlo,
}

impl AssessmentType {
    pub fn parse(name: &str) -> RiskResult<Self> {
        match name.to_ascii_uppercase().as_str() {
            "VAR" => Ok(Self::VaR),
            "STRESSTEST" | "STRESS_TEST" => Ok(Self::StressTest),
            "MONTECARLO" | "MONTE_CARLO" => Ok(Self::MonteCarlo),
            _ => Err(RiskError::UnsupportedAssessmentType(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VaR => "VaR",
            Self::StressTest => "StressTest",
            Self::MonteCarlo => "MonteCarlo",
        }
    }
}

/// Optional knobs for an assessment; unset fields take the defaults above.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentParameters {
    pub confidence_level: Option<f64>,
    pub time_horizon_days: Option<f64>,
    pub scenario_name: Option<String>,
    pub market_shock: Option<f64>,
    pub num_simulations: Option<usize>,
    pub dispersion: Option<f64>,
    pub seed: Option<u64>,
}

// ── Assessor ─────────────────────────────────────────────────────────────────

pub struct QuantitativeAssessor {
    /// Named stress scenarios and their shock factors.
    scenarios: BTreeMap<String, f64>,
    default_seed: u64,
}

impl QuantitativeAssessor {
    pub fn new(scenarios: BTreeMap<String, f64>, default_seed: u64) -> Self {
        Self {
            scenarios,
            default_seed,
        }
    }

    /// Run one assessment. `data` carries named numeric inputs
    /// (`portfolio_value`, `volatility`).
    pub fn assess(
        &self,
        risk_description: &str,
        data: &BTreeMap<String, f64>,
        assessment_type: &str,
        parameters: &AssessmentParameters,
    ) -> RiskResult<QuantitativeResult> {
        let kind = AssessmentType::parse(assessment_type)?;
        log::debug!("quant: {} assessment for '{}'", kind.as_str(), risk_description);

        let result = match kind {
            AssessmentType::VaR => self.value_at_risk(data, parameters),
            AssessmentType::StressTest => self.stress_test(data, parameters),
            AssessmentType::MonteCarlo => self.monte_carlo(data, parameters),
        };

        if let Err(e) = &result {
            log::warn!("quant: {} failed for '{}': {e}", kind.as_str(), risk_description);
        }
        result
    }

    fn value_at_risk(
        &self,
        data: &BTreeMap<String, f64>,
        parameters: &AssessmentParameters,
    ) -> RiskResult<QuantitativeResult> {
        let value = data.get("portfolio_value").copied().unwrap_or(0.0);
        let volatility = data.get("volatility").copied().unwrap_or(0.0);
        if !(value.is_finite() && value > 0.0 && volatility.is_finite() && volatility > 0.0) {
            return Err(RiskError::InsufficientData {
                assessment: "VaR".into(),
                reason: "portfolio_value and volatility must both be finite and > 0".into(),
            });
        }

        let confidence = parameters.confidence_level.unwrap_or(DEFAULT_CONFIDENCE);
        let horizon = parameters.time_horizon_days.unwrap_or(DEFAULT_HORIZON_DAYS);
        if !(confidence > 0.0 && confidence < 1.0) || !(horizon > 0.0 && horizon.is_finite()) {
            return Err(RiskError::InsufficientData {
                assessment: "VaR".into(),
                reason: format!("confidence {confidence} and horizon {horizon} out of range"),
            });
        }

        let z = z_score(confidence)?;
        let var = value * volatility * z * (horizon / TRADING_DAYS_PER_YEAR).sqrt();

        let mut details = BTreeMap::new();
        details.insert("z_score".into(), z);
        details.insert("confidence_level".into(), confidence);
        details.insert("time_horizon_days".into(), horizon);

        Ok(QuantitativeResult {
            metric_name: format!("VaR_{}_{}day", (confidence * 100.0).round() as u32, horizon),
            value: round2(var),
            method: "Parametric VaR".into(),
            assumptions: vec![
                "Normal distribution of returns".into(),
                format!("{horizon} day horizon"),
                format!("{}% confidence", confidence * 100.0),
            ],
            loss_ratio: var / value,
            details,
        })
    }

    fn stress_test(
        &self,
        data: &BTreeMap<String, f64>,
        parameters: &AssessmentParameters,
    ) -> RiskResult<QuantitativeResult> {
        let value = data.get("portfolio_value").copied().ok_or_else(|| {
            RiskError::InsufficientData {
                assessment: "StressTest".into(),
                reason: "portfolio_value missing".into(),
            }
        })?;

        let requested = parameters.scenario_name.as_deref().unwrap_or(GENERIC_STRESS);
        let (scenario, shock) = match (parameters.market_shock, self.scenarios.get(requested)) {
            (Some(shock), _) => (requested.to_string(), shock),
            (None, Some(shock)) => (requested.to_string(), *shock),
            (None, None) => {
                if requested != GENERIC_STRESS {
                    log::debug!("quant: unknown scenario '{requested}', using {GENERIC_STRESS}");
                }
                let shock = self
                    .scenarios
                    .get(GENERIC_STRESS)
                    .copied()
                    .unwrap_or(GENERIC_STRESS_SHOCK);
                (GENERIC_STRESS.to_string(), shock)
            }
        };

        let impact = value * shock;
        let mut details = BTreeMap::new();
        details.insert("market_shock".into(), shock);

        Ok(QuantitativeResult {
            metric_name: "estimated_impact".into(),
            value: round2(impact),
            method: format!("Stress Test ({scenario})"),
            assumptions: vec![
                format!("Scenario: {scenario}"),
                format!("Market shock of {:.1}% applied to base value", shock * 100.0),
            ],
            loss_ratio: if value != 0.0 { (impact / value).abs() } else { 0.0 },
            details,
        })
    }

    fn monte_carlo(
        &self,
        data: &BTreeMap<String, f64>,
        parameters: &AssessmentParameters,
    ) -> RiskResult<QuantitativeResult> {
        let value = data.get("portfolio_value").copied().ok_or_else(|| {
            RiskError::InsufficientData {
                assessment: "MonteCarlo".into(),
                reason: "portfolio_value missing".into(),
            }
        })?;
        let n = parameters.num_simulations.unwrap_or(DEFAULT_SIMULATIONS);
        if n == 0 {
            return Err(RiskError::InsufficientData {
                assessment: "MonteCarlo".into(),
                reason: "num_simulations must be > 0".into(),
            });
        }
        let dispersion = parameters
            .dispersion
            .or_else(|| data.get("volatility").copied())
            .unwrap_or(DEFAULT_DISPERSION);
        let seed = parameters.seed.unwrap_or(self.default_seed);

        let mut rng = SimulationRng::new(seed);
        let mut outcomes: Vec<f64> = (0..n)
            .map(|_| value * (1.0 + rng.normal(0.0, dispersion)))
            .collect();

        let mean = outcomes.iter().sum::<f64>() / n as f64;
        let variance = outcomes.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        let std_dev = variance.sqrt();

        outcomes.sort_by(|a, b| a.total_cmp(b));
        let p5 = outcomes[((n as f64) * 0.05) as usize];

        let mut details = BTreeMap::new();
        details.insert("num_simulations".into(), n as f64);
        details.insert("mean_outcome".into(), round2(mean));
        details.insert("std_dev".into(), round2(std_dev));
        details.insert("percentile_5".into(), round2(p5));

        Ok(QuantitativeResult {
            metric_name: "mean_outcome".into(),
            value: round2(mean),
            method: "Monte Carlo Simulation".into(),
            assumptions: vec![
                format!("{n} normally distributed draws"),
                format!("Dispersion {dispersion} around base value"),
                format!("Seed {seed}"),
            ],
            loss_ratio: if value != 0.0 { ((value - p5) / value).max(0.0) } else { 0.0 },
            details,
        })
    }
}

impl Default for QuantitativeAssessor {
    fn default() -> Self {
        Self::new(BTreeMap::new(), 42)
    }
}

/// Inverse standard-normal CDF at `confidence`.
pub fn z_score(confidence: f64) -> RiskResult<f64> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| RiskError::Other(anyhow::anyhow!("standard normal: {e}")))?;
    Ok(normal.inverse_cdf(confidence))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_score_matches_tables() {
        assert!((z_score(0.95).unwrap() - 1.6449).abs() < 1e-3);
        assert!((z_score(0.99).unwrap() - 2.3263).abs() < 1e-3);
    }

    #[test]
    fn assessment_type_parse_is_case_insensitive() {
        assert_eq!(AssessmentType::parse("var").unwrap(), AssessmentType::VaR);
        assert_eq!(AssessmentType::parse("StressTest").unwrap(), AssessmentType::StressTest);
        assert!(matches!(
            AssessmentType::parse("Copula"),
            Err(RiskError::UnsupportedAssessmentType(_))
        ));
    }
}
