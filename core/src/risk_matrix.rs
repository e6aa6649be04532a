//! Likelihood × impact risk matrix.
//!
//! RULE: a matrix is validated once, at config load. Every
//! (likelihood, impact) cell must be defined and the grid must be
//! monotonic non-decreasing along both axes. Anything else is a
//! configuration error and fatal at startup.

use crate::{
    error::{RiskError, RiskResult},
    risk::RiskLevel,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMatrixConfig {
    pub likelihood_scale: Vec<String>,
    pub impact_scale: Vec<String>,
    /// Row per likelihood index, column per impact index.
    pub level_map: Vec<Vec<RiskLevel>>,
}

impl RiskMatrixConfig {
    /// The 5×5 matrix used as the shipped default.
    pub fn standard() -> Self {
        use RiskLevel::*;
        Self {
            likelihood_scale: labels(&["Very Low", "Low", "Medium", "High", "Very High"]),
            impact_scale: labels(&["Insignificant", "Minor", "Moderate", "Major", "Catastrophic"]),
            level_map: vec![
                vec![Low, Low, Low, Medium, Medium],
                vec![Low, Low, Medium, Medium, High],
                vec![Low, Medium, Medium, High, High],
                vec![Medium, Medium, High, High, Critical],
                vec![Medium, High, High, Critical, Critical],
            ],
        }
    }

    /// Build a level map for arbitrary scales where the level climbs with
    /// the sum of both indices.
    pub fn generated(likelihood_scale: Vec<String>, impact_scale: Vec<String>) -> Self {
        let n = likelihood_scale.len();
        let m = impact_scale.len();
        let span = (n + m).saturating_sub(2);
        let step = (span / (RiskLevel::ALL.len() - 1)).max(1);

        let level_map = (0..n)
            .map(|l| {
                (0..m)
                    .map(|i| {
                        if span == 0 {
                            RiskLevel::Low
                        } else {
                            RiskLevel::from_index((l + i) / step)
                        }
                    })
                    .collect()
            })
            .collect();

        Self {
            likelihood_scale,
            impact_scale,
            level_map,
        }
    }

    pub fn validate(&self) -> RiskResult<()> {
        let n = self.likelihood_scale.len();
        let m = self.impact_scale.len();
        if n == 0 || m == 0 {
            return Err(RiskError::Configuration(
                "risk matrix scales must not be empty".into(),
            ));
        }
        if self.level_map.len() != n {
            return Err(RiskError::Configuration(format!(
                "risk matrix has {} likelihood rows, scale defines {n}",
                self.level_map.len()
            )));
        }
        for (l, row) in self.level_map.iter().enumerate() {
            if row.len() != m {
                return Err(RiskError::Configuration(format!(
                    "risk matrix row {l} has {} impact cells, scale defines {m}",
                    row.len()
                )));
            }
            for (i, level) in row.iter().enumerate() {
                if l > 0 && *level < self.level_map[l - 1][i] {
                    return Err(RiskError::Configuration(format!(
                        "risk matrix not monotonic in likelihood at ({l},{i}): {level} < {}",
                        self.level_map[l - 1][i]
                    )));
                }
                if i > 0 && *level < row[i - 1] {
                    return Err(RiskError::Configuration(format!(
                        "risk matrix not monotonic in impact at ({l},{i}): {level} < {}",
                        row[i - 1]
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn lookup(&self, likelihood: usize, impact: usize) -> Option<RiskLevel> {
        self.level_map.get(likelihood)?.get(impact).copied()
    }

    pub fn likelihood_label(&self, index: usize) -> Option<&str> {
        self.likelihood_scale.get(index).map(String::as_str)
    }

    pub fn impact_label(&self, index: usize) -> Option<&str> {
        self.impact_scale.get(index).map(String::as_str)
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.likelihood_scale.len(), self.impact_scale.len())
    }
}

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_matrix_is_valid() {
        RiskMatrixConfig::standard().validate().unwrap();
    }

    #[test]
    fn generated_matrix_matches_sum_banding() {
        let base = RiskMatrixConfig::standard();
        let m = RiskMatrixConfig::generated(base.likelihood_scale, base.impact_scale);
        m.validate().unwrap();
        assert_eq!(m.lookup(0, 0), Some(RiskLevel::Low));
        assert_eq!(m.lookup(2, 2), Some(RiskLevel::High));
        assert_eq!(m.lookup(4, 4), Some(RiskLevel::Critical));
    }

    #[test]
    fn tiny_generated_matrix_is_valid() {
        let m = RiskMatrixConfig::generated(labels(&["lo", "hi"]), labels(&["lo", "hi"]));
        m.validate().unwrap();
        let single = RiskMatrixConfig::generated(labels(&["only"]), labels(&["only"]));
        assert_eq!(single.lookup(0, 0), Some(RiskLevel::Low));
    }

    #[test]
    fn out_of_range_lookup_is_none() {
        assert_eq!(RiskMatrixConfig::standard().lookup(5, 0), None);
    }
}
