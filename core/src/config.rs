//! Configuration loaded once at startup and treated as immutable input.
//!
//! Files under the data directory:
//!   risk/risk_matrix.json          likelihood × impact matrix
//!   risk/appetite.json             category → level → strategy guidance
//!   risk/control_library.json      category → controls
//!   risk/scoring_policy.json       qualitative scoring, rules, stress scenarios, level bands
//!   monitoring/kri_definitions.json
//!   workflow/workflow.json         timeouts, routing, priorities, monitoring limits
//!
//! RULE: `validate()` runs inside `load()`. A config that fails validation
//! never reaches the pipeline.

use crate::{
    alert::DEFAULT_ALERT_CAPACITY,
    error::{RiskError, RiskResult},
    monitoring_engine::{KriDefinition, Operator, DEFAULT_REPORT_ALERTS},
    qualitative_assessor::{default_rules, QualitativeRule, ScoringPolicy},
    quantitative_assessor::{
        AssessmentParameters, AssessmentType, GENERIC_STRESS, GENERIC_STRESS_SHOCK,
    },
    response_strategy::{AppetiteConfig, ControlDefinition, ControlLibrary, DEFAULT_KEY},
    risk::{RiskCategory, RiskLevel},
    risk_matrix::RiskMatrixConfig,
    types::KriId,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ── Scoring ──────────────────────────────────────────────────────────────────

/// Loss-ratio thresholds that turn a quantitative result into a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelBands {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl LevelBands {
    pub fn level_for(&self, loss_ratio: f64) -> RiskLevel {
        let ratio = loss_ratio.abs();
        if ratio >= self.critical {
            RiskLevel::Critical
        } else if ratio >= self.high {
            RiskLevel::High
        } else if ratio >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl Default for LevelBands {
    fn default() -> Self {
        Self {
            medium: 0.01,
            high: 0.025,
            critical: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub policy: ScoringPolicy,
    pub rules: Vec<QualitativeRule>,
    pub stress_scenarios: BTreeMap<String, f64>,
    pub level_bands: LevelBands,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let stress_scenarios = [
            (GENERIC_STRESS.to_string(), GENERIC_STRESS_SHOCK),
            ("Market Crash".to_string(), -0.2),
            ("Rate Shock".to_string(), -0.05),
        ]
        .into_iter()
        .collect();
        Self {
            policy: ScoringPolicy::default(),
            rules: default_rules(),
            stress_scenarios,
            level_bands: LevelBands::default(),
        }
    }
}

// ── Workflow ─────────────────────────────────────────────────────────────────

/// What the quantitative assessor runs for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantitativeInput {
    pub assessment_type: String,
    pub data: BTreeMap<String, f64>,
    #[serde(default)]
    pub parameters: AssessmentParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub alert_capacity: usize,
    pub report_alert_count: usize,
    pub fetch_timeout_ms: u64,
    /// Interval between scheduled cycles in the runner.
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,
}

fn default_cycle_interval_ms() -> u64 {
    1_000
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            alert_capacity: DEFAULT_ALERT_CAPACITY,
            report_alert_count: DEFAULT_REPORT_ALERTS,
            fetch_timeout_ms: 5_000,
            cycle_interval_ms: default_cycle_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub worker_timeout_ms: u64,
    pub assessor_timeout_ms: u64,
    pub qualitative_method: String,
    /// Tie-break order for equal levels; unlisted categories sort last.
    pub category_priority: Vec<RiskCategory>,
    /// Worker bucket label → risk category.
    pub bucket_categories: BTreeMap<String, RiskCategory>,
    /// Category for buckets missing from `bucket_categories`.
    pub default_category: RiskCategory,
    pub quantitative_inputs: BTreeMap<RiskCategory, QuantitativeInput>,
    /// KRIs registered for High/Critical risks of each category.
    pub monitoring_kris: BTreeMap<RiskCategory, Vec<KriId>>,
    pub monitoring: MonitoringConfig,
    /// Library controls suggested per Mitigate strategy.
    #[serde(default = "default_max_control_suggestions")]
    pub max_control_suggestions: usize,
    pub seed: u64,
}

fn default_max_control_suggestions() -> usize {
    2
}

impl WorkflowConfig {
    pub fn category_for_bucket(&self, bucket: &str) -> RiskCategory {
        self.bucket_categories
            .get(bucket)
            .copied()
            .unwrap_or(self.default_category)
    }

    /// Position in the priority list; unlisted categories rank after all listed ones.
    pub fn category_rank(&self, category: RiskCategory) -> usize {
        self.category_priority
            .iter()
            .position(|c| *c == category)
            .unwrap_or(self.category_priority.len())
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        use RiskCategory::*;

        let bucket_categories = [
            ("economic", Financial),
            ("financial", Financial),
            ("market", Market),
            ("competitor", Strategic),
            ("technological", Strategic),
            ("regulatory", Compliance),
            ("compliance", Compliance),
            ("news", Reputational),
            ("social", Reputational),
            ("operational_issues", Operational),
            ("process_weaknesses", Operational),
            ("employee_concerns", Operational),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let mut quantitative_inputs = BTreeMap::new();
        quantitative_inputs.insert(
            Financial,
            QuantitativeInput {
                assessment_type: "VaR".into(),
                data: numbers(&[("portfolio_value", 1_000_000.0), ("volatility", 0.2)]),
                parameters: AssessmentParameters::default(),
            },
        );
        quantitative_inputs.insert(
            Market,
            QuantitativeInput {
                assessment_type: "StressTest".into(),
                data: numbers(&[("portfolio_value", 1_000_000.0)]),
                parameters: AssessmentParameters {
                    scenario_name: Some("Market Crash".into()),
                    ..Default::default()
                },
            },
        );
        quantitative_inputs.insert(
            Strategic,
            QuantitativeInput {
                assessment_type: "MonteCarlo".into(),
                data: numbers(&[("portfolio_value", 500_000.0)]),
                parameters: AssessmentParameters {
                    num_simulations: Some(2_000),
                    dispersion: Some(0.01),
                    ..Default::default()
                },
            },
        );

        let monitoring_kris = [
            (Operational, vec!["KRI_CPU", "KRI_ERR"]),
            (Financial, vec!["KRI_VAR"]),
            (Market, vec!["KRI_VAR"]),
            (Reputational, vec!["KRI_NPS"]),
        ]
        .into_iter()
        .map(|(c, kris)| (c, kris.into_iter().map(String::from).collect()))
        .collect();

        Self {
            worker_timeout_ms: 5_000,
            assessor_timeout_ms: 5_000,
            qualitative_method: "RiskMatrix".into(),
            category_priority: vec![
                Financial,
                Market,
                Operational,
                Compliance,
                Reputational,
                Strategic,
            ],
            bucket_categories,
            default_category: Strategic,
            quantitative_inputs,
            monitoring_kris,
            monitoring: MonitoringConfig::default(),
            max_control_suggestions: default_max_control_suggestions(),
            seed: 42,
        }
    }
}

// ── Root ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub risk_matrix: RiskMatrixConfig,
    pub appetite: AppetiteConfig,
    pub control_library: ControlLibrary,
    pub scoring: ScoringConfig,
    pub kri_definitions: Vec<KriDefinition>,
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct KriDefinitionsFile {
    kri_definitions: Vec<KriDefinition>,
}

impl RiskConfig {
    /// Load from JSON files under `data_dir`.
    /// In tests, use RiskConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let risk_matrix: RiskMatrixConfig =
            read_json(&format!("{data_dir}/risk/risk_matrix.json"))?;
        let appetite: AppetiteConfig = read_json(&format!("{data_dir}/risk/appetite.json"))?;
        let control_library: ControlLibrary =
            read_json(&format!("{data_dir}/risk/control_library.json"))?;
        let scoring: ScoringConfig = read_json(&format!("{data_dir}/risk/scoring_policy.json"))?;
        let kri_file: KriDefinitionsFile =
            read_json(&format!("{data_dir}/monitoring/kri_definitions.json"))?;
        let workflow: WorkflowConfig = read_json(&format!("{data_dir}/workflow/workflow.json"))?;

        let config = Self {
            risk_matrix,
            appetite,
            control_library,
            scoring,
            kri_definitions: kri_file.kri_definitions,
            workflow,
        };
        config.validate()?;
        log::info!(
            "config: loaded from {data_dir} ({} KRIs, {} appetite rows)",
            config.kri_definitions.len(),
            config.appetite.len()
        );
        Ok(config)
    }

    /// Eager startup checks. Every failure is `RiskError::Configuration`.
    pub fn validate(&self) -> RiskResult<()> {
        self.risk_matrix.validate()?;

        for row in self.appetite.keys() {
            if row != DEFAULT_KEY && !RiskCategory::ALL.iter().any(|c| c.as_str() == row) {
                return Err(RiskError::Configuration(format!(
                    "appetite row '{row}' is not a known category"
                )));
            }
        }
        for category in self.control_library.keys() {
            if !RiskCategory::ALL.iter().any(|c| c.as_str() == category) {
                return Err(RiskError::Configuration(format!(
                    "control library category '{category}' is not a known category"
                )));
            }
        }

        let bands = &self.scoring.level_bands;
        if !(0.0 <= bands.medium && bands.medium <= bands.high && bands.high <= bands.critical) {
            return Err(RiskError::Configuration(format!(
                "level bands must ascend: medium {} high {} critical {}",
                bands.medium, bands.high, bands.critical
            )));
        }
        for rule in &self.scoring.rules {
            if rule.category.is_none() && rule.keywords.is_empty() {
                return Err(RiskError::Configuration(format!(
                    "rule '{}' has neither category nor keywords",
                    rule.rule_id
                )));
            }
        }

        let workflow = &self.workflow;
        for (category, input) in &workflow.quantitative_inputs {
            AssessmentType::parse(&input.assessment_type).map_err(|_| {
                RiskError::Configuration(format!(
                    "quantitative input for {category} names unknown type '{}'",
                    input.assessment_type
                ))
            })?;
        }
        let unique: BTreeSet<_> = workflow.category_priority.iter().collect();
        if unique.len() != workflow.category_priority.len() {
            return Err(RiskError::Configuration(
                "category_priority lists a category twice".into(),
            ));
        }
        if workflow.monitoring.alert_capacity == 0 {
            return Err(RiskError::Configuration(
                "alert_capacity must be > 0".into(),
            ));
        }
        if workflow.worker_timeout_ms == 0 || workflow.assessor_timeout_ms == 0 {
            return Err(RiskError::Configuration("timeouts must be > 0".into()));
        }
        let monitoring = &workflow.monitoring;
        if monitoring.fetch_timeout_ms == 0 || monitoring.cycle_interval_ms == 0 {
            return Err(RiskError::Configuration(
                "fetch_timeout_ms and cycle_interval_ms must be > 0".into(),
            ));
        }
        if workflow.max_control_suggestions == 0 {
            return Err(RiskError::Configuration("max_control_suggestions must be > 0".into()));
        }

        let mut seen = BTreeSet::new();
        for def in &self.kri_definitions {
            if !seen.insert(def.kri_id.as_str()) {
                return Err(RiskError::Configuration(format!(
                    "KRI '{}' defined twice",
                    def.kri_id
                )));
            }
        }
        Ok(())
    }

    pub fn kri_definition_map(&self) -> BTreeMap<KriId, KriDefinition> {
        self.kri_definitions
            .iter()
            .map(|d| (d.kri_id.clone(), d.clone()))
            .collect()
    }

    /// Hard-coded config for tests. Mirrors the files shipped under data/.
    pub fn default_test() -> Self {
        let appetite = [
            (
                "Operational",
                [
                    ("Low", "Accept"),
                    ("Medium", "Mitigate"),
                    ("High", "Mitigate/Transfer"),
                    ("Critical", "Avoid/Transfer"),
                    ("Default", "Accept"),
                ],
            ),
            (
                "Financial",
                [
                    ("Low", "Accept"),
                    ("Medium", "Mitigate"),
                    ("High", "Transfer/Mitigate"),
                    ("Critical", "Transfer/Avoid"),
                    ("Default", "Accept"),
                ],
            ),
            (
                "Reputational",
                [
                    ("Low", "Accept"),
                    ("Medium", "Mitigate"),
                    ("High", "Mitigate"),
                    ("Critical", "Mitigate/Avoid"),
                    ("Default", "Accept"),
                ],
            ),
            (
                "Compliance",
                [
                    ("Low", "Mitigate"),
                    ("Medium", "Mitigate"),
                    ("High", "Mitigate"),
                    ("Critical", "Mitigate"),
                    ("Default", "Mitigate"),
                ],
            ),
            (
                "Default",
                [
                    ("Low", "Accept"),
                    ("Medium", "Accept"),
                    ("High", "Mitigate"),
                    ("Critical", "Avoid/Transfer"),
                    ("Default", "Accept"),
                ],
            ),
        ]
        .into_iter()
        .map(|(category, row)| {
            (
                category.to_string(),
                row.into_iter()
                    .map(|(level, guidance)| (level.to_string(), guidance.to_string()))
                    .collect(),
            )
        })
        .collect();

        let control = |id: &str, name: &str, cost: &str, effectiveness: &str| ControlDefinition {
            id: id.into(),
            name: name.into(),
            cost: Some(cost.into()),
            effectiveness: effectiveness.into(),
        };
        let mut control_library = ControlLibrary::new();
        control_library.insert(
            "Operational".into(),
            vec![
                control("CTRL-OP-01", "Implement Redundant Server", "High", "High"),
                control("CTRL-OP-02", "Regular Data Backups", "Medium", "High"),
                control("CTRL-OP-03", "Hardware Maintenance Schedule", "Medium", "Medium"),
            ],
        );
        control_library.insert(
            "Financial".into(),
            vec![
                control(
                    "CTRL-FIN-01",
                    "Hedging Instruments (e.g., Futures, Options)",
                    "Variable",
                    "Medium-High",
                ),
                control("CTRL-FIN-02", "Diversification of Investments", "Low", "Medium"),
            ],
        );
        control_library.insert(
            "Compliance".into(),
            vec![
                control("CTRL-CMP-01", "Mandatory Compliance Training", "Medium", "Medium"),
                control("CTRL-CMP-02", "Automated Compliance Checks", "High", "High"),
            ],
        );

        let kri = |id: &str, threshold: f64, operator: Operator, source: &str, freq: &str| {
            KriDefinition {
                kri_id: id.into(),
                threshold,
                operator,
                data_source_ref: source.into(),
                sampling_frequency: freq.into(),
            }
        };
        let kri_definitions = vec![
            kri("KRI_CPU", 90.0, Operator::Gt, "internal_monitoring_system", "hourly"),
            kri("KRI_ERR", 5.0, Operator::Gt, "log_aggregator", "daily"),
            kri("KRI_VAR", 100_000.0, Operator::Gt, "quant_assessment_output", "daily"),
            kri("KRI_NPS", 30.0, Operator::Lt, "customer_survey_platform", "monthly"),
        ];

        Self {
            risk_matrix: RiskMatrixConfig::standard(),
            appetite,
            control_library,
            scoring: ScoringConfig::default(),
            kri_definitions,
            workflow: WorkflowConfig::default(),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
}

fn numbers(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}
