//! The coordinator: the workflow state machine driving one assessment run.
//!
//! STAGE ORDER (fixed, never skipped, never re-entered):
//!   1. Init
//!   2. DataCollection       fan out to every registered worker
//!   3. RiskIdentification   one candidate per distinct (signal, category)
//!   4. Assessment           fan out to quantitative / qualitative assessors
//!   5. Prioritization       level desc, category priority, risk_id
//!   6. StrategyDevelopment  appetite policy → strategy per risk
//!   7. MonitoringSetup      High / Critical risks registered for monitoring
//!   8. Complete
//!
//! RULES:
//!   - A stage begins only after every task of the previous stage resolved
//!     or timed out.
//!   - A failed worker or assessor never aborts the run. The failure is
//!     attached to the affected record and listed in the final report.
//!   - Every transition and per-risk decision is written to the event log.

use crate::{
    config::{RiskConfig, WorkflowConfig},
    data_source::DataSource,
    error::{RiskError, RiskResult},
    event::{EventLogEntry, WorkflowEvent},
    monitoring_engine::{MonitoringEngine, SetupConfirmation},
    qualitative_assessor::{KeywordScorer, QualitativeAssessor, RiskInfo, RiskScorer},
    quantitative_assessor::QuantitativeAssessor,
    report::{FailureNote, FinalReport, PrioritizedRisk},
    response_strategy::{ResponseStrategy, ResponseStrategyEngine},
    risk::{Assessment, AssessmentFailure, RiskCategory, RiskLevel, RiskRecord, RiskStatus},
    risk_register::RiskRegister,
    signal::SignalReport,
    store::RiskStore,
    types::{RiskId, RunId},
    worker::SpecialistWorker,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

// ── Stages ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkflowStage {
    Init,
    DataCollection,
    RiskIdentification,
    Assessment,
    Prioritization,
    StrategyDevelopment,
    MonitoringSetup,
    Complete,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::DataCollection => "DataCollection",
            Self::RiskIdentification => "RiskIdentification",
            Self::Assessment => "Assessment",
            Self::Prioritization => "Prioritization",
            Self::StrategyDevelopment => "StrategyDevelopment",
            Self::MonitoringSetup => "MonitoringSetup",
            Self::Complete => "Complete",
        }
    }

    /// The only stage this one may move to. `Complete` is terminal.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::DataCollection),
            Self::DataCollection => Some(Self::RiskIdentification),
            Self::RiskIdentification => Some(Self::Assessment),
            Self::Assessment => Some(Self::Prioritization),
            Self::Prioritization => Some(Self::StrategyDevelopment),
            Self::StrategyDevelopment => Some(Self::MonitoringSetup),
            Self::MonitoringSetup => Some(Self::Complete),
            Self::Complete => None,
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Prioritization ───────────────────────────────────────────────────────────

/// Total order: level descending (unassessed last), then configured
/// category priority, then risk_id.
pub fn priority_cmp(a: &RiskRecord, b: &RiskRecord, workflow: &WorkflowConfig) -> Ordering {
    b.risk_level
        .cmp(&a.risk_level)
        .then_with(|| {
            workflow
                .category_rank(a.category)
                .cmp(&workflow.category_rank(b.category))
        })
        .then_with(|| a.risk_id.cmp(&b.risk_id))
}

pub fn prioritize_records(records: &mut [RiskRecord], workflow: &WorkflowConfig) {
    records.sort_by(|a, b| priority_cmp(a, b, workflow));
}

// ── Coordinator ──────────────────────────────────────────────────────────────

const QUANTITATIVE: &str = "quantitative";
const QUALITATIVE: &str = "qualitative";

pub struct Coordinator {
    pub run_id: RunId,
    config: RiskConfig,
    store: RiskStore,
    workers: Vec<Arc<dyn SpecialistWorker>>,
    quantitative: Arc<QuantitativeAssessor>,
    qualitative: Arc<QualitativeAssessor>,
    strategies: ResponseStrategyEngine,
    monitoring: Arc<MonitoringEngine>,
    register: RiskRegister,
    stage: WorkflowStage,
    event_seq: u64,
    failures: Vec<FailureNote>,
}

impl Coordinator {
    /// `config` must already be validated.
    pub fn new(
        run_id: RunId,
        config: RiskConfig,
        store: RiskStore,
        monitoring: Arc<MonitoringEngine>,
    ) -> Self {
        let scorer = Box::new(KeywordScorer::new(config.scoring.policy.clone()));
        let quantitative = QuantitativeAssessor::new(
            config.scoring.stress_scenarios.clone(),
            config.workflow.seed,
        );
        let strategies = ResponseStrategyEngine::new(config.workflow.max_control_suggestions);
        let qualitative = QualitativeAssessor::new(
            config.risk_matrix.clone(),
            scorer,
            config.scoring.rules.clone(),
        );
        Self {
            run_id,
            config,
            store,
            workers: Vec::new(),
            quantitative: Arc::new(quantitative),
            qualitative: Arc::new(qualitative),
            strategies,
            monitoring,
            register: RiskRegister::new(),
            stage: WorkflowStage::Init,
            event_seq: 0,
            failures: Vec::new(),
        }
    }

    /// Coordinator on an in-memory store with the test config.
    pub fn build_test(source: Arc<dyn DataSource>) -> RiskResult<Self> {
        let store = RiskStore::in_memory()?;
        store.migrate()?;
        let config = RiskConfig::default_test();
        let monitoring = Arc::new(MonitoringEngine::from_config(&config, source));
        Ok(Self::new("test-run".into(), config, store, monitoring))
    }

    /// Replace the qualitative scorer.
    pub fn with_scorer(mut self, scorer: Box<dyn RiskScorer>) -> Self {
        self.qualitative = Arc::new(QualitativeAssessor::new(
            self.config.risk_matrix.clone(),
            scorer,
            self.config.scoring.rules.clone(),
        ));
        self
    }

    /// Register a worker. Workers are dispatched in registration order.
    pub fn register_worker(&mut self, worker: Arc<dyn SpecialistWorker>) {
        self.workers.push(worker);
    }

    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    pub fn register(&self) -> &RiskRegister {
        &self.register
    }

    pub fn monitoring(&self) -> &Arc<MonitoringEngine> {
        &self.monitoring
    }

    pub fn store(&self) -> &RiskStore {
        &self.store
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Run the whole workflow once. Only valid from `Init`.
    pub async fn start(&mut self, context: &str) -> RiskResult<FinalReport> {
        if self.stage != WorkflowStage::Init {
            return Err(RiskError::InvalidTransition {
                from: self.stage.to_string(),
                to: WorkflowStage::DataCollection.to_string(),
            });
        }

        let started_at = Utc::now();
        self.store.insert_run(
            &self.run_id,
            self.config.workflow.seed,
            env!("CARGO_PKG_VERSION"),
            context,
            started_at,
        )?;
        self.emit(WorkflowEvent::RunStarted {
            run_id: self.run_id.clone(),
            context: context.to_string(),
        })?;
        log::info!("run={} started: {context}", self.run_id);

        self.advance(WorkflowStage::DataCollection)?;
        let reports = self.collect_signals().await?;

        self.advance(WorkflowStage::RiskIdentification)?;
        self.identify_risks(&reports)?;

        self.advance(WorkflowStage::Assessment)?;
        self.assess_risks().await?;

        self.advance(WorkflowStage::Prioritization)?;
        let ordered = self.prioritize()?;

        self.advance(WorkflowStage::StrategyDevelopment)?;
        let strategies = self.develop_strategies(&ordered)?;

        self.advance(WorkflowStage::MonitoringSetup)?;
        let monitoring = self.setup_monitoring(&ordered, &strategies).await?;

        self.advance(WorkflowStage::Complete)?;
        let completed_at = Utc::now();

        let mut strategies = strategies;
        let prioritized: Vec<PrioritizedRisk> = ordered
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                self.register.get(id).map(|record| PrioritizedRisk {
                    rank: i + 1,
                    record: record.clone(),
                    strategy: strategies.remove(id),
                })
            })
            .collect();

        self.persist_register()?;
        self.store.complete_run(&self.run_id, completed_at)?;
        self.emit(WorkflowEvent::RunCompleted {
            run_id: self.run_id.clone(),
            risks: prioritized.len(),
            failures: self.failures.len(),
        })?;
        log::info!(
            "run={} complete: {} risks, {} failures",
            self.run_id,
            prioritized.len(),
            self.failures.len()
        );

        Ok(FinalReport {
            run_id: self.run_id.clone(),
            context: context.to_string(),
            started_at,
            completed_at,
            workers_dispatched: self.workers.len(),
            signals_collected: reports.iter().map(SignalReport::signal_count).sum(),
            prioritized,
            monitoring,
            failures: self.failures.clone(),
        })
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn advance(&mut self, to: WorkflowStage) -> RiskResult<()> {
        if self.stage.next() != Some(to) {
            return Err(RiskError::InvalidTransition {
                from: self.stage.to_string(),
                to: to.to_string(),
            });
        }
        self.stage = to;
        log::info!("run={} stage={to}", self.run_id);
        self.emit(WorkflowEvent::StageEntered { stage: to })
    }

    fn emit(&mut self, event: WorkflowEvent) -> RiskResult<()> {
        self.event_seq += 1;
        let entry = EventLogEntry {
            id: None,
            run_id: self.run_id.clone(),
            seq: self.event_seq,
            stage: self.stage.to_string(),
            event_type: event.event_type().to_string(),
            payload: serde_json::to_string(&event)?,
        };
        self.store.append_event(&entry, Utc::now())
    }

    fn note_failure(&mut self, subject: &str, message: String) {
        self.failures.push(FailureNote {
            stage: self.stage,
            subject: subject.to_string(),
            message,
        });
    }

    /// Reports from every worker that answered in time, sorted by source_id.
    async fn collect_signals(&mut self) -> RiskResult<Vec<SignalReport>> {
        let timeout = Duration::from_millis(self.config.workflow.worker_timeout_ms);
        let ids: Vec<String> = self.workers.iter().map(|w| w.id().to_string()).collect();

        let mut tasks = JoinSet::new();
        for (index, worker) in self.workers.iter().enumerate() {
            let worker = Arc::clone(worker);
            tasks.spawn(async move {
                let worker_id = worker.id().to_string();
                let result = match tokio::time::timeout(timeout, worker.invoke()).await {
                    Ok(Ok(report)) => Ok(report),
                    Ok(Err(e)) => Err(RiskError::WorkerUnavailable {
                        worker_id,
                        reason: e.to_string(),
                    }),
                    Err(_) => Err(RiskError::WorkerUnavailable {
                        worker_id,
                        reason: format!("timed out after {timeout:?}"),
                    }),
                };
                (index, result)
            });
        }

        let mut results = Vec::with_capacity(ids.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => log::error!("run={} worker task failed: {e}", self.run_id),
            }
        }
        results.sort_by_key(|(index, _)| *index);

        let answered: BTreeSet<usize> = results.iter().map(|(index, _)| *index).collect();
        let mut reports = Vec::new();
        for (index, result) in results {
            match result {
                Ok(report) => {
                    log::debug!(
                        "run={} worker {} returned {} signals",
                        self.run_id,
                        report.source_id,
                        report.signal_count()
                    );
                    self.emit(WorkflowEvent::SignalsCollected {
                        worker_id: ids[index].clone(),
                        signal_count: report.signal_count(),
                    })?;
                    reports.push(report);
                }
                Err(e) => {
                    log::warn!("run={} {e}", self.run_id);
                    self.note_failure(&ids[index], e.to_string());
                    self.emit(WorkflowEvent::WorkerFailed {
                        worker_id: ids[index].clone(),
                        reason: e.to_string(),
                    })?;
                }
            }
        }
        for (index, worker_id) in ids.iter().enumerate() {
            if !answered.contains(&index) {
                let reason = "worker task aborted".to_string();
                self.note_failure(worker_id, format!("Worker '{worker_id}' unavailable: {reason}"));
                self.emit(WorkflowEvent::WorkerFailed {
                    worker_id: worker_id.clone(),
                    reason,
                })?;
            }
        }

        reports.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(reports)
    }

    fn identify_risks(&mut self, reports: &[SignalReport]) -> RiskResult<()> {
        let mut seen: BTreeMap<(String, RiskCategory), RiskId> = BTreeMap::new();
        for report in reports {
            for (bucket, signal) in report.actionable_entries() {
                let category = self.config.workflow.category_for_bucket(bucket);
                let factor = format!("{}/{bucket}", report.source_id);
                let key = (signal.to_string(), category);

                if let Some(risk_id) = seen.get(&key) {
                    self.register.merge_factors(risk_id, [factor])?;
                    continue;
                }
                let risk_id =
                    self.register
                        .add_candidate(signal, category, BTreeSet::from([factor]));
                self.emit(WorkflowEvent::RiskIdentified {
                    risk_id: risk_id.clone(),
                    category,
                    description: signal.to_string(),
                })?;
                seen.insert(key, risk_id);
            }
        }
        log::info!(
            "run={} identified {} candidate risks",
            self.run_id,
            self.register.len()
        );
        Ok(())
    }

    async fn assess_risks(&mut self) -> RiskResult<()> {
        let timeout = Duration::from_millis(self.config.workflow.assessor_timeout_ms);
        let method = self.config.workflow.qualitative_method.clone();
        let candidates: Vec<RiskRecord> = self.register.records().cloned().collect();

        // (candidate index, assessor order) → outcome
        let mut outcomes: BTreeMap<(usize, usize), Assessment> = BTreeMap::new();
        let mut expected: BTreeSet<(usize, usize)> = BTreeSet::new();
        let mut tasks = JoinSet::new();

        for (index, record) in candidates.iter().enumerate() {
            let route = record.category.assessment_route();

            if route.quantitative() {
                expected.insert((index, 0));
                match self.config.workflow.quantitative_inputs.get(&record.category) {
                    Some(input) => {
                        let assessor = Arc::clone(&self.quantitative);
                        let input = input.clone();
                        let description = record.description.clone();
                        tasks.spawn(async move {
                            let handle = tokio::task::spawn_blocking(move || {
                                assessor.assess(
                                    &description,
                                    &input.data,
                                    &input.assessment_type,
                                    &input.parameters,
                                )
                            });
                            let outcome = match tokio::time::timeout(timeout, handle).await {
                                Ok(Ok(Ok(result))) => Assessment::Quantitative(result),
                                Ok(Ok(Err(e))) => failed(QUANTITATIVE, e),
                                Ok(Err(e)) => {
                                    failed(QUANTITATIVE, format!("assessor task failed: {e}"))
                                }
                                Err(_) => {
                                    failed(QUANTITATIVE, format!("timed out after {timeout:?}"))
                                }
                            };
                            ((index, 0), outcome)
                        });
                    }
                    None => {
                        let e = RiskError::InsufficientData {
                            assessment: QUANTITATIVE.into(),
                            reason: format!(
                                "no quantitative inputs configured for {}",
                                record.category
                            ),
                        };
                        outcomes.insert((index, 0), failed(QUANTITATIVE, e));
                    }
                }
            }

            if route.qualitative() {
                expected.insert((index, 1));
                let assessor = Arc::clone(&self.qualitative);
                let risk_id = record.risk_id.clone();
                let info = RiskInfo::from(record);
                let method = method.clone();
                tasks.spawn(async move {
                    let handle = tokio::task::spawn_blocking(move || {
                        assessor.assess(&risk_id, &info, &method)
                    });
                    let outcome = match tokio::time::timeout(timeout, handle).await {
                        Ok(Ok(result)) => Assessment::Qualitative(result),
                        Ok(Err(e)) => failed(QUALITATIVE, format!("assessor task failed: {e}")),
                        Err(_) => failed(QUALITATIVE, format!("timed out after {timeout:?}")),
                    };
                    ((index, 1), outcome)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, outcome)) => {
                    outcomes.insert(key, outcome);
                }
                Err(e) => log::error!("run={} assessment task failed: {e}", self.run_id),
            }
        }
        for key in expected {
            outcomes.entry(key).or_insert_with(|| {
                let assessor = if key.1 == 0 { QUANTITATIVE } else { QUALITATIVE };
                failed(assessor, "assessment task aborted")
            });
        }

        let bands = self.config.scoring.level_bands.clone();
        for (index, record) in candidates.iter().enumerate() {
            let assessments: Vec<Assessment> = outcomes
                .range((index, 0)..=(index, 1))
                .map(|(_, a)| a.clone())
                .collect();

            let level: Option<RiskLevel> = assessments
                .iter()
                .filter_map(|a| match a {
                    Assessment::Quantitative(q) => Some(bands.level_for(q.loss_ratio)),
                    Assessment::Qualitative(q) => Some(q.risk_level),
                    Assessment::Failed(_) => None,
                })
                .max();

            let failures: Vec<AssessmentFailure> = assessments
                .iter()
                .filter_map(|a| match a {
                    Assessment::Failed(f) => Some(f.clone()),
                    _ => None,
                })
                .collect();
            for failure in &failures {
                log::warn!(
                    "run={} assessment failed for {} ({}): {}",
                    self.run_id,
                    record.risk_id,
                    failure.assessor,
                    failure.error
                );
                self.note_failure(
                    &record.risk_id,
                    format!(
                        "assessment failed for {} ({}): {}",
                        record.risk_id, failure.assessor, failure.error
                    ),
                );
            }

            self.register
                .record_assessment(&record.risk_id, assessments, level)?;
            self.emit(WorkflowEvent::RiskAssessed {
                risk_id: record.risk_id.clone(),
                risk_level: level,
                failures: failures.len(),
            })?;
        }
        Ok(())
    }

    /// Ids in priority order; every record advances to Prioritized.
    fn prioritize(&mut self) -> RiskResult<Vec<RiskId>> {
        let mut records: Vec<RiskRecord> = self.register.records().cloned().collect();
        prioritize_records(&mut records, &self.config.workflow);

        let ordered: Vec<RiskId> = records.into_iter().map(|r| r.risk_id).collect();
        for (i, risk_id) in ordered.iter().enumerate() {
            self.register.advance(risk_id, RiskStatus::Prioritized)?;
            self.emit(WorkflowEvent::RiskPrioritized {
                risk_id: risk_id.clone(),
                rank: i + 1,
            })?;
        }
        Ok(ordered)
    }

    fn develop_strategies(
        &mut self,
        ordered: &[RiskId],
    ) -> RiskResult<BTreeMap<RiskId, ResponseStrategy>> {
        let records: Vec<RiskRecord> = ordered
            .iter()
            .filter_map(|id| self.register.get(id).cloned())
            .collect();
        let strategies = self.strategies.develop(
            &records,
            &self.config.appetite,
            &self.config.control_library,
        );

        for risk_id in ordered {
            let Some(strategy) = strategies.get(risk_id) else {
                continue;
            };
            self.register.advance(risk_id, RiskStatus::Strategized)?;
            self.emit(WorkflowEvent::StrategyAssigned {
                risk_id: risk_id.clone(),
                strategy: strategy.strategy,
            })?;
        }
        Ok(strategies)
    }

    async fn setup_monitoring(
        &mut self,
        ordered: &[RiskId],
        strategies: &BTreeMap<RiskId, ResponseStrategy>,
    ) -> RiskResult<Vec<SetupConfirmation>> {
        let definitions = self.config.kri_definition_map();
        let mut confirmations = Vec::new();

        for risk_id in ordered {
            let Some(record) = self.register.get(risk_id) else {
                continue;
            };
            let Some(level) = record.risk_level else {
                continue;
            };
            if !level.requires_monitoring() {
                continue;
            }

            let kris = self
                .config
                .workflow
                .monitoring_kris
                .get(&record.category)
                .cloned()
                .unwrap_or_default();
            let controls = strategies
                .get(risk_id)
                .map(|s| s.control_ids.clone())
                .unwrap_or_default();

            let confirmation = self
                .monitoring
                .setup_monitoring(risk_id, &kris, &controls, &definitions)
                .await;
            for kri_id in &confirmation.missing_definitions {
                self.note_failure(
                    kri_id,
                    format!("KRI '{kri_id}' for {risk_id} has no definition; monitoring degraded"),
                );
            }

            self.register.advance(risk_id, RiskStatus::Monitored)?;
            self.emit(WorkflowEvent::MonitoringRegistered {
                risk_id: risk_id.clone(),
                kris,
                controls,
            })?;
            confirmations.push(confirmation);
        }
        Ok(confirmations)
    }

    fn persist_register(&self) -> RiskResult<()> {
        for record in self.register.records() {
            self.store.upsert_risk_record(&self.run_id, record)?;
        }
        for change in self.register.history() {
            self.store.append_status_change(&self.run_id, change)?;
        }
        Ok(())
    }
}

fn failed(assessor: &str, error: impl fmt::Display) -> Assessment {
    Assessment::Failed(AssessmentFailure {
        assessor: assessor.to_string(),
        error: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_in_fixed_order() {
        let mut stage = WorkflowStage::Init;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            stage = next;
            seen.push(stage);
        }
        assert_eq!(seen.len(), 8);
        assert_eq!(stage, WorkflowStage::Complete);
    }

    #[test]
    fn unassessed_records_sort_last() {
        let workflow = WorkflowConfig::default();
        let record = |id: &str, category, level| {
            let mut r = RiskRecord::candidate(id.into(), id, category, BTreeSet::new());
            r.risk_level = level;
            r
        };
        let mut records = vec![
            record("RISK-001", RiskCategory::Strategic, None),
            record("RISK-002", RiskCategory::Operational, Some(RiskLevel::Low)),
            record("RISK-003", RiskCategory::Compliance, Some(RiskLevel::High)),
            record("RISK-004", RiskCategory::Financial, Some(RiskLevel::High)),
        ];
        prioritize_records(&mut records, &workflow);
        let ids: Vec<_> = records.iter().map(|r| r.risk_id.as_str()).collect();
        assert_eq!(ids, vec!["RISK-004", "RISK-003", "RISK-002", "RISK-001"]);
    }
}
