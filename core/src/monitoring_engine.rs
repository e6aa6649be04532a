//! Monitoring engine: KRIs, control effectiveness and alerting.
//!
//! This engine:
//!   1. Registers risks with their KRIs and controls (idempotent upsert)
//!   2. Runs monitoring cycles: KRI readings against thresholds, control checks
//!   3. Raises alerts into a bounded FIFO buffer
//!   4. Produces read-only monitoring reports
//!
//! RULES:
//!   - The engine is the only writer of its state. Callers go through the
//!     operations below.
//!   - Work on one risk_id is serialized through a per-risk lock. Different
//!     risks proceed concurrently.
//!   - No lock is held while a data source is being called. Readings are
//!     fetched first and merged afterwards under a short exclusive update.
//!   - Each control is checked at most once per cycle, however many risks
//!     reference it.
//!   - A KRI definition is only replaced through `update_kri_definition`.

use crate::{
    alert::{Alert, AlertBuffer, AlertKind, BreachDetail, DEFAULT_ALERT_CAPACITY},
    config::RiskConfig,
    data_source::DataSource,
    error::{RiskError, RiskResult},
    report::{ControlSummary, KriSummary, MonitoredRiskSummary, MonitoringReport, ReportType},
    types::{ControlId, KriId, RiskId, Timestamp},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

pub const DEFAULT_REPORT_ALERTS: usize = 10;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const MIN_CYCLE_INTERVAL: Duration = Duration::from_millis(1);

// ── Definitions ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "==",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }

    pub fn breached(&self, current: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => current > threshold,
            Self::Lt => current < threshold,
            Self::Eq => current == threshold,
            Self::Ge => current >= threshold,
            Self::Le => current <= threshold,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KriDefinition {
    pub kri_id: KriId,
    pub threshold: f64,
    pub operator: Operator,
    #[serde(alias = "data_source")]
    pub data_source_ref: String,
    #[serde(alias = "frequency")]
    pub sampling_frequency: String,
}

impl KriDefinition {
    pub fn breached(&self, current: f64) -> bool {
        self.operator.breached(current, self.threshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitoringStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredRisk {
    pub risk_id: RiskId,
    pub kri_ids: BTreeSet<KriId>,
    pub control_ids: BTreeSet<ControlId>,
    pub status: MonitoringStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effectiveness {
    Effective,
    Ineffective,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlStatus {
    pub control_id: ControlId,
    pub effectiveness: Effectiveness,
    pub last_checked: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KriReading {
    pub value: f64,
    pub breached: bool,
    pub observed_at: Timestamp,
}

// ── Operation results ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupConfirmation {
    pub risk_id: RiskId,
    pub added_kris: Vec<KriId>,
    pub added_controls: Vec<ControlId>,
    /// KRIs on this risk that have no definition; skipped during cycles.
    pub missing_definitions: Vec<KriId>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub started_at: Timestamp,
    pub risks_monitored: usize,
    pub kris_evaluated: usize,
    pub kris_skipped: usize,
    pub kri_breaches: usize,
    pub controls_checked: usize,
    pub control_issues: usize,
    pub errors: usize,
    pub alerts: Vec<Alert>,
    pub summary: String,
}

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MonitoringState {
    cycle: u64,
    risks: BTreeMap<RiskId, MonitoredRisk>,
    definitions: BTreeMap<KriId, KriDefinition>,
    readings: BTreeMap<KriId, KriReading>,
    controls: BTreeMap<ControlId, ControlStatus>,
    alerts: AlertBuffer,
}

/// One lock per risk_id, created on first use.
#[derive(Default)]
struct RiskLocks(Mutex<HashMap<RiskId, Arc<tokio::sync::Mutex<()>>>>);

impl RiskLocks {
    fn for_risk(&self, risk_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(risk_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Per-risk work captured at the start of a cycle.
struct RiskSnapshot {
    risk_id: RiskId,
    definitions: Vec<KriDefinition>,
    skipped: usize,
}

struct KriOutcome {
    risk_id: RiskId,
    evaluated: usize,
    alerts: Vec<Alert>,
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct MonitoringEngine {
    state: Arc<Mutex<MonitoringState>>,
    locks: Arc<RiskLocks>,
    source: Arc<dyn DataSource>,
    fetch_timeout: Duration,
    report_alert_count: usize,
}

impl MonitoringEngine {
    pub fn new(
        source: Arc<dyn DataSource>,
        alert_capacity: usize,
        report_alert_count: usize,
        fetch_timeout: Duration,
    ) -> Self {
        let state = MonitoringState {
            alerts: AlertBuffer::new(alert_capacity),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            locks: Arc::new(RiskLocks::default()),
            source,
            fetch_timeout,
            report_alert_count,
        }
    }

    /// Engine wired from config, with the configured KRI definitions preloaded.
    pub fn from_config(config: &RiskConfig, source: Arc<dyn DataSource>) -> Self {
        let monitoring = &config.workflow.monitoring;
        let engine = Self::new(
            source,
            monitoring.alert_capacity,
            monitoring.report_alert_count,
            Duration::from_millis(monitoring.fetch_timeout_ms),
        );
        {
            let mut state = engine.lock_state();
            for def in &config.kri_definitions {
                state.definitions.insert(def.kri_id.clone(), def.clone());
            }
        }
        engine
    }

    /// Engine with default limits; used in tests.
    pub fn with_source(source: Arc<dyn DataSource>) -> Self {
        Self::new(
            source,
            DEFAULT_ALERT_CAPACITY,
            DEFAULT_REPORT_ALERTS,
            DEFAULT_FETCH_TIMEOUT,
        )
    }

    fn lock_state(&self) -> MutexGuard<'_, MonitoringState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Setup ────────────────────────────────────────────────────────────────

    /// Idempotent upsert of a monitored risk. Items already present are
    /// no-ops; supplied definitions are added only where none exists.
    pub async fn setup_monitoring(
        &self,
        risk_id: &str,
        kris: &[KriId],
        controls: &[ControlId],
        kri_definitions: &BTreeMap<KriId, KriDefinition>,
    ) -> SetupConfirmation {
        let lock = self.locks.for_risk(risk_id);
        let _guard = lock.lock().await;
        let mut state = self.lock_state();
        let state = &mut *state;

        let entry = state
            .risks
            .entry(risk_id.to_string())
            .or_insert_with(|| MonitoredRisk {
                risk_id: risk_id.to_string(),
                kri_ids: BTreeSet::new(),
                control_ids: BTreeSet::new(),
                status: MonitoringStatus::Active,
            });

        let mut added_kris = Vec::new();
        for kri_id in kris {
            if entry.kri_ids.insert(kri_id.clone()) {
                added_kris.push(kri_id.clone());
            }
            if let Some(def) = kri_definitions.get(kri_id) {
                match state.definitions.get(kri_id) {
                    None => {
                        state.definitions.insert(kri_id.clone(), def.clone());
                    }
                    Some(existing) if existing != def => {
                        log::debug!("monitor: definition for {kri_id} already exists, kept")
                    }
                    Some(_) => {}
                }
            }
        }

        let mut added_controls = Vec::new();
        for control_id in controls {
            if entry.control_ids.insert(control_id.clone()) {
                added_controls.push(control_id.clone());
            }
            state
                .controls
                .entry(control_id.clone())
                .or_insert_with(|| ControlStatus {
                    control_id: control_id.clone(),
                    effectiveness: Effectiveness::Unknown,
                    last_checked: None,
                });
        }

        let missing_definitions: Vec<KriId> = entry
            .kri_ids
            .iter()
            .filter(|k| !state.definitions.contains_key(*k))
            .cloned()
            .collect();
        for kri_id in &missing_definitions {
            log::warn!("monitor: KRI '{kri_id}' on {risk_id} has no definition, will be skipped");
        }

        let message = format!(
            "Monitoring setup for risk '{risk_id}'. Added KRIs: {added_kris:?}, \
             Added Controls: {added_controls:?}."
        );
        log::info!("monitor: {message}");

        SetupConfirmation {
            risk_id: risk_id.to_string(),
            added_kris,
            added_controls,
            missing_definitions,
            message,
        }
    }

    /// Explicit overwrite of a KRI definition. Returns the replaced one.
    pub fn update_kri_definition(&self, definition: KriDefinition) -> Option<KriDefinition> {
        log::info!("monitor: definition for {} updated", definition.kri_id);
        self.lock_state()
            .definitions
            .insert(definition.kri_id.clone(), definition)
    }

    pub async fn suspend(&self, risk_id: &str) -> RiskResult<()> {
        self.set_status(risk_id, MonitoringStatus::Suspended).await
    }

    pub async fn resume(&self, risk_id: &str) -> RiskResult<()> {
        self.set_status(risk_id, MonitoringStatus::Active).await
    }

    async fn set_status(&self, risk_id: &str, status: MonitoringStatus) -> RiskResult<()> {
        let lock = self.locks.for_risk(risk_id);
        let _guard = lock.lock().await;
        let mut state = self.lock_state();
        let risk = state
            .risks
            .get_mut(risk_id)
            .ok_or_else(|| RiskError::RiskNotFound(risk_id.to_string()))?;
        risk.status = status;
        log::info!("monitor: {risk_id} now {status:?}");
        Ok(())
    }

    // ── Cycle ────────────────────────────────────────────────────────────────

    /// One pass over every Active risk. Data-source failures become
    /// MonitoringError alerts; the cycle itself never fails.
    pub async fn run_monitoring_cycle(&self) -> CycleSummary {
        let started_at = Utc::now();

        let (cycle, snapshots, controls) = {
            let mut state = self.lock_state();
            state.cycle += 1;
            let mut checked = BTreeSet::new();
            let mut controls: Vec<(ControlId, RiskId)> = Vec::new();
            let mut snapshots = Vec::new();
            for risk in state
                .risks
                .values()
                .filter(|r| r.status == MonitoringStatus::Active)
            {
                let definitions: Vec<KriDefinition> = risk
                    .kri_ids
                    .iter()
                    .filter_map(|k| state.definitions.get(k).cloned())
                    .collect();
                snapshots.push(RiskSnapshot {
                    risk_id: risk.risk_id.clone(),
                    skipped: risk.kri_ids.len() - definitions.len(),
                    definitions,
                });
                for control_id in &risk.control_ids {
                    if checked.insert(control_id.clone()) {
                        controls.push((control_id.clone(), risk.risk_id.clone()));
                    }
                }
            }
            (state.cycle, snapshots, controls)
        };

        log::info!(
            "cycle={cycle} monitoring {} risks, {} distinct controls",
            snapshots.len(),
            controls.len()
        );
        let risks_monitored = snapshots.len();
        let kris_skipped: usize = snapshots.iter().map(|s| s.skipped).sum();

        let mut kri_tasks = JoinSet::new();
        for (index, snapshot) in snapshots.into_iter().enumerate() {
            let source = Arc::clone(&self.source);
            let state = Arc::clone(&self.state);
            let locks = Arc::clone(&self.locks);
            let timeout = self.fetch_timeout;
            kri_tasks.spawn(async move {
                let outcome = evaluate_risk(snapshot, source, state, locks, timeout).await;
                (index, outcome)
            });
        }

        let mut control_tasks = JoinSet::new();
        for (index, (control_id, risk_id)) in controls.into_iter().enumerate() {
            let source = Arc::clone(&self.source);
            let timeout = self.fetch_timeout;
            control_tasks.spawn(async move {
                let result = match tokio::time::timeout(
                    timeout,
                    source.check_effectiveness(&control_id),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(timed_out(&control_id, timeout)),
                };
                (index, control_id, risk_id, result)
            });
        }

        let mut kri_outcomes = Vec::new();
        while let Some(joined) = kri_tasks.join_next().await {
            match joined {
                Ok(outcome) => kri_outcomes.push(outcome),
                Err(e) => log::error!("cycle={cycle} KRI task failed: {e}"),
            }
        }
        kri_outcomes.sort_by_key(|(index, _)| *index);

        let mut control_results = Vec::new();
        while let Some(joined) = control_tasks.join_next().await {
            match joined {
                Ok(result) => control_results.push(result),
                Err(e) => log::error!("cycle={cycle} control task failed: {e}"),
            }
        }
        control_results.sort_by_key(|(index, ..)| *index);

        let mut alerts = Vec::new();
        let mut kris_evaluated = 0;
        for (_, outcome) in kri_outcomes {
            log::debug!(
                "cycle={cycle} {} evaluated {} KRIs",
                outcome.risk_id,
                outcome.evaluated
            );
            kris_evaluated += outcome.evaluated;
            alerts.extend(outcome.alerts);
        }

        let checked_at = Utc::now();
        let controls_checked = control_results.len();
        {
            let mut state = self.lock_state();
            for (_, control_id, risk_id, result) in control_results {
                match result {
                    Ok(effective) => {
                        let effectiveness = if effective {
                            Effectiveness::Effective
                        } else {
                            Effectiveness::Ineffective
                        };
                        state.controls.insert(
                            control_id.clone(),
                            ControlStatus {
                                control_id: control_id.clone(),
                                effectiveness,
                                last_checked: Some(checked_at),
                            },
                        );
                        if !effective {
                            log::warn!(
                                "cycle={cycle} control {control_id} ineffective ({risk_id})"
                            );
                            alerts.push(Alert::control_ineffective(
                                &risk_id,
                                &control_id,
                                checked_at,
                            ));
                        }
                    }
                    Err(e) => {
                        log::error!("cycle={cycle} control check {control_id} failed: {e}");
                        alerts.push(Alert::monitoring_error(&risk_id, &control_id, e, checked_at));
                    }
                }
            }
            state.alerts.extend(alerts.iter().cloned());
        }

        let count = |kind: AlertKind| alerts.iter().filter(|a| a.kind == kind).count();
        let kri_breaches = count(AlertKind::KriBreach);
        let control_issues = count(AlertKind::ControlIneffective);
        let errors = count(AlertKind::MonitoringError);

        let summary = format!(
            "Monitoring cycle completed with {kri_breaches} KRI alert(s), \
             {control_issues} control issue(s) and {errors} error(s)."
        );
        log::info!("cycle={cycle} {summary}");

        CycleSummary {
            cycle,
            started_at,
            risks_monitored,
            kris_evaluated,
            kris_skipped,
            kri_breaches,
            control_issues,
            controls_checked,
            errors,
            alerts,
            summary,
        }
    }

    // ── Reporting ────────────────────────────────────────────────────────────

    /// Read-only snapshot of the monitoring state.
    pub fn generate_report(&self, report_type: ReportType) -> MonitoringReport {
        let state = self.lock_state();

        let active = state
            .risks
            .values()
            .filter(|r| r.status == MonitoringStatus::Active)
            .count();
        let monitored_risks = MonitoredRiskSummary {
            total: state.risks.len(),
            active,
            suspended: state.risks.len() - active,
        };

        let mut missing: BTreeSet<KriId> = BTreeSet::new();
        for risk in state.risks.values() {
            missing.extend(
                risk.kri_ids
                    .iter()
                    .filter(|k| !state.definitions.contains_key(*k))
                    .cloned(),
            );
        }
        let kri_summary = KriSummary {
            total_defined: state.definitions.len(),
            missing_definitions: missing.into_iter().collect(),
            currently_breached: state
                .readings
                .iter()
                .filter(|(_, r)| r.breached)
                .map(|(k, _)| k.clone())
                .collect(),
        };

        let count = |e: Effectiveness| {
            state
                .controls
                .values()
                .filter(|c| c.effectiveness == e)
                .count()
        };
        let control_summary = ControlSummary {
            total_tracked: state.controls.len(),
            effective: count(Effectiveness::Effective),
            ineffective: count(Effectiveness::Ineffective),
            unknown: count(Effectiveness::Unknown),
        };

        let recent_alerts = match report_type {
            ReportType::Dashboard => state.alerts.all(),
            ReportType::Periodic | ReportType::OnDemand => {
                state.alerts.recent(self.report_alert_count)
            }
        };

        MonitoringReport {
            report_type,
            generated_at: Utc::now(),
            cycles_run: state.cycle,
            monitored_risks,
            kri_summary,
            control_summary,
            recent_alerts,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn monitored_risk(&self, risk_id: &str) -> Option<MonitoredRisk> {
        self.lock_state().risks.get(risk_id).cloned()
    }

    pub fn monitored_risks(&self) -> Vec<MonitoredRisk> {
        self.lock_state().risks.values().cloned().collect()
    }

    pub fn kri_definition(&self, kri_id: &str) -> Option<KriDefinition> {
        self.lock_state().definitions.get(kri_id).cloned()
    }

    pub fn kri_reading(&self, kri_id: &str) -> Option<KriReading> {
        self.lock_state().readings.get(kri_id).cloned()
    }

    pub fn control_status(&self, control_id: &str) -> Option<ControlStatus> {
        self.lock_state().controls.get(control_id).cloned()
    }

    pub fn recent_alerts(&self, n: usize) -> Vec<Alert> {
        self.lock_state().alerts.recent(n)
    }

    pub fn alert_count(&self) -> usize {
        self.lock_state().alerts.len()
    }
}

/// Fetch every KRI of one risk, then merge readings under the risk's lock.
async fn evaluate_risk(
    snapshot: RiskSnapshot,
    source: Arc<dyn DataSource>,
    state: Arc<Mutex<MonitoringState>>,
    locks: Arc<RiskLocks>,
    timeout: Duration,
) -> KriOutcome {
    let mut fetched = Vec::with_capacity(snapshot.definitions.len());
    for def in snapshot.definitions {
        let result = match tokio::time::timeout(timeout, source.fetch(&def.data_source_ref)).await
        {
            Ok(result) => result,
            Err(_) => Err(timed_out(&def.data_source_ref, timeout)),
        };
        fetched.push((def, result, Utc::now()));
    }

    let lock = locks.for_risk(&snapshot.risk_id);
    let _guard = lock.lock().await;
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);

    let risk_id = snapshot.risk_id;
    let mut alerts = Vec::new();
    let mut evaluated = 0;
    for (def, result, observed_at) in fetched {
        match result {
            Ok(value) => {
                evaluated += 1;
                let breached = def.breached(value);
                state.readings.insert(
                    def.kri_id.clone(),
                    KriReading {
                        value,
                        breached,
                        observed_at,
                    },
                );
                if breached {
                    let alert = Alert::kri_breach(
                        &risk_id,
                        &def.kri_id,
                        BreachDetail {
                            threshold: def.threshold,
                            operator: def.operator,
                            current_value: value,
                        },
                        observed_at,
                    );
                    log::warn!("monitor: {}", alert.message);
                    alerts.push(alert);
                }
            }
            Err(e) => {
                log::error!("monitor: KRI {} on {risk_id} failed: {e}", def.kri_id);
                alerts.push(Alert::monitoring_error(&risk_id, &def.kri_id, e, observed_at));
            }
        }
    }

    KriOutcome {
        risk_id,
        evaluated,
        alerts,
    }
}

fn timed_out(reference: &str, timeout: Duration) -> RiskError {
    RiskError::DataSource {
        reference: reference.to_string(),
        reason: format!("timed out after {timeout:?}"),
    }
}

// ── Schedule ─────────────────────────────────────────────────────────────────

/// Runs monitoring cycles on a fixed interval until stopped.
pub struct MonitoringSchedule {
    stop: watch::Sender<bool>,
    handle: JoinHandle<u64>,
}

impl MonitoringSchedule {
    /// The first cycle runs immediately. A zero interval is raised to
    /// `MIN_CYCLE_INTERVAL`.
    pub fn spawn(engine: Arc<MonitoringEngine>, every: Duration) -> Self {
        let every = every.max(MIN_CYCLE_INTERVAL);
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut cycles = 0u64;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.run_monitoring_cycle().await;
                        cycles += 1;
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            log::info!("monitor: schedule stopped after {cycles} cycles");
            cycles
        });
        Self { stop, handle }
    }

    /// Stop the schedule and return how many cycles it ran.
    pub async fn stop(self) -> u64 {
        let _ = self.stop.send(true);
        match self.handle.await {
            Ok(cycles) => cycles,
            Err(e) => {
                log::error!("monitor: schedule task failed: {e}");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_table() {
        assert!(Operator::Gt.breached(95.0, 90.0));
        assert!(!Operator::Gt.breached(85.0, 90.0));
        assert!(!Operator::Gt.breached(90.0, 90.0));
        assert!(Operator::Ge.breached(90.0, 90.0));
        assert!(Operator::Lt.breached(20.0, 30.0));
        assert!(Operator::Le.breached(30.0, 30.0));
        assert!(Operator::Eq.breached(5.0, 5.0));
        assert!(!Operator::Eq.breached(5.1, 5.0));
    }

    #[test]
    fn operator_serializes_as_symbol() {
        assert_eq!(serde_json::to_string(&Operator::Ge).unwrap(), "\">=\"");
        let op: Operator = serde_json::from_str("\"<\"").unwrap();
        assert_eq!(op, Operator::Lt);
    }
}
