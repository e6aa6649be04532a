use async_trait::async_trait;
use chrono::Utc;
use riskflow_core::{
    config::RiskConfig,
    coordinator::{Coordinator, WorkflowStage},
    data_source::StaticDataSource,
    error::{RiskError, RiskResult},
    monitoring_engine::MonitoringEngine,
    qualitative_assessor::{RiskInfo, RiskScorer},
    response_strategy::Strategy,
    risk::{Assessment, RiskCategory, RiskLevel, RiskStatus},
    risk_matrix::RiskMatrixConfig,
    signal::SignalReport,
    store::RiskStore,
    worker::{SpecialistWorker, StaticWorker},
};
use std::sync::Arc;
use std::time::Duration;

fn scan_report() -> SignalReport {
    SignalReport::new("scanner", Utc::now())
        .with_bucket("economic", ["Rising interest rates"])
        .with_bucket("market", ["Increased volatility in tech stocks"])
        .with_bucket("operational_issues", ["Multiple server outage reports"])
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn data_source() -> Arc<StaticDataSource> {
    Arc::new(
        StaticDataSource::default()
            .with_reading("internal_monitoring_system", 95.0)
            .with_reading("log_aggregator", 3.0)
            .with_reading("quant_assessment_output", 50_000.0)
            .with_control("CTRL-OP-01", true)
            .with_control("CTRL-OP-02", false),
    )
}

struct FailingWorker;

#[async_trait]
impl SpecialistWorker for FailingWorker {
    fn id(&self) -> &str {
        "failing_feed"
    }

    async fn invoke(&self) -> RiskResult<SignalReport> {
        Err(RiskError::Other(anyhow::anyhow!("feed down")))
    }
}

struct SlowWorker;

#[async_trait]
impl SpecialistWorker for SlowWorker {
    fn id(&self) -> &str {
        "slow_feed"
    }

    async fn invoke(&self) -> RiskResult<SignalReport> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(SignalReport::new("slow_feed", Utc::now()))
    }
}

struct FixedScorer(usize, usize);

impl RiskScorer for FixedScorer {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn score(&self, _info: &RiskInfo, _matrix: &RiskMatrixConfig) -> (usize, usize) {
        (self.0, self.1)
    }
}

#[tokio::test]
async fn single_economic_signal_runs_the_whole_chain() {
    let mut config = RiskConfig::default_test();
    config
        .workflow
        .quantitative_inputs
        .get_mut(&RiskCategory::Financial)
        .unwrap()
        .data
        .insert("volatility".into(), 0.4);
    let store = RiskStore::in_memory().unwrap();
    store.migrate().unwrap();
    let monitoring = Arc::new(MonitoringEngine::from_config(&config, data_source()));
    let mut coordinator = Coordinator::new("single".into(), config, store, monitoring);

    let economic = SignalReport::new("external", Utc::now())
        .with_bucket("economic", ["Rising interest rates"]);
    let internal = SignalReport::new("internal", Utc::now());
    coordinator.register_worker(Arc::new(StaticWorker::new(economic)));
    coordinator.register_worker(Arc::new(StaticWorker::new(internal)));

    let report = coordinator.start("Single signal").await.unwrap();

    assert_eq!(report.prioritized.len(), 1);
    let only = &report.prioritized[0];
    assert_eq!(only.rank, 1);
    assert_eq!(only.record.category, RiskCategory::Financial);
    // VaR at 95%: 1e6 * 0.4 * 1.645 / sqrt(252) ~ 41,450 -> loss ratio ~0.041
    assert_eq!(only.record.risk_level, Some(RiskLevel::High));
    assert_eq!(only.strategy.as_ref().unwrap().strategy, Strategy::Transfer);
    assert_eq!(only.record.status, RiskStatus::Monitored);

    assert_eq!(report.monitoring.len(), 1);
    assert_eq!(report.monitoring[0].added_kris, vec!["KRI_VAR".to_string()]);
    let monitored = coordinator.monitoring().monitored_risk("RISK-001").unwrap();
    assert!(monitored.control_ids.is_empty());
}

#[tokio::test]
async fn injected_scorer_drives_qualitative_level() {
    let mut coordinator = Coordinator::build_test(data_source())
        .unwrap()
        .with_scorer(Box::new(FixedScorer(4, 4)));
    let report = SignalReport::new("social_listener", Utc::now())
        .with_bucket("news", ["Viral customer complaint"]);
    coordinator.register_worker(Arc::new(StaticWorker::new(report)));

    let report = coordinator.start("Fixed scorer").await.unwrap();

    let only = &report.prioritized[0];
    assert_eq!(only.record.risk_level, Some(RiskLevel::Critical));
    // Reputational Critical -> "Mitigate/Avoid"; no library controls for the category
    let strategy = only.strategy.as_ref().unwrap();
    assert_eq!(strategy.strategy, Strategy::Mitigate);
    assert!(strategy.control_ids.is_empty());
    assert_eq!(report.monitoring[0].added_kris, vec!["KRI_NPS".to_string()]);
}

#[tokio::test]
async fn full_run_prioritizes_and_registers_monitoring() {
    init_logging();
    let mut coordinator = Coordinator::build_test(data_source()).unwrap();
    coordinator.register_worker(Arc::new(StaticWorker::new(scan_report())));

    let report = coordinator.start("Quarterly review").await.unwrap();

    assert_eq!(coordinator.stage(), WorkflowStage::Complete);
    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures);
    assert_eq!(report.workers_dispatched, 1);
    assert_eq!(report.signals_collected, 3);

    // economic -> RISK-001, market -> RISK-002, operational_issues -> RISK-003
    let order: Vec<_> = report
        .prioritized
        .iter()
        .map(|p| (p.rank, p.record.risk_id.as_str(), p.record.risk_level))
        .collect();
    assert_eq!(
        order,
        vec![
            (1, "RISK-002", Some(RiskLevel::Critical)),
            (2, "RISK-003", Some(RiskLevel::High)),
            (3, "RISK-001", Some(RiskLevel::Medium)),
        ]
    );

    let market = report.risk("RISK-002").unwrap();
    assert_eq!(market.record.category, RiskCategory::Market);
    assert!(matches!(market.record.assessments[0], Assessment::Quantitative(_)));
    assert_eq!(market.strategy.as_ref().unwrap().strategy, Strategy::Avoid);

    let ops = report.risk("RISK-003").unwrap();
    assert!(matches!(ops.record.assessments[0], Assessment::Qualitative(_)));
    assert_eq!(ops.record.status, RiskStatus::Monitored);
    let ops_strategy = ops.strategy.as_ref().unwrap();
    assert_eq!(ops_strategy.strategy, Strategy::Mitigate);
    assert_eq!(ops_strategy.control_ids, vec!["CTRL-OP-01".to_string(), "CTRL-OP-02".to_string()]);

    let financial = report.risk("RISK-001").unwrap();
    assert_eq!(financial.record.status, RiskStatus::Strategized);

    let monitored: Vec<_> = report.monitoring.iter().map(|c| c.risk_id.as_str()).collect();
    assert_eq!(monitored, vec!["RISK-002", "RISK-003"]);

    let summary = coordinator.monitoring().run_monitoring_cycle().await;
    assert_eq!(summary.risks_monitored, 2);
    assert_eq!(summary.kris_evaluated, 3);
    assert_eq!(summary.kri_breaches, 1);
    assert_eq!(summary.controls_checked, 2);
    assert_eq!(summary.control_issues, 1);
    assert_eq!(summary.errors, 0);
}

#[tokio::test]
async fn configured_suggestion_limit_caps_library_controls() {
    let mut config = RiskConfig::default_test();
    config.workflow.max_control_suggestions = 1;
    let store = RiskStore::in_memory().unwrap();
    store.migrate().unwrap();
    let monitoring = Arc::new(MonitoringEngine::from_config(&config, data_source()));
    let mut coordinator = Coordinator::new("one-control".into(), config, store, monitoring);
    coordinator.register_worker(Arc::new(StaticWorker::new(scan_report())));

    let report = coordinator.start("Suggestion limit").await.unwrap();

    let ops = report.risk("RISK-003").unwrap();
    let strategy = ops.strategy.as_ref().unwrap();
    assert_eq!(strategy.strategy, Strategy::Mitigate);
    assert_eq!(strategy.control_ids, vec!["CTRL-OP-01".to_string()]);
    assert_eq!(
        strategy.control_suggestions,
        vec!["Implement Redundant Server (CTRL-OP-01)".to_string()]
    );
}

#[tokio::test]
async fn duplicate_signals_merge_into_one_candidate() {
    let mut coordinator = Coordinator::build_test(data_source()).unwrap();
    let a = SignalReport::new("alpha", Utc::now()).with_bucket("news", ["Negative press coverage"]);
    let b = SignalReport::new("beta", Utc::now())
        .with_bucket("social", ["Negative press coverage", "  "]);
    coordinator.register_worker(Arc::new(StaticWorker::new(b)));
    coordinator.register_worker(Arc::new(StaticWorker::new(a)));

    let report = coordinator.start("Dedup").await.unwrap();

    assert_eq!(report.prioritized.len(), 1);
    let record = &report.prioritized[0].record;
    assert_eq!(record.category, RiskCategory::Reputational);
    let factors: Vec<_> = record.contributing_factors.iter().map(String::as_str).collect();
    assert_eq!(factors, vec!["alpha/news", "beta/social"]);
}

#[tokio::test]
async fn failed_and_slow_workers_do_not_abort_the_run() {
    let mut config = RiskConfig::default_test();
    config.workflow.worker_timeout_ms = 50;
    let store = RiskStore::in_memory().unwrap();
    store.migrate().unwrap();
    let monitoring = Arc::new(MonitoringEngine::from_config(&config, data_source()));
    let mut coordinator = Coordinator::new("partial-run".into(), config, store, monitoring);

    coordinator.register_worker(Arc::new(FailingWorker));
    coordinator.register_worker(Arc::new(SlowWorker));
    coordinator.register_worker(Arc::new(StaticWorker::new(scan_report())));

    let report = coordinator.start("Partial data").await.unwrap();

    assert_eq!(report.workers_dispatched, 3);
    assert_eq!(report.prioritized.len(), 3);
    let failed: Vec<_> = report.failures.iter().map(|f| f.subject.as_str()).collect();
    assert_eq!(failed, vec!["failing_feed", "slow_feed"]);
    assert!(report.failures.iter().all(|f| f.stage == WorkflowStage::DataCollection));
    assert!(report.failures[1].message.contains("timed out"));
    assert_eq!(
        coordinator.store().event_count("partial-run", "worker_failed").unwrap(),
        2
    );
}

#[tokio::test]
async fn missing_quantitative_inputs_leave_risk_unassessed() {
    let mut config = RiskConfig::default_test();
    config.workflow.quantitative_inputs.clear();
    let store = RiskStore::in_memory().unwrap();
    store.migrate().unwrap();
    let monitoring = Arc::new(MonitoringEngine::from_config(&config, data_source()));
    let mut coordinator = Coordinator::new("no-inputs".into(), config, store, monitoring);
    coordinator.register_worker(Arc::new(StaticWorker::new(scan_report())));

    let report = coordinator.start("Missing inputs").await.unwrap();

    let last = report.prioritized.last().unwrap();
    assert_eq!(last.record.risk_level, None);
    assert!(last.strategy.is_none());
    assert_eq!(last.record.failures().count(), 1);
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| f.stage == WorkflowStage::Assessment && f.message.contains("Insufficient data")));
    assert_eq!(report.prioritized[0].record.risk_id, "RISK-003");
}

#[tokio::test]
async fn start_twice_is_an_invalid_transition() {
    let mut coordinator = Coordinator::build_test(data_source()).unwrap();
    coordinator.start("first").await.unwrap();

    let err = coordinator.start("second").await.unwrap_err();
    assert!(matches!(err, RiskError::InvalidTransition { .. }));
    assert_eq!(coordinator.stage(), WorkflowStage::Complete);
}

#[tokio::test]
async fn empty_run_completes() {
    let mut coordinator = Coordinator::build_test(data_source()).unwrap();
    let report = coordinator.start("Nothing to see").await.unwrap();
    assert!(report.prioritized.is_empty());
    assert!(report.monitoring.is_empty());
    assert!(report.is_clean());
}

#[tokio::test]
async fn run_is_persisted() {
    let mut coordinator = Coordinator::build_test(data_source()).unwrap();
    coordinator.register_worker(Arc::new(StaticWorker::new(scan_report())));
    coordinator.start("Persisted").await.unwrap();

    let store = coordinator.store();
    let events = store.events_for_run("test-run").unwrap();
    assert_eq!(events.first().unwrap().event_type, "run_started");
    assert_eq!(events.last().unwrap().event_type, "run_completed");
    assert!(events.windows(2).all(|w| w[0].seq + 1 == w[1].seq));
    assert_eq!(store.event_count("test-run", "stage_entered").unwrap(), 7);
    assert_eq!(store.event_count("test-run", "risk_identified").unwrap(), 3);
    assert_eq!(store.event_count("test-run", "monitoring_registered").unwrap(), 2);
    assert!(store.run_completed_at("test-run").unwrap().is_some());

    let records = store.load_risk_records("test-run").unwrap();
    assert_eq!(records.len(), 3);

    let history: Vec<_> = store
        .status_history("test-run", "RISK-003")
        .unwrap()
        .into_iter()
        .map(|c| c.to)
        .collect();
    assert_eq!(
        history,
        vec![
            RiskStatus::Candidate,
            RiskStatus::Assessed,
            RiskStatus::Prioritized,
            RiskStatus::Strategized,
            RiskStatus::Monitored,
        ]
    );
}
