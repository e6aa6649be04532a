use riskflow_core::{
    config::RiskConfig,
    data_source::StaticDataSource,
    error::RiskError,
    risk::RiskLevel,
    worker::{SpecialistWorker, StaticWorker},
};

const DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../data");

#[test]
fn shipped_data_matches_test_defaults() {
    let loaded = RiskConfig::load(DATA_DIR).unwrap();
    assert_eq!(loaded, RiskConfig::default_test());
}

#[test]
fn missing_directory_names_the_file() {
    let err = RiskConfig::load("/nonexistent/riskflow").unwrap_err();
    assert!(err.to_string().contains("risk_matrix.json"), "{err}");
}

#[test]
fn zero_alert_capacity_is_rejected() {
    let mut config = RiskConfig::default_test();
    config.workflow.monitoring.alert_capacity = 0;
    assert!(matches!(config.validate(), Err(RiskError::Configuration(_))));
}

#[test]
fn zero_monitoring_intervals_are_rejected() {
    let mut config = RiskConfig::default_test();
    config.workflow.monitoring.cycle_interval_ms = 0;
    assert!(matches!(config.validate(), Err(RiskError::Configuration(_))));

    let mut config = RiskConfig::default_test();
    config.workflow.monitoring.fetch_timeout_ms = 0;
    assert!(matches!(config.validate(), Err(RiskError::Configuration(_))));
}

#[test]
fn zero_suggestion_limit_is_rejected() {
    let mut config = RiskConfig::default_test();
    config.workflow.max_control_suggestions = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("max_control_suggestions"), "{err}");
}

#[test]
fn non_monotonic_matrix_is_rejected() {
    let mut config = RiskConfig::default_test();
    config.risk_matrix.level_map[0][1] = RiskLevel::High;
    assert!(matches!(config.validate(), Err(RiskError::Configuration(_))));
}

#[test]
fn unknown_appetite_category_is_rejected() {
    let mut config = RiskConfig::default_test();
    let row = config.appetite["Default"].clone();
    config.appetite.insert("Weather".into(), row);
    assert!(matches!(config.validate(), Err(RiskError::Configuration(_))));
}

#[test]
fn duplicate_kri_is_rejected() {
    let mut config = RiskConfig::default_test();
    let first = config.kri_definitions[0].clone();
    config.kri_definitions.push(first);
    assert!(matches!(config.validate(), Err(RiskError::Configuration(_))));
}

#[tokio::test]
async fn fixture_workers_and_source_load() {
    let worker = StaticWorker::load(&format!("{DATA_DIR}/signals/internal_audit.json")).unwrap();
    assert_eq!(worker.id(), "internal_audit");
    let report = worker.invoke().await.unwrap();
    assert_eq!(report.actionable_entries().count(), 2);

    let source =
        StaticDataSource::load(&format!("{DATA_DIR}/monitoring/data_sources.json")).unwrap();
    assert_eq!(source.readings["internal_monitoring_system"], 95.0);
    assert_eq!(source.controls.get("CTRL-OP-02"), Some(&false));
}
