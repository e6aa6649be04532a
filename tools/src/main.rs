//! risk-runner: headless workflow runner for riskflow.
//!
//! Usage:
//!   risk-runner --data-dir ./data --cycles 3 --db run.db
//!   risk-runner --context "Q4 review" --ipc-mode
//!
//! Workers replay every report under `{data_dir}/signals/`; the monitoring
//! data source reads `{data_dir}/monitoring/data_sources.json`.

use anyhow::Result;
use riskflow_core::{
    config::RiskConfig,
    coordinator::Coordinator,
    data_source::StaticDataSource,
    monitoring_engine::{CycleSummary, MonitoringEngine, MonitoringSchedule},
    report::{FinalReport, ReportType},
    store::RiskStore,
    worker::StaticWorker,
};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    RunCycle,
    Report {
        #[serde(default)]
        report_type: Option<String>,
    },
    Suspend {
        risk_id: String,
    },
    Resume {
        risk_id: String,
    },
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let cycles = parse_arg(&args, "--cycles", 3u64);
    let schedule_ms = parse_arg(&args, "--schedule-ms", 0u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");
    let context = string_arg(&args, "--context").unwrap_or("Scheduled risk review");

    let config = RiskConfig::load(data_dir)?;
    let run_id = format!("run-{}", uuid::Uuid::new_v4());

    if !ipc_mode {
        println!("riskflow: risk-runner");
        println!("  run_id:    {run_id}");
        println!("  cycles:    {cycles}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let store = if db == ":memory:" {
        RiskStore::in_memory()?
    } else {
        RiskStore::open(db)?
    };
    store.migrate()?;

    let source = StaticDataSource::load(&format!("{data_dir}/monitoring/data_sources.json"))?;
    let monitoring = Arc::new(MonitoringEngine::from_config(&config, Arc::new(source)));
    let interval = Duration::from_millis(config.workflow.monitoring.cycle_interval_ms);

    let mut coordinator = Coordinator::new(run_id.clone(), config, store, Arc::clone(&monitoring));
    for worker in load_workers(&format!("{data_dir}/signals"))? {
        coordinator.register_worker(Arc::new(worker));
    }

    let report = coordinator.start(context).await?;

    if ipc_mode {
        run_ipc_loop(&monitoring, &report).await?;
        return Ok(());
    }

    print_summary(&report);

    if schedule_ms > 0 {
        // Run on the configured interval for `schedule_ms`, then stop.
        let schedule = MonitoringSchedule::spawn(Arc::clone(&monitoring), interval);
        tokio::time::sleep(Duration::from_millis(schedule_ms)).await;
        let ran = schedule.stop().await;
        println!("  scheduled cycles run: {ran}");
    } else {
        for _ in 0..cycles {
            let summary = monitoring.run_monitoring_cycle().await;
            print_cycle(&summary);
        }
    }

    let dashboard = monitoring.generate_report(ReportType::Dashboard);
    println!();
    println!("=== MONITORING ===");
    println!("{}", serde_json::to_string_pretty(&dashboard)?);
    Ok(())
}

/// Every `*.json` file in `dir`, in file-name order.
fn load_workers(dir: &str) -> Result<Vec<StaticWorker>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("Cannot read {dir}: {e}"))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();

    paths
        .iter()
        .map(|p| StaticWorker::load(&path_str(p)))
        .collect()
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

async fn run_ipc_loop(monitoring: &MonitoringEngine, report: &FinalReport) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    write_line(&mut stdout, &serde_json::to_string(report)?).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let cmd: IpcCommand = match serde_json::from_str(&line) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                write_line(&mut stdout, &err_json.to_string()).await?;
                continue;
            }
        };

        let response = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::RunCycle => {
                serde_json::to_string(&monitoring.run_monitoring_cycle().await)?
            }
            IpcCommand::Report { report_type } => {
                let name = report_type.as_deref().unwrap_or("periodic");
                match ReportType::parse(name) {
                    Some(kind) => serde_json::to_string(&monitoring.generate_report(kind))?,
                    None => serde_json::json!({ "error": format!("unknown report type '{name}'") })
                        .to_string(),
                }
            }
            IpcCommand::Suspend { risk_id } => status_response(monitoring.suspend(&risk_id).await),
            IpcCommand::Resume { risk_id } => status_response(monitoring.resume(&risk_id).await),
        };
        write_line(&mut stdout, &response).await?;
    }
    Ok(())
}

fn status_response(result: riskflow_core::error::RiskResult<()>) -> String {
    match result {
        Ok(()) => serde_json::json!({ "ok": true }).to_string(),
        Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, line: &str) -> Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

fn print_summary(report: &FinalReport) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {}", report.run_id);
    println!("  context:        {}", report.context);
    println!("  workers:        {}", report.workers_dispatched);
    println!("  signals:        {}", report.signals_collected);
    println!("  risks:          {}", report.prioritized.len());
    println!("  monitored:      {}", report.monitoring.len());
    println!("  failures:       {}", report.failures.len());

    println!();
    println!("=== PRIORITIZED RISKS ===");
    for entry in &report.prioritized {
        let record = &entry.record;
        let level = record
            .risk_level
            .map(|l| format!("{l:?}"))
            .unwrap_or_else(|| "unassessed".into());
        let strategy = entry
            .strategy
            .as_ref()
            .map(|s| s.strategy.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  #{:<2} {} [{}] {:<10} {:<9} {}",
            entry.rank,
            record.risk_id,
            record.category.as_str(),
            level,
            strategy,
            record.description
        );
        if let Some(s) = &entry.strategy {
            for suggestion in &s.control_suggestions {
                println!("        - {suggestion}");
            }
        }
    }

    if !report.failures.is_empty() {
        println!();
        println!("=== FAILURES ===");
        for failure in &report.failures {
            println!("  {} {}: {}", failure.stage, failure.subject, failure.message);
        }
    }
}

fn print_cycle(summary: &CycleSummary) {
    println!(
        "  cycle {:>3} | risks {} | KRIs {} (skipped {}) | controls {} | {}",
        summary.cycle,
        summary.risks_monitored,
        summary.kris_evaluated,
        summary.kris_skipped,
        summary.controls_checked,
        summary.summary
    );
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
