//! J1939-84 harness: runs the selected compliance test parts against a CAN
//! adapter and writes the transcript to the report file.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use j84_canbus::{CanInterface, CancelToken, Clock, DigitalAnnex, J1939Bus, MockCanInterface, SystemClock};
use j84_harness::config::AutoAnswer;
use j84_harness::{
    Answer, DataRepository, ERROR_EXIT_CODE, HarnessConfig, PartRegistry, ReportListener, RunControl, TestRun,
};

#[derive(Parser, Debug)]
#[command(name = "j84-harness", version)]
#[command(about = "J1939-84 OBD compliance test harness")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "J84_CONFIG")]
    config: Option<PathBuf>,

    /// Part to run; repeat for several. Every part runs when omitted.
    #[arg(short, long = "part")]
    parts: Vec<u8>,

    /// CAN adapter: `mock` or `socketcan:<iface>`. Overrides the config file.
    #[arg(long)]
    adapter: Option<String>,

    /// Report file. Overrides the config file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write the run summary and repository snapshot as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Answer every question with Yes
    #[arg(long, conflicts_with = "no")]
    yes: bool,

    /// Answer every question with No
    #[arg(long)]
    no: bool,

    /// Print the Digital Annex catalog and exit
    #[arg(long)]
    list_catalog: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Adapter {
    Mock,
    SocketCan(String),
}

fn parse_adapter(arg: &str) -> anyhow::Result<Adapter> {
    match arg.split_once(':') {
        None if arg == "mock" => Ok(Adapter::Mock),
        Some(("socketcan", name)) if !name.is_empty() => Ok(Adapter::SocketCan(name.to_string())),
        _ => anyhow::bail!("unknown adapter `{arg}`, expected `mock` or `socketcan:<iface>`"),
    }
}

fn open_adapter(adapter: &Adapter) -> anyhow::Result<Arc<dyn CanInterface>> {
    match adapter {
        Adapter::Mock => {
            tracing::warn!("no CAN interface configured, using idle mock adapter");
            Ok(Arc::new(MockCanInterface::new()))
        }
        #[cfg(target_os = "linux")]
        Adapter::SocketCan(name) => Ok(Arc::new(j84_canbus::SocketCanInterface::open(name)?)),
        #[cfg(not(target_os = "linux"))]
        Adapter::SocketCan(name) => anyhow::bail!("SocketCAN interface {name} is only available on Linux"),
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_catalog(catalog: &DigitalAnnex) {
    for pgn in catalog.pgns() {
        println!("PGN {:>6} {:<6} {} ({} SPNs)", pgn.pgn, pgn.acronym, pgn.label, pgn.spns.len());
        for spn in &pgn.spns {
            println!("    SPN {:>5} {} [{}]", spn.spn, spn.label, spn.units);
        }
    }
}

fn write_summary(path: &Path, value: &serde_json::Value) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("cannot write summary {}", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "j84-harness starting");

    let result = run(&cli).await;
    if let Err(e) = &result {
        tracing::error!("j84-harness failed: {e:#}");
    }
    ExitCode::from(exit_status(&result))
}

/// Startup and setup failures count as internal errors.
fn exit_status(result: &anyhow::Result<u8>) -> u8 {
    match result {
        Ok(code) => *code,
        Err(_) => ERROR_EXIT_CODE,
    }
}

/// Run the selected parts and return the process exit code.
async fn run(cli: &Cli) -> anyhow::Result<u8> {
    // ── Load config ─────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(report) = &cli.report {
        config.report_path = report.clone();
    }
    if cli.yes {
        config.auto_answer = Some(AutoAnswer::Yes);
    } else if cli.no {
        config.auto_answer = Some(AutoAnswer::No);
    }
    config.validate()?;
    tracing::info!(
        tool_address = config.tool_address,
        report = %config.report_path.display(),
        "config loaded"
    );

    // ── Digital Annex ───────────────────────────────────────────
    let catalog = match &config.catalog_path {
        Some(path) => DigitalAnnex::builtin_with_file(path)?,
        None => DigitalAnnex::builtin(),
    };
    tracing::info!(pgns = catalog.len(), "digital annex loaded");
    if cli.list_catalog {
        print_catalog(&catalog);
        return Ok(0);
    }

    // ── Parts ───────────────────────────────────────────────────
    let registry = PartRegistry::with_defaults();
    let test_run = TestRun::new(registry.controllers(&cli.parts)?);
    let selected: Vec<u8> = test_run.parts().iter().map(|p| p.part()).collect();
    tracing::info!(run_id = %test_run.run_id(), parts = ?selected, "parts selected");

    // ── CAN adapter & bus ───────────────────────────────────────
    let adapter = match cli.adapter.as_deref() {
        Some(arg) => parse_adapter(arg)?,
        None => match &config.can_interface {
            Some(name) => Adapter::SocketCan(name.clone()),
            None => Adapter::Mock,
        },
    };
    let interface = open_adapter(&adapter)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cancel = CancelToken::new();
    let bus = J1939Bus::new(interface, clock.clone(), cancel.clone(), config.tool_address)
        .with_timing(config.bus_timing());
    let control = RunControl::new(cancel.clone());

    // ── Report & repository ─────────────────────────────────────
    let listener = ReportListener::create(
        &config.report_path,
        clock,
        config.auto_answer.map(Answer::from),
        cancel.clone(),
    )
    .with_context(|| format!("cannot open report {}", config.report_path.display()))?;
    let mut repository = DataRepository::with_vehicle(config.vehicle.clone());

    // ── Ctrl-C cancels the run ──────────────────────────────────
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            signal_cancel.cancel();
        }
    });

    let summary = test_run.execute(&bus, &mut repository, &listener, &control).await;

    if let Some(path) = &cli.summary_json {
        let value = serde_json::json!({
            "summary": summary,
            "repository": repository.snapshot(),
        });
        write_summary(path, &value)?;
    }

    let exit_code = summary.exit_code();
    tracing::info!(
        run_id = %summary.run_id,
        outcome = %summary.outcome,
        exit_code,
        "j84-harness finished"
    );
    Ok(exit_code)
}
