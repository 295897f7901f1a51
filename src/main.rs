//! Battle Copilot - command line runner
//!
//! Drives the engine against the simulated battlefield described by a JSON
//! scenario file and prints a JSON summary.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use battle_copilot::battle::{
    AutonomousPolicy, CopilotScript, LayoutStore, PassivePolicy, RunSummary, ScriptExecutor,
    StageCatalog, StageLayout, StageManager, StageScript, Strategy,
};
use battle_copilot::core::config::EngineConfig;
use battle_copilot::core::error::{CopilotError, Result};
use battle_copilot::device::{CancelFlag, Services, UiElement};
use battle_copilot::notify::{
    AttemptOutcome, CopilotEvent, FanoutSink, NotificationSink, RecordingSink, TracingSink,
};
use battle_copilot::sim::{SimBattlefield, SimReport, SimScenario};

/// Battle Copilot - scripted battles against a simulated battlefield
#[derive(Parser, Debug)]
#[command(name = "battle-copilot")]
#[command(about = "Run copilot scripts against a simulated battlefield and print a JSON summary")]
struct Args {
    /// Engine config (TOML); defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cancel the run after this many seconds
    #[arg(long, global = true, default_value_t = 60)]
    timeout_secs: u64,

    /// Override the scenario's random seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one scripted attempt on the scenario's first stage
    Run {
        /// Scenario file (JSON)
        scenario: PathBuf,

        /// Let the autonomous policy manage the battle between steps
        #[arg(long)]
        autonomous: bool,
    },
    /// Run the stage manager over every stage of the scenario
    Stages {
        /// Scenario file (JSON)
        scenario: PathBuf,
    },
}

/// Scenario file layout
#[derive(Debug, Deserialize)]
struct ScenarioFile {
    sim: SimScenario,
    #[serde(default)]
    layouts: Vec<StageLayout>,
    /// Script for `run`
    #[serde(default)]
    script: Option<CopilotScript>,
    /// Strategies for `run --autonomous`
    #[serde(default)]
    strategies: Vec<Strategy>,
    /// Stage table for `stages`
    #[serde(default)]
    stages: Vec<StageScript>,
}

/// JSON output
#[derive(Serialize)]
struct RunOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<AttemptOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stages: Option<RunSummary>,
    events: Vec<CopilotEvent>,
    sim: SimReport,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("battle_copilot=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let scenario_path = match &args.command {
        Command::Run { scenario, .. } | Command::Stages { scenario } => scenario,
    };
    let mut file: ScenarioFile = serde_json::from_str(&fs::read_to_string(scenario_path)?)?;
    if let Some(seed) = args.seed {
        file.sim.seed = seed;
    }

    let sim = Arc::new(SimBattlefield::new(file.sim.clone()));
    let recorder = Arc::new(RecordingSink::new());
    let notifier: Arc<dyn NotificationSink> = Arc::new(FanoutSink::new(vec![
        recorder.clone() as Arc<dyn NotificationSink>,
        Arc::new(TracingSink),
    ]));

    let cancel = CancelFlag::new();
    spawn_watchdog(cancel.clone(), Duration::from_secs(args.timeout_secs));
    let services = sim.services(notifier, config).with_cancel(cancel);

    let mut layouts = LayoutStore::new();
    for layout in file.layouts.drain(..) {
        layouts.insert(layout);
    }

    let mut output = RunOutput {
        outcome: None,
        stages: None,
        events: Vec::new(),
        sim: SimReport::default(),
    };

    match args.command {
        Command::Run { autonomous, .. } => {
            let script = file
                .script
                .take()
                .ok_or_else(|| CopilotError::InvalidConfig("scenario has no script".into()))?;
            tracing::info!(stage = %script.stage_name, autonomous, "running one attempt");

            let retries = services.config.ui_retries;
            if !services.click(UiElement::StartFighting, retries) {
                tracing::warn!("start control not found");
            }

            let outcome = if autonomous {
                let policy = AutonomousPolicy::new(file.strategies.clone(), &script.actions);
                ScriptExecutor::new(services, script, &layouts, policy).run_attempt()?
            } else {
                ScriptExecutor::new(services, script, &layouts, PassivePolicy).run_attempt()?
            };
            output.outcome = Some(outcome);
        }
        Command::Stages { .. } => {
            let catalog = file
                .stages
                .drain(..)
                .fold(StageCatalog::new(), |catalog, stage| catalog.with_stage(stage));
            let catalog = StageCatalog { layouts, ..catalog };
            tracing::info!(stages = catalog.stages.len(), "running stage manager");

            let summary = StageManager::new(services, catalog).run();
            output.stages = Some(summary);
        }
    }

    output.events = recorder.events();
    output.sim = sim.report();
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Request cancellation once the time budget is spent
fn spawn_watchdog(cancel: CancelFlag, after: Duration) {
    thread::spawn(move || {
        thread::sleep(after);
        if !cancel.is_cancelled() {
            tracing::warn!(secs = after.as_secs(), "time budget spent, cancelling");
            cancel.cancel();
        }
    });
}
