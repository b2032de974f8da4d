//! Command-line surface. The embedding binary builds an [`App`], registers
//! its agents, and hands control to [`run`]:
//!
//! `run <agent>` · `up` · `list` · `history [agent]` · `logs <agent>` ·
//! `state <agent>`

use std::process::ExitCode;

use chrono::Local;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use warden_core::config::WardenConfig;
use warden_store::{RunRecord, RunStatus};

use crate::App;

#[derive(Debug, Parser)]
#[command(name = "warden", about = "Schedule, run, and track agents with zero infra.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a single agent immediately.
    Run { agent: String },

    /// Start the scheduler and block until interrupted.
    Up,

    /// List registered agents and their schedules.
    List,

    /// Show run history for an agent, or for all agents.
    History {
        agent: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Show captured output from agent runs.
    Logs {
        agent: String,
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long, default_value_t = 5)]
        limit: u32,
    },

    /// Show persisted state for an agent.
    State { agent: String },
}

/// Parse the process arguments and dispatch against `app`. The returned
/// exit code follows the one-shot contract: 0 for a successful run, 1 for
/// failure/error or an unknown agent.
pub fn run(app: App) -> ExitCode {
    let cli = Cli::parse();
    init_tracing(app.config());
    dispatch(app, cli.command)
}

fn init_tracing(config: &WardenConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warden={}", config.log_level)));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Dispatch an already-parsed command. Split from [`run`] so embedding
/// programs can drive commands without going through process argv.
pub fn dispatch(app: App, command: Command) -> ExitCode {
    match command {
        Command::Run { agent } => cmd_run(&app, &agent),
        Command::Up => cmd_up(app),
        Command::List => cmd_list(&app),
        Command::History {
            agent,
            limit,
            offset,
        } => cmd_history(&app, agent.as_deref(), limit, offset),
        Command::Logs {
            agent,
            run_id,
            limit,
        } => cmd_logs(&app, &agent, run_id.as_deref(), limit),
        Command::State { agent } => cmd_state(&app, &agent),
    }
}

fn cmd_run(app: &App, agent: &str) -> ExitCode {
    match app.run_now(agent) {
        Ok(record) => {
            print_run(&record);
            if record.status == RunStatus::Success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_up(app: App) -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(app.start()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_list(app: &App) -> ExitCode {
    if app.registry().is_empty() {
        println!("No agents registered.");
        return ExitCode::SUCCESS;
    }
    println!("{:<25} {:<30} {}", "Agent", "Schedule", "Retries");
    println!("{}", "-".repeat(65));
    for agent in app.registry().iter() {
        let schedule = agent
            .rule()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "manual".to_string());
        println!(
            "{:<25} {:<30} {}",
            agent.name(),
            schedule,
            agent.max_retries()
        );
    }
    ExitCode::SUCCESS
}

fn cmd_history(app: &App, agent: Option<&str>, limit: u32, offset: u32) -> ExitCode {
    let store = match app.store() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let runs = match store.query_runs(agent, limit, offset) {
        Ok(runs) => runs,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if runs.is_empty() {
        println!("No runs found.");
        return ExitCode::SUCCESS;
    }
    println!(
        "{:<38} {:<20} {:<9} {:<10} {:<12} {}",
        "ID", "Agent", "Attempt", "Status", "Duration", "Started"
    );
    println!("{}", "-".repeat(100));
    for run in &runs {
        println!(
            "{:<38} {:<20} {:<9} {:<10} {:<12} {}",
            run.id,
            run.agent,
            run.attempt,
            run.status.to_string(),
            format!("{:.0}ms", run.duration_ms),
            run.started_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
        );
    }
    ExitCode::SUCCESS
}

fn cmd_logs(app: &App, agent: &str, run_id: Option<&str>, limit: u32) -> ExitCode {
    let store = match app.store() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(id) = run_id {
        match store.get_run(id) {
            Ok(Some(run)) => print_run_detail(&run),
            Ok(None) => println!("Run '{id}' not found."),
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }
    match store.recent_runs(agent, limit) {
        Ok(runs) if runs.is_empty() => println!("No runs found for '{agent}'."),
        Ok(runs) => {
            for run in &runs {
                print_run_detail(run);
                println!();
            }
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

fn cmd_state(app: &App, agent: &str) -> ExitCode {
    let store = match app.store() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    match store.state_all(agent) {
        Ok(state) if state.is_empty() => {
            println!("No state for agent '{agent}'.");
            ExitCode::SUCCESS
        }
        Ok(state) => {
            match serde_json::to_string_pretty(&state) {
                Ok(rendered) => println!("{rendered}"),
                Err(e) => {
                    eprintln!("{e}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn print_run(run: &RunRecord) {
    println!(
        "[{}] {} ({}) in {:.0}ms",
        run.status, run.agent, run.id, run.duration_ms
    );
    if let Some(result) = &run.result {
        println!("  result: {result}");
    }
    if let Some(error) = &run.error {
        println!("  error: {error}");
    }
}

fn print_run_detail(run: &RunRecord) {
    println!(
        "--- {} [{}] attempt {} {} ({:.0}ms) ---",
        run.id,
        run.status,
        run.attempt,
        run.started_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S"),
        run.duration_ms,
    );
    if let Some(result) = &run.result {
        println!("result: {result}");
    }
    if let Some(output) = &run.output {
        print!("{output}");
    }
    if let Some(error) = &run.error {
        println!("error: {error}");
    }
}
