use anyhow::{Context, Result};
use clap::Parser;
use ggen_reconcile::history::{RollbackOptions, RollbackReport};
use ggen_reconcile::logging::operation_span;
use ggen_reconcile::{
    CliArgs, Command, ErrorCode, FsRunStore, GenerationPlan, GenerationSession, HistoryCommand,
    LoggingConfig, ReconcileConfig, RollbackSelection, RunHistory, SessionReport, WriteOptions,
    init_logging, log_slow_operation,
};
use std::fs;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    let _guard = match init_logging(LoggingConfig::from_env()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: {:#}", err);
            return ExitCode::FAILURE;
        }
    };

    match run(CliArgs::parse()) {
        Ok(status) => status,
        Err(err) => {
            let code = ErrorCode::of(&err);
            match code {
                Some(code) => tracing::error!(
                    code = code.code(),
                    category = code.category(),
                    retryable = code.is_retryable(),
                    "{:#}",
                    err
                ),
                None => tracing::error!("{:#}", err),
            }
            eprintln!("error: {:#}", err);
            code.map_or(ExitCode::FAILURE, |code| ExitCode::from(code.code()))
        }
    }
}

fn run(cli: CliArgs) -> Result<ExitCode> {
    let config = ReconcileConfig::from_args(&cli)?;

    // Fail fast before touching any state
    config.validate()?;

    let failed = match cli.command {
        Command::Apply {
            plan,
            dry_run,
            force,
            execution_id,
            json,
        } => {
            let _span = operation_span("apply").entered();
            let contents = fs::read_to_string(&plan)
                .with_context(|| format!("failed to read plan {:?}", plan))?;
            let mut plan: GenerationPlan = serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse plan {:?}", plan))?;
            if execution_id.is_some() {
                plan.execution_id = execution_id;
            }

            let started = Instant::now();
            let session = GenerationSession::from_config(&config);
            let report = session.apply(&plan, WriteOptions { dry_run, force })?;
            log_slow_operation!(started.elapsed(), 5_000, "generation pass");

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_session(&report);
            }
            report.summary.is_failed()
        }
        Command::History { command } => {
            let _span = operation_span("history").entered();
            let history = RunHistory::new(FsRunStore::new(config.history_path()));
            match command {
                HistoryCommand::List { json } => {
                    let runs = history.list_runs()?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&runs)?);
                    } else if runs.is_empty() {
                        println!("no recorded runs");
                    } else {
                        for run in &runs {
                            println!(
                                "{}  {:<11}  {:<20}  {:>3} entries  {}",
                                run.id(),
                                run.state.to_string(),
                                run.execution_id().unwrap_or("-"),
                                run.manifest.entries.len(),
                                run.manifest.blueprint.entity,
                            );
                        }
                    }
                }
                HistoryCommand::Show { run_id } => {
                    let run = history
                        .get_run(&run_id)?
                        .with_context(|| format!("run {} not found", run_id))?;
                    println!("{}", serde_json::to_string_pretty(&run)?);
                }
            }
            false
        }
        Command::Rollback {
            runs,
            execution,
            dry_run,
            json,
        } => {
            let _span = operation_span("rollback").entered();
            let selection = match (runs.is_empty(), execution) {
                (false, _) => RollbackSelection::Runs(runs),
                (true, Some(execution)) => RollbackSelection::Execution(execution),
                (true, None) => RollbackSelection::Latest,
            };
            let history = RunHistory::new(FsRunStore::new(config.history_path()));
            let report = history.rollback(&selection, RollbackOptions { dry_run })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_rollback(&report);
            }
            report.summary.is_failed()
        }
    };

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_session(report: &SessionReport) {
    for outcome in &report.outcomes {
        match &outcome.message {
            Some(message) => println!(
                "{:<12} {}  ({})",
                outcome.status.to_string(),
                outcome.relative_path,
                message
            ),
            None => println!("{:<12} {}", outcome.status.to_string(), outcome.relative_path),
        }
    }
    let summary = &report.summary;
    println!(
        "\n{} written, {} overwritten, {} skipped, {} preview, {} errors",
        summary.written, summary.overwritten, summary.skipped, summary.preview, summary.errors
    );
    if let Some(run_id) = &report.run_id {
        println!("recorded run {}", run_id);
    }
    if let Some(error) = &report.history_error {
        eprintln!("warning: run was not recorded: {}", error);
    }
}

fn print_rollback(report: &RollbackReport) {
    let prefix = if report.dry_run { "[dry run] " } else { "" };
    for entry in &report.entries {
        match &entry.message {
            Some(message) => println!(
                "{}{:<9} {}  ({})",
                prefix,
                entry.action.to_string(),
                entry.path,
                message
            ),
            None => println!("{}{:<9} {}", prefix, entry.action.to_string(), entry.path),
        }
    }
    let summary = &report.summary;
    println!(
        "\n{}{} run(s): {} restored, {} deleted, {} skipped, {} errors",
        prefix,
        report.runs.len(),
        summary.restored,
        summary.deleted,
        summary.skipped,
        summary.errors
    );
}
