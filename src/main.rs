use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use drupal_theme_build::compiler::Prefixer;
use drupal_theme_build::config::{BuildConfig, Cli};
use drupal_theme_build::logger;
use drupal_theme_build::runner::{StepStatus, TaskRunner};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let Some(operation) = cli.command.operation() else {
        Cli::command().print_help().context("Failed to print usage")?;
        println!();
        return Ok(ExitCode::SUCCESS);
    };

    logger::init(cli.verbose || cli.debug, cli.debug);
    logger::separator(&format!("drupal-theme-build {}", env!("CARGO_PKG_VERSION")));

    let config = match BuildConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("Error: {e}");
            return Ok(ExitCode::from(1));
        }
    };
    config.log_summary();

    // Setup Ctrl+C handler
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    // Configure Rayon thread pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs.max(1))
        .build_global()
        .ok();

    let start = Instant::now();
    let runner = TaskRunner::new(&config, Prefixer::detect(), &shutdown);
    let report = runner
        .run(operation)
        .with_context(|| format!("{operation} failed"))?;

    if shutdown.load(Ordering::Relaxed) || report.was_cancelled() {
        tracing::warn!("{operation} cancelled");
        return Ok(ExitCode::from(130));
    }

    for step in &report.steps {
        let status = match &step.status {
            StepStatus::Success(summary) if summary.is_empty() => "ok".to_string(),
            StepStatus::Success(summary) => summary.clone(),
            StepStatus::Failed(errors) => format!("FAILED ({} error(s))", errors.len()),
            StepStatus::Cancelled => "cancelled".to_string(),
        };
        tracing::info!(
            "  {}: {} in {:.2}s",
            step.operation,
            status,
            step.duration.as_secs_f64()
        );
    }
    tracing::info!("finished {operation} in {:.2}s", start.elapsed().as_secs_f64());

    if report.has_failure() {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
