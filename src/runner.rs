//! Named-operation sequencing.
//!
//! The operation set is fixed. Each operation declares its predecessors:
//!
//! ```text
//! clean ◀── compile ◀── watch ◀──┐
//!                                ├── watch-all
//!           live-reload ◀────────┤
//!           minify-images ◀──────┘ (with --imagemin)
//! minify-scripts
//! ```
//!
//! One-shot steps run in plan order. Watch and live-reload block, so they
//! are started last and share a single event loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::clean::remove_stale_maps;
use crate::compiler::{compile_all, Prefixer};
use crate::config::BuildConfig;
use crate::error::TaskError;
use crate::imagemin::{minify_images, ImageStats};
use crate::logger::Alert;
use crate::uglify::minify_scripts;
use crate::watch::{run_event_loop, LoopPlan};

/// A named build operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Clean,
    Compile,
    Watch,
    LiveReload,
    MinifyImages,
    MinifyScripts,
    WatchAll,
}

impl Operation {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Clean => "sass-clean",
            Operation::Compile => "sass",
            Operation::Watch => "sass-watch",
            Operation::LiveReload => "livereload",
            Operation::MinifyImages => "imagemin",
            Operation::MinifyScripts => "uglifyjs",
            Operation::WatchAll => "default",
        }
    }

    /// Operations that must run before this one
    pub fn prerequisites(&self, config: &BuildConfig) -> Vec<Operation> {
        match self {
            Operation::Clean | Operation::LiveReload => Vec::new(),
            Operation::MinifyImages | Operation::MinifyScripts => Vec::new(),
            Operation::Compile => vec![Operation::Clean],
            Operation::Watch => vec![Operation::Compile],
            Operation::WatchAll => {
                let mut ops = vec![Operation::Watch, Operation::LiveReload];
                if config.imagemin {
                    ops.push(Operation::MinifyImages);
                }
                ops
            }
        }
    }

    /// Blocks until the process is stopped
    #[inline]
    pub fn is_long_running(&self) -> bool {
        matches!(self, Operation::Watch | Operation::LiveReload)
    }

    /// Exists only to group prerequisites
    #[inline]
    pub fn is_composite(&self) -> bool {
        matches!(self, Operation::WatchAll)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expand `op` into an ordered, de-duplicated step list.
///
/// Prerequisites come before dependents, composites are dropped, and
/// long-running steps are moved after all one-shot steps.
pub fn plan(op: Operation, config: &BuildConfig) -> Vec<Operation> {
    fn visit(op: Operation, config: &BuildConfig, out: &mut Vec<Operation>) {
        if out.contains(&op) {
            return;
        }
        for pre in op.prerequisites(config) {
            visit(pre, config, out);
        }
        if !op.is_composite() && !out.contains(&op) {
            out.push(op);
        }
    }

    let mut steps = Vec::with_capacity(6);
    visit(op, config, &mut steps);

    let (one_shot, long_running): (Vec<_>, Vec<_>) =
        steps.into_iter().partition(|s| !s.is_long_running());
    one_shot.into_iter().chain(long_running).collect()
}

/// Outcome of one step
#[derive(Debug)]
pub enum StepStatus {
    /// Completed, with a short human summary
    Success(String),
    /// Completed with failures (compile errors, failed tools)
    Failed(Vec<TaskError>),
    /// Not run: shutdown requested
    Cancelled,
}

/// Result of one executed step
#[derive(Debug)]
pub struct StepResult {
    pub operation: Operation,
    pub status: StepStatus,
    pub duration: Duration,
}

/// Aggregate of a run
#[derive(Debug, Default)]
pub struct RunReport {
    pub steps: Vec<StepResult>,
}

impl RunReport {
    pub fn has_failure(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Failed(_)))
    }

    pub fn was_cancelled(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Cancelled))
    }
}

/// Sequences operations against one resolved configuration
pub struct TaskRunner<'a> {
    config: &'a BuildConfig,
    alert: Alert,
    prefixer: Prefixer,
    shutdown: &'a AtomicBool,
}

impl<'a> TaskRunner<'a> {
    pub fn new(config: &'a BuildConfig, prefixer: Prefixer, shutdown: &'a AtomicBool) -> Self {
        Self {
            config,
            alert: Alert::new(config.beep),
            prefixer,
            shutdown,
        }
    }

    /// Run `op` and everything it depends on
    pub fn run(&self, op: Operation) -> Result<RunReport, TaskError> {
        let steps = plan(op, self.config);
        tracing::debug!(
            "plan for {op}: {}",
            steps.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" -> ")
        );

        let mut report = RunReport::default();
        let mut loop_plan = LoopPlan::default();

        for step in steps {
            match step {
                Operation::Watch => loop_plan.compile_on_change = true,
                Operation::LiveReload => loop_plan.live_reload = true,
                _ => report.steps.push(self.run_step(step)),
            }
        }

        if loop_plan.is_active() && !self.shutdown.load(Ordering::Relaxed) {
            run_event_loop(self.config, &self.prefixer, &self.alert, loop_plan, self.shutdown)?;
        }

        Ok(report)
    }

    /// Execute a single one-shot step
    pub fn run_step(&self, op: Operation) -> StepResult {
        let start = Instant::now();

        if self.shutdown.load(Ordering::Relaxed) {
            return StepResult {
                operation: op,
                status: StepStatus::Cancelled,
                duration: start.elapsed(),
            };
        }

        crate::logger::separator(op.as_str());
        let status = match op {
            Operation::Clean => {
                let removed = remove_stale_maps(&self.config.style_output_dir);
                StepStatus::Success(format!("{removed} map(s) removed"))
            }
            Operation::Compile => {
                let report = compile_all(self.config, &self.prefixer);
                if report.is_success() {
                    StepStatus::Success(format!("{} file(s) written", report.written.len()))
                } else {
                    StepStatus::Failed(report.failures)
                }
            }
            Operation::MinifyImages => {
                let (stats, failures) = minify_images(self.config, self.shutdown);
                if failures.is_empty() {
                    StepStatus::Success(image_summary(&stats))
                } else {
                    StepStatus::Failed(failures)
                }
            }
            Operation::MinifyScripts => match &self.config.scripts {
                Some(bundle) => match minify_scripts(bundle) {
                    Ok(out) => StepStatus::Success(format!("wrote {}", out.display())),
                    Err(e) => StepStatus::Failed(vec![e]),
                },
                None => StepStatus::Failed(vec![TaskError::NoScriptSource]),
            },
            // Long-running and composite steps are handled by `run`
            Operation::Watch | Operation::LiveReload | Operation::WatchAll => {
                StepStatus::Success(String::new())
            }
        };

        match &status {
            StepStatus::Success(summary) => {
                if !summary.is_empty() {
                    tracing::debug!("{op}: {summary}");
                }
                self.alert.done(op.as_str());
            }
            StepStatus::Failed(errors) => {
                // compile_all already logs each failing entry
                if op != Operation::Compile {
                    for e in errors {
                        tracing::error!("{op}: {e}");
                    }
                }
                self.alert.failed(op.as_str());
            }
            StepStatus::Cancelled => {}
        }

        StepResult {
            operation: op,
            status,
            duration: start.elapsed(),
        }
    }
}

fn image_summary(stats: &ImageStats) -> String {
    format!(
        "{} image(s) optimized, {} unchanged, {} byte(s) saved",
        stats.optimized, stats.unchanged, stats.bytes_saved
    )
}
