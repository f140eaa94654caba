//! File watching for `watch` and `watch-all`.
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────┐
//! │ notify   │──▶│ Debouncer │──▶│ classify     │
//! │ events   │   │ (200ms)   │   │              │
//! └──────────┘   └───────────┘   └──────┬───────┘
//!                          style source │ output, templates, images, scripts
//!                        ┌──────────────┴─────────────┐
//!                        ▼                            ▼
//!               clean + compile pass         live-reload broadcast
//! ```
//!
//! Passes run synchronously on the loop thread, so two never overlap.
//! Changes that arrive during a pass wait in the channel and form the next
//! debounced batch, which triggers a single follow-up pass.
//!
//! A compile failure is logged and the loop keeps running. The loop ends
//! when the shutdown flag is raised.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecursiveMode, Watcher};

use crate::clean::remove_stale_maps;
use crate::compiler::{compile_all, Prefixer};
use crate::config::BuildConfig;
use crate::error::TaskError;
use crate::livereload::{self, Hub};
use crate::logger::Alert;
use crate::theme::STYLE_EXTENSIONS;

const DEBOUNCE: Duration = Duration::from_millis(200);

/// Receive timeout while nothing is pending, bounds shutdown latency
const IDLE_POLL: Duration = Duration::from_millis(500);


/// Which long-running behaviors the loop provides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopPlan {
    /// Recompile when a style source changes
    pub compile_on_change: bool,
    /// Serve live-reload clients and notify them of output changes
    pub live_reload: bool,
}

impl LoopPlan {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.compile_on_change || self.live_reload
    }
}

/// Editor swap and backup files
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bak" | "swp" | "swo" | "swx" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
        || name == "4913"
}

fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

// ==================== Debouncer ====================

/// Batches bursts of file events into one change set
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: BTreeSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<I: IntoIterator<Item = PathBuf>>(&mut self, paths: I) {
        let before = self.pending.len();
        self.pending
            .extend(paths.into_iter().filter(|p| !is_temp_file(p)));
        if self.pending.len() != before {
            self.last_event = Some(Instant::now());
        }
    }

    /// Pending changes that have been quiet for the debounce window
    pub fn ready(&self) -> bool {
        !self.pending.is_empty() && self.last_event.is_some_and(|t| t.elapsed() >= DEBOUNCE)
    }

    pub fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            IDLE_POLL
        } else {
            DEBOUNCE
        }
    }
}

// ==================== Classification ====================

/// What a changed path means for the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Style source, needs a compile pass
    Style,
    /// Browser-visible output, needs a reload
    Reload,
    Ignored,
}

/// Maps changed paths to loop actions
#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    style_source: Option<PathBuf>,
    reload_roots: Vec<PathBuf>,
}

/// Resolve symlinks so roots match the paths notify reports
fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl ChangeClassifier {
    pub fn new(config: &BuildConfig, plan: LoopPlan) -> Self {
        let style_source = plan
            .compile_on_change
            .then(|| canonical(&config.style_source_dir));

        let mut reload_roots = Vec::new();
        if plan.live_reload {
            reload_roots.push(config.style_output_dir.clone());
            reload_roots.extend(config.template_dir.iter().cloned());
            if config.imagemin {
                reload_roots.extend(config.image_dirs.iter().cloned());
            }
            if let Some(bundle) = &config.scripts {
                reload_roots.push(bundle.dest_dir.clone());
            }
        }
        let mut reload_roots: Vec<PathBuf> = reload_roots.into_iter().map(|p| canonical(&p)).collect();
        reload_roots.sort();
        reload_roots.dedup();

        Self {
            style_source,
            reload_roots,
        }
    }

    pub fn classify(&self, path: &Path) -> Change {
        if is_temp_file(path) {
            return Change::Ignored;
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        if let Some(source) = &self.style_source {
            if STYLE_EXTENSIONS.contains(&ext.as_str()) && path.starts_with(source) {
                return Change::Style;
            }
        }

        if ext != "map" && self.reload_roots.iter().any(|root| path.starts_with(root)) {
            return Change::Reload;
        }

        Change::Ignored
    }

    /// Directories to watch, with nested roots folded into their parents
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut all: Vec<PathBuf> = self
            .style_source
            .iter()
            .chain(self.reload_roots.iter())
            .cloned()
            .collect();
        all.sort();
        all.dedup();

        let mut roots: Vec<PathBuf> = Vec::with_capacity(all.len());
        for path in all {
            if !roots.iter().any(|r| path.starts_with(r)) {
                roots.push(path);
            }
        }
        roots
    }
}

// ==================== Event loop ====================

struct LoopContext<'a> {
    config: &'a BuildConfig,
    prefixer: &'a Prefixer,
    alert: &'a Alert,
    classifier: ChangeClassifier,
    hub: Option<Hub>,
}

impl LoopContext<'_> {
    /// Act on one debounced batch. Returns whether a compile pass ran.
    fn handle_changes(&self, paths: &[PathBuf]) -> bool {
        let mut style_changed = false;
        let mut reloads = Vec::new();

        for path in paths {
            match self.classifier.classify(path) {
                Change::Style => {
                    tracing::info!("changed: {}", path.display());
                    style_changed = true;
                }
                Change::Reload => reloads.push(path),
                Change::Ignored => {}
            }
        }

        if style_changed {
            self.compile_pass();
        }

        if let Some(hub) = &self.hub {
            for path in reloads {
                hub.reload(path);
            }
        }

        style_changed
    }

    /// Clean and compile once, blocking the loop until done
    fn compile_pass(&self) {
        crate::logger::separator("sass");
        remove_stale_maps(&self.config.style_output_dir);

        let report = compile_all(self.config, self.prefixer);
        if report.is_success() {
            self.alert.done("sass");
        } else {
            self.alert.failed("sass");
        }
    }
}

/// Run the watch / live-reload loop until `shutdown` is raised
pub fn run_event_loop(
    config: &BuildConfig,
    prefixer: &Prefixer,
    alert: &Alert,
    plan: LoopPlan,
    shutdown: &AtomicBool,
) -> Result<(), TaskError> {
    let hub = if plan.live_reload {
        crate::logger::separator("livereload");
        let hub = Hub::new();
        livereload::start(config.livereload_port, hub.clone())?;
        Some(hub)
    } else {
        None
    };

    let ctx = LoopContext {
        config,
        prefixer,
        alert,
        classifier: ChangeClassifier::new(config, plan),
        hub,
    };

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx)?;

    if plan.compile_on_change {
        crate::logger::separator("sass-watch");
    }
    for root in ctx.classifier.watch_roots() {
        if !root.is_dir() {
            tracing::debug!("not watching missing {}", root.display());
            continue;
        }
        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::info!("watching {}", root.display());
    }

    let mut debouncer = Debouncer::new();

    while !shutdown.load(Ordering::Relaxed) {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add(event.paths),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("watch error: {e}"),
            Err(RecvTimeoutError::Timeout) if debouncer.ready() => {
                ctx.handle_changes(&debouncer.take());
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::info!("stopping watchers");
    Ok(())
}
