//! Lossless image optimization for theme image directories.
//!
//! - SVG: minified in-process (comments, editor metadata and
//!   whitespace-only text removed)
//! - PNG, JPEG, GIF: `optipng`, `jpegoptim`, `gifsicle` when installed
//!
//! Files are optimized in parallel and only replaced when the result is
//! smaller than the original.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::BuildConfig;
use crate::error::TaskError;
use crate::tools;

/// Image formats this module knows how to optimize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Svg,
}

impl ImageKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(ImageKind::Png),
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "gif" => Some(ImageKind::Gif),
            "svg" => Some(ImageKind::Svg),
            _ => None,
        }
    }

    /// External optimizer for raster formats
    #[inline]
    pub fn tool_name(&self) -> Option<&'static str> {
        match self {
            ImageKind::Png => Some("optipng"),
            ImageKind::Jpeg => Some("jpegoptim"),
            ImageKind::Gif => Some("gifsicle"),
            ImageKind::Svg => None,
        }
    }

    fn tool_args(&self) -> &'static [&'static str] {
        match self {
            ImageKind::Png => &["-o2", "-quiet"],
            ImageKind::Jpeg => &["--strip-all", "--quiet"],
            ImageKind::Gif => &["-O2", "--batch"],
            ImageKind::Svg => &[],
        }
    }
}

/// Outcome totals of an optimization run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImageStats {
    pub optimized: u64,
    pub unchanged: u64,
    pub bytes_saved: u64,
}

/// Cache-line aligned counter, one per line to avoid false sharing
/// between rayon workers
#[repr(align(64))]
#[derive(Default)]
struct PaddedCounter(AtomicU64);

impl PaddedCounter {
    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Counters {
    optimized: PaddedCounter,
    unchanged: PaddedCounter,
    bytes_saved: PaddedCounter,
}

impl Counters {
    fn snapshot(&self) -> ImageStats {
        ImageStats {
            optimized: self.optimized.get(),
            unchanged: self.unchanged.get(),
            bytes_saved: self.bytes_saved.get(),
        }
    }
}

/// Installed raster optimizers
#[derive(Debug, Default, Clone)]
pub struct Optimizers {
    optipng: Option<PathBuf>,
    jpegoptim: Option<PathBuf>,
    gifsicle: Option<PathBuf>,
}

impl Optimizers {
    pub fn detect() -> Self {
        let found = Self {
            optipng: tools::find("optipng"),
            jpegoptim: tools::find("jpegoptim"),
            gifsicle: tools::find("gifsicle"),
        };
        for kind in [ImageKind::Png, ImageKind::Jpeg, ImageKind::Gif] {
            if found.tool_for(kind).is_none() {
                tracing::debug!(
                    "{} not found, {:?} images left as-is",
                    kind.tool_name().unwrap_or_default(),
                    kind
                );
            }
        }
        found
    }

    /// No external tools, SVG only
    pub fn none() -> Self {
        Self::default()
    }

    pub fn tool_for(&self, kind: ImageKind) -> Option<&Path> {
        match kind {
            ImageKind::Png => self.optipng.as_deref(),
            ImageKind::Jpeg => self.jpegoptim.as_deref(),
            ImageKind::Gif => self.gifsicle.as_deref(),
            ImageKind::Svg => None,
        }
    }
}

/// Image files under `dirs`, sorted, hidden files skipped
pub fn collect_images(dirs: &[PathBuf]) -> Vec<(PathBuf, ImageKind)> {
    let mut images: Vec<(PathBuf, ImageKind)> = dirs
        .iter()
        .flat_map(|dir| WalkDir::new(dir).follow_links(true).into_iter())
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| {
            let kind = ImageKind::from_path(e.path())?;
            Some((e.into_path(), kind))
        })
        .collect();
    images.sort_by(|a, b| a.0.cmp(&b.0));
    images.dedup_by(|a, b| a.0 == b.0);
    images
}

// ==================== SVG ====================

/// Elements written by drawing tools that browsers ignore
fn is_editor_element(name: &[u8]) -> bool {
    name == b"metadata" || name.starts_with(b"sodipodi:") || name.starts_with(b"inkscape:")
}

fn is_editor_attribute(key: &[u8]) -> bool {
    const PREFIXES: &[&[u8]] = &[
        b"sodipodi:",
        b"inkscape:",
        b"xmlns:sodipodi",
        b"xmlns:inkscape",
        b"xmlns:rdf",
        b"xmlns:cc",
        b"xmlns:dc",
    ];
    PREFIXES.iter().any(|p| key.starts_with(p))
}

fn clean_start<'a>(e: &'a BytesStart<'_>) -> Result<BytesStart<'a>, String> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if !is_editor_attribute(attr.key.as_ref()) {
            out.push_attribute(attr);
        }
    }
    Ok(out)
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), String> {
    writer.write_event(event).map_err(|e| e.to_string())
}

/// Minify an SVG document
pub fn minify_svg(input: &str) -> Result<Vec<u8>, String> {
    let mut reader = Reader::from_str(input);
    let mut writer = Writer::new(Vec::with_capacity(input.len()));
    // Depth inside a dropped element
    let mut skip = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| {
            format!("parse error at byte {}: {e}", reader.buffer_position())
        })?;

        match event {
            Event::Eof => break,
            Event::Start(e) => {
                if skip > 0 || is_editor_element(e.name().as_ref()) {
                    skip += 1;
                    continue;
                }
                write_event(&mut writer, Event::Start(clean_start(&e)?))?;
            }
            Event::End(e) => {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                write_event(&mut writer, Event::End(e))?;
            }
            Event::Empty(e) => {
                if skip > 0 || is_editor_element(e.name().as_ref()) {
                    continue;
                }
                write_event(&mut writer, Event::Empty(clean_start(&e)?))?;
            }
            Event::Text(e) => {
                if skip == 0 && !e.iter().all(u8::is_ascii_whitespace) {
                    write_event(&mut writer, Event::Text(e))?;
                }
            }
            Event::CData(e) => {
                if skip == 0 {
                    write_event(&mut writer, Event::CData(e))?;
                }
            }
            // An internal subset declares entities the body may reference
            Event::DocType(e) => {
                if e.contains(&b'[') {
                    write_event(&mut writer, Event::DocType(e))?;
                }
            }
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) => {}
        }
    }

    Ok(writer.into_inner())
}

// ==================== Optimization ====================

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Replaced, with the number of bytes saved
    Optimized(u64),
    Unchanged,
}

/// Replace `path` with `candidate` bytes if they are smaller
fn replace_if_smaller(path: &Path, original: u64, candidate: &[u8]) -> Result<Outcome, TaskError> {
    let new_len = candidate.len() as u64;
    if new_len >= original {
        return Ok(Outcome::Unchanged);
    }
    fs::write(path, candidate).map_err(|e| TaskError::io(path, e))?;
    Ok(Outcome::Optimized(original - new_len))
}

/// Sibling scratch file, hidden and with an extension the watcher ignores
fn scratch_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.imagemin.tmp"))
}

fn optimize_raster(
    path: &Path,
    tool: &Path,
    kind: ImageKind,
    original: u64,
) -> Result<Outcome, TaskError> {
    let scratch = scratch_path(path);
    fs::copy(path, &scratch).map_err(|e| TaskError::io(&scratch, e))?;

    let mut args: Vec<&OsStr> = kind.tool_args().iter().map(OsStr::new).collect();
    args.push(scratch.as_os_str());

    let result = tools::run(tool, args, None)
        .and_then(|_| fs::read(&scratch).map_err(|e| TaskError::io(&scratch, e)))
        .and_then(|bytes| replace_if_smaller(path, original, &bytes));

    let _ = fs::remove_file(&scratch);
    result
}

/// Optimize one image in place
pub fn optimize_file(
    path: &Path,
    kind: ImageKind,
    optimizers: &Optimizers,
) -> Result<Outcome, TaskError> {
    let original = fs::metadata(path).map_err(|e| TaskError::io(path, e))?.len();

    match kind {
        ImageKind::Svg => {
            let text = fs::read_to_string(path).map_err(|e| TaskError::io(path, e))?;
            let minified = minify_svg(&text).map_err(|message| TaskError::Image {
                path: path.to_path_buf(),
                message,
            })?;
            replace_if_smaller(path, original, &minified)
        }
        _ => match optimizers.tool_for(kind) {
            Some(tool) => optimize_raster(path, tool, kind, original),
            None => Ok(Outcome::Unchanged),
        },
    }
}

/// Optimize every image under the configured image directories
pub fn minify_images(config: &BuildConfig, shutdown: &AtomicBool) -> (ImageStats, Vec<TaskError>) {
    minify_images_with(config, &Optimizers::detect(), shutdown)
}

pub fn minify_images_with(
    config: &BuildConfig,
    optimizers: &Optimizers,
    shutdown: &AtomicBool,
) -> (ImageStats, Vec<TaskError>) {
    if config.image_dirs.is_empty() {
        tracing::warn!("no image directory found, nothing to optimize");
        return (ImageStats::default(), Vec::new());
    }
    for dir in &config.image_dirs {
        tracing::info!("optimizing images in {}", dir.display());
    }

    let images = collect_images(&config.image_dirs);
    let counters = Counters::default();
    let failures = Mutex::new(Vec::new());

    let progress = config.verbose.then(|| {
        let pb = ProgressBar::new(images.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    });

    images.par_iter().for_each(|(path, kind)| {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }

        match optimize_file(path, *kind, optimizers) {
            Ok(Outcome::Optimized(saved)) => {
                tracing::debug!("optimized {} (-{saved} B)", path.display());
                counters.optimized.add(1);
                counters.bytes_saved.add(saved);
            }
            Ok(Outcome::Unchanged) => counters.unchanged.add(1),
            Err(e) => {
                if let Ok(mut f) = failures.lock() {
                    f.push(e);
                }
            }
        }

        if let Some(pb) = &progress {
            pb.inc(1);
        }
    });

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let stats = counters.snapshot();
    tracing::info!(
        "{} image(s) optimized, {} B saved",
        stats.optimized,
        stats.bytes_saved
    );
    (stats, failures.into_inner().unwrap_or_default())
}
