//! Turns CLI input into a [`BuildConfig`].
//!
//! Two mutually exclusive modes locate the style directories:
//!
//! - **Explicit**: `--scssdir` and/or `--cssdir`. A missing half is derived
//!   from the conventional sibling layouts.
//! - **Convention**: `--theme` (plus `--drupalroot`, defaulting to the parent
//!   of the working directory). Known Drupal theme layouts are probed in
//!   order.
//!
//! Template, image and assets directories are then looked up next to the
//! theme on a best-effort basis.

use std::path::{Component, Path, PathBuf};

use crate::config::{
    BuildConfig, Cli, OutputStyle, ScriptBundle, DEFAULT_SCRIPT_BUNDLE, LIVERELOAD_PORT,
};
use crate::error::ConfigError;
use crate::probe::{normalize, probe, validate, Candidate, Inspect, PathKind};
use crate::theme::{
    assets_candidates, css_candidates_for, script_source_candidates, scss_candidates_for,
    split_entry_list, theme_candidates, EntryFile, ThemeName, CSS_DIR, DEFAULT_ENTRY, IMAGE_DIRS,
    SCSS_DIR, TEMPLATES_DIR,
};

/// Resolution input, decoupled from clap
#[derive(Debug, Clone)]
pub struct ResolveArgs {
    pub scss_dir: Option<PathBuf>,
    pub css_dir: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub theme: Option<String>,
    /// Comma-delimited entry list
    pub entry_list: String,
    pub style: Option<String>,
    pub sourcemap: bool,
    pub dev: bool,
    pub verbose: bool,
    pub debug: bool,
    pub beep: bool,
    pub livereload_port: u16,
    pub imagemin: bool,
    pub uglify_src: Option<PathBuf>,
    pub uglify_dest: Option<PathBuf>,
    pub uglify_file: String,
    pub jobs: usize,
}

impl Default for ResolveArgs {
    fn default() -> Self {
        Self {
            scss_dir: None,
            css_dir: None,
            root: None,
            theme: None,
            entry_list: DEFAULT_ENTRY.to_string(),
            style: None,
            sourcemap: false,
            dev: false,
            verbose: false,
            debug: false,
            beep: false,
            livereload_port: LIVERELOAD_PORT,
            imagemin: false,
            uglify_src: None,
            uglify_dest: None,
            uglify_file: DEFAULT_SCRIPT_BUNDLE.to_string(),
            jobs: 1,
        }
    }
}

impl From<&Cli> for ResolveArgs {
    fn from(cli: &Cli) -> Self {
        Self {
            scss_dir: cli.scss_dir.clone(),
            css_dir: cli.css_dir.clone(),
            root: cli.drupal_root.clone(),
            theme: cli.theme.clone(),
            entry_list: cli.scss_files.clone(),
            style: cli.style.clone(),
            sourcemap: cli.sourcemap,
            dev: cli.dev,
            verbose: cli.verbose || cli.debug,
            debug: cli.debug,
            beep: cli.beep,
            livereload_port: cli.livereload_port,
            imagemin: cli.imagemin,
            uglify_src: cli.uglify_src.clone(),
            uglify_dest: cli.uglify_dest.clone(),
            uglify_file: cli.uglify_file.clone(),
            jobs: cli.jobs,
        }
    }
}

/// Located style directories plus the theme root they belong to
#[derive(Debug, Clone, PartialEq, Eq)]
struct StyleDirs {
    theme_dir: PathBuf,
    source: PathBuf,
    output: PathBuf,
}

/// Configuration resolver over an injectable file system view
pub struct Resolver<I> {
    inspector: I,
    cwd: PathBuf,
}

impl<I: Inspect> Resolver<I> {
    pub fn new(inspector: I, cwd: PathBuf) -> Self {
        Self { inspector, cwd }
    }

    /// Resolve a complete build configuration
    pub fn resolve(&self, args: &ResolveArgs) -> Result<BuildConfig, ConfigError> {
        let dirs = self.resolve_style_dirs(args)?;
        let entry_files = self.resolve_entries(&dirs.source, &args.entry_list)?;
        let output_style = resolve_output_style(args.style.as_deref(), args.dev)?;

        let template_dir = self.optional_dir(
            "templates",
            &[Candidate::dir(dirs.theme_dir.join(TEMPLATES_DIR))],
        );
        let image_dirs = self.image_dirs(&dirs.theme_dir);
        let assets_dir = self.optional_dir("assets", &assets_candidates(&dirs.theme_dir));
        let scripts = self.script_bundle(&dirs.theme_dir, args);

        Ok(BuildConfig {
            theme_dir: dirs.theme_dir,
            style_source_dir: dirs.source,
            style_output_dir: dirs.output,
            entry_files,
            template_dir,
            image_dirs,
            assets_dir,
            output_style,
            source_maps: args.sourcemap || args.dev,
            dev_build: args.dev,
            verbose: args.verbose,
            debug: args.debug,
            beep: args.beep,
            livereload_port: args.livereload_port,
            imagemin: args.imagemin,
            scripts,
            jobs: args.jobs.max(1),
        })
    }

    /// Make relative CLI paths absolute against the working directory
    fn absolute(&self, path: &Path) -> PathBuf {
        normalize(&self.cwd.join(path))
    }

    fn require_dir(&self, path: &Path) -> Result<PathBuf, ConfigError> {
        if validate(&self.inspector, path, PathKind::Directory) {
            Ok(normalize(path))
        } else {
            Err(ConfigError::not_a_dir(path))
        }
    }

    fn resolve_style_dirs(&self, args: &ResolveArgs) -> Result<StyleDirs, ConfigError> {
        let explicit = args.scss_dir.is_some() || args.css_dir.is_some();
        let convention = args.theme.is_some() || args.root.is_some();

        match (explicit, convention) {
            (true, true) => Err(ConfigError::ConflictingModes),
            (true, false) => self.resolve_explicit(args.scss_dir.as_deref(), args.css_dir.as_deref()),
            (false, true) => {
                let Some(theme) = args.theme.as_deref() else {
                    return Err(ConfigError::MissingLocation);
                };
                self.resolve_convention(args.root.as_deref(), theme)
            }
            (false, false) => Err(ConfigError::MissingLocation),
        }
    }

    fn resolve_explicit(
        &self,
        scss_dir: Option<&Path>,
        css_dir: Option<&Path>,
    ) -> Result<StyleDirs, ConfigError> {
        let (source, output) = match (scss_dir, css_dir) {
            (Some(scss), Some(css)) => (
                self.require_dir(&self.absolute(scss))?,
                self.require_dir(&self.absolute(css))?,
            ),
            (Some(scss), None) => {
                let scss = self.require_dir(&self.absolute(scss))?;
                let css = self.derive("css", &scss, css_candidates_for(&scss))?;
                (scss, css)
            }
            (None, Some(css)) => {
                let css = self.require_dir(&self.absolute(css))?;
                let scss = self.derive("scss", &css, scss_candidates_for(&css))?;
                (scss, css)
            }
            (None, None) => return Err(ConfigError::MissingLocation),
        };

        let theme_dir = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| source.clone());

        Ok(StyleDirs {
            theme_dir,
            source,
            output,
        })
    }

    fn derive(
        &self,
        what: &'static str,
        given: &Path,
        candidates: Vec<Candidate>,
    ) -> Result<PathBuf, ConfigError> {
        probe(&self.inspector, &candidates).ok_or_else(|| ConfigError::NoConventionalLayout {
            what,
            given: given.to_path_buf(),
            candidates: candidates.into_iter().map(|c| c.path).collect(),
        })
    }

    fn resolve_convention(&self, root: Option<&Path>, theme: &str) -> Result<StyleDirs, ConfigError> {
        let theme = ThemeName::parse(theme)
            .ok_or_else(|| ConfigError::InvalidThemeName(theme.to_string()))?;
        let root = match root {
            Some(root) => self.absolute(root),
            None => normalize(&self.cwd.join("..")),
        };

        let candidates = theme_candidates(&root, &theme);
        let theme_dir =
            probe(&self.inspector, &candidates).ok_or_else(|| ConfigError::ThemeNotFound {
                theme: theme.to_string(),
                root: root.clone(),
                candidates: candidates.into_iter().map(|c| c.path).collect(),
            })?;
        tracing::debug!("theme '{}' found at {}", theme, theme_dir.display());

        let source = self.require_dir(&theme_dir.join(SCSS_DIR))?;
        let output = self.require_dir(&theme_dir.join(CSS_DIR))?;

        Ok(StyleDirs {
            theme_dir,
            source,
            output,
        })
    }

    fn resolve_entries(&self, source_dir: &Path, list: &str) -> Result<Vec<EntryFile>, ConfigError> {
        let names = split_entry_list(list);
        if names.is_empty() {
            return Err(ConfigError::EmptyEntryList);
        }

        names
            .into_iter()
            .map(|name| {
                let path = source_dir.join(&name);
                if is_contained(&name) && validate(&self.inspector, &path, PathKind::File) {
                    Ok(EntryFile { name, path })
                } else {
                    Err(ConfigError::EntryNotFound {
                        name,
                        dir: source_dir.to_path_buf(),
                    })
                }
            })
            .collect()
    }

    /// Best-effort lookup: absence is logged, never fatal
    fn optional_dir(&self, what: &str, candidates: &[Candidate]) -> Option<PathBuf> {
        let found = probe(&self.inspector, candidates);
        if found.is_none() {
            tracing::debug!(
                "no {what} directory found (looked in {})",
                candidates
                    .iter()
                    .map(|c| c.path.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        found
    }

    fn image_dirs(&self, theme_dir: &Path) -> Vec<PathBuf> {
        let dirs: Vec<PathBuf> = IMAGE_DIRS
            .iter()
            .filter_map(|name| probe(&self.inspector, &[Candidate::dir(theme_dir.join(name))]))
            .collect();
        if dirs.is_empty() {
            tracing::debug!("no image directory found in {}", theme_dir.display());
        }
        dirs
    }

    fn script_bundle(&self, theme_dir: &Path, args: &ResolveArgs) -> Option<ScriptBundle> {
        let source_dir = match &args.uglify_src {
            Some(src) => {
                let src = self.absolute(src);
                if !validate(&self.inspector, &src, PathKind::Directory) {
                    tracing::warn!("script source {} is not a directory", src.display());
                    return None;
                }
                src
            }
            None => self.optional_dir("script source", &script_source_candidates(theme_dir))?,
        };
        let dest_dir = match &args.uglify_dest {
            Some(dest) => self.absolute(dest),
            None => normalize(&theme_dir.join("js")),
        };

        Some(ScriptBundle {
            source_dir,
            dest_dir,
            file_name: args.uglify_file.clone(),
        })
    }
}

/// Explicit style wins; otherwise expanded for dev, compressed for production
pub fn resolve_output_style(explicit: Option<&str>, dev: bool) -> Result<OutputStyle, ConfigError> {
    match explicit {
        Some(value) => value.parse(),
        None => Ok(OutputStyle::default_for(dev)),
    }
}

/// Entry names must stay inside the style source directory
fn is_contained(name: &str) -> bool {
    Path::new(name)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
