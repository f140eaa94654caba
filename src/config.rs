//! CLI configuration and the resolved build configuration.

use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::probe::FsInspector;
use crate::resolver::{ResolveArgs, Resolver};
use crate::runner::Operation;
use crate::theme::{EntryFile, DEFAULT_ENTRY};

/// Default LiveReload protocol port
pub const LIVERELOAD_PORT: u16 = 35729;

/// Default name of the merged, minified script
pub const DEFAULT_SCRIPT_BUNDLE: &str = "scripts.min.js";

/// Sass build, watch and live-reload automation for Drupal themes
#[derive(Parser, Debug)]
#[command(name = "drupal-theme-build")]
#[command(version)]
#[command(about = "Sass build, watch and live-reload automation for Drupal themes")]
pub struct Cli {
    /// Operation to run
    #[arg(value_enum, default_value_t = Command::Default)]
    pub command: Command,

    /// Use development defaults (expanded output, source maps)
    #[arg(short = 'D', long)]
    pub dev: bool,

    /// Beep on completion of an important task
    #[arg(short = 'B', long)]
    pub beep: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug output (implies verbose)
    #[arg(long)]
    pub debug: bool,

    /// Drupal project root (defaults to the parent of the current directory)
    #[arg(short = 'r', long = "drupalroot", short_alias = 'd')]
    pub drupal_root: Option<PathBuf>,

    /// Theme name, looked up under the project root
    #[arg(short, long)]
    pub theme: Option<String>,

    /// SCSS source directory
    #[arg(short = 's', long = "scssdir", conflicts_with_all = ["drupal_root", "theme"])]
    pub scss_dir: Option<PathBuf>,

    /// CSS output directory
    #[arg(short = 'c', long = "cssdir", conflicts_with_all = ["drupal_root", "theme"])]
    pub css_dir: Option<PathBuf>,

    /// Entry files inside the SCSS directory (comma-separated, SCSS syntax only)
    #[arg(short = 'e', long = "scssfiles", short_alias = 'f', default_value = DEFAULT_ENTRY)]
    pub scss_files: String,

    /// CSS output style: compact|compressed|expanded|nested
    #[arg(short = 'y', long)]
    pub style: Option<String>,

    /// Generate source maps (default for --dev)
    #[arg(short = 'm', long)]
    pub sourcemap: bool,

    /// LiveReload server port
    #[arg(long = "livereload", value_name = "PORT", default_value_t = LIVERELOAD_PORT)]
    pub livereload_port: u16,

    /// Minify images as part of the default task
    #[arg(long)]
    pub imagemin: bool,

    /// Directory of JavaScript sources to merge and minify
    #[arg(long = "uglifysrc")]
    pub uglify_src: Option<PathBuf>,

    /// Destination directory for the minified script
    #[arg(long = "uglifydest")]
    pub uglify_dest: Option<PathBuf>,

    /// File name of the merged, minified script
    #[arg(long = "uglifyfile", default_value = DEFAULT_SCRIPT_BUNDLE)]
    pub uglify_file: String,

    /// Number of parallel image minification workers
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub jobs: usize,
}

/// Named operations accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Command {
    /// Compile, then watch sources and live-reload outputs
    #[value(alias = "watch")]
    Default,
    /// Clean stale maps and compile once
    Sass,
    /// Remove stale source maps
    SassClean,
    /// Compile, then recompile on every change
    SassWatch,
    /// Live-reload browsers when outputs change
    Livereload,
    /// Minify theme images
    Imagemin,
    /// Merge and minify theme scripts
    Uglifyjs,
    /// Show usage
    Usage,
}

impl Command {
    /// Operation this command runs, `None` for `usage`
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Command::Default => Some(Operation::WatchAll),
            Command::Sass => Some(Operation::Compile),
            Command::SassClean => Some(Operation::Clean),
            Command::SassWatch => Some(Operation::Watch),
            Command::Livereload => Some(Operation::LiveReload),
            Command::Imagemin => Some(Operation::MinifyImages),
            Command::Uglifyjs => Some(Operation::MinifyScripts),
            Command::Usage => None,
        }
    }
}

/// Compiler formatting mode for generated style sheets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStyle {
    Compact,
    Compressed,
    Expanded,
    Nested,
}

impl OutputStyle {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStyle::Compact => "compact",
            OutputStyle::Compressed => "compressed",
            OutputStyle::Expanded => "expanded",
            OutputStyle::Nested => "nested",
        }
    }

    /// Default style for a build kind
    #[inline]
    pub fn default_for(dev_build: bool) -> Self {
        if dev_build {
            OutputStyle::Expanded
        } else {
            OutputStyle::Compressed
        }
    }
}

impl FromStr for OutputStyle {
    type Err = ConfigError;

    /// Case-insensitive keyword parse
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(OutputStyle::Compact),
            "compressed" => Ok(OutputStyle::Compressed),
            "expanded" => Ok(OutputStyle::Expanded),
            "nested" => Ok(OutputStyle::Nested),
            _ => Err(ConfigError::InvalidOutputStyle(s.to_string())),
        }
    }
}

impl fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Script merge/minify target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBundle {
    /// Directory holding the `*.js` sources
    pub source_dir: PathBuf,
    /// Directory the merged file is written to
    pub dest_dir: PathBuf,
    /// Merged file name
    pub file_name: String,
}

impl ScriptBundle {
    pub fn output_path(&self) -> PathBuf {
        self.dest_dir.join(&self.file_name)
    }
}

/// Resolved configuration for one invocation. Read-only after construction.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Theme root the optional directories were probed from
    pub theme_dir: PathBuf,
    pub style_source_dir: PathBuf,
    pub style_output_dir: PathBuf,
    /// Entry files in the order given
    pub entry_files: Vec<EntryFile>,
    pub template_dir: Option<PathBuf>,
    pub image_dirs: Vec<PathBuf>,
    pub assets_dir: Option<PathBuf>,
    pub output_style: OutputStyle,
    pub source_maps: bool,
    pub dev_build: bool,
    pub verbose: bool,
    pub debug: bool,
    /// Audible alert on completion/error
    pub beep: bool,
    pub livereload_port: u16,
    /// Run image minification as part of watch-all
    pub imagemin: bool,
    pub scripts: Option<ScriptBundle>,
    /// Image minification workers, at least 1
    pub jobs: usize,
}

impl BuildConfig {
    /// Resolve the build configuration from CLI arguments against the
    /// real file system
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
        Resolver::new(FsInspector, cwd).resolve(&ResolveArgs::from(cli))
    }

    /// Human-readable build kind
    pub fn build_kind(&self) -> &'static str {
        if self.dev_build {
            "Development"
        } else {
            "Production"
        }
    }

    /// Log the main parameters the run is going to use
    pub fn log_summary(&self) {
        crate::logger::separator("invocation");
        tracing::info!("Build For        : {}", self.build_kind());
        tracing::info!("Theme Root Dir   : {}", self.theme_dir.display());
        tracing::info!("Theme SCSS Dir   : {}", self.style_source_dir.display());
        tracing::info!("Theme CSS Dir    : {}", self.style_output_dir.display());
        tracing::info!(
            "Entry Files      : {}",
            self.entry_files
                .iter()
                .map(|e| e.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        tracing::info!(
            "Source Maps      : {}",
            if self.source_maps { "Generate" } else { "Remove" }
        );
        tracing::info!("CSS Output Style : {}", self.output_style);
        if let Some(dir) = &self.template_dir {
            tracing::debug!("Templates Dir    : {}", dir.display());
        }
        for dir in &self.image_dirs {
            tracing::debug!("Images Dir       : {}", dir.display());
        }
        if let Some(dir) = &self.assets_dir {
            tracing::debug!("Assets Dir       : {}", dir.display());
        }
        crate::logger::separator("");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Cli parsing tests ====================

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["drupal-theme-build"]).unwrap();

        assert_eq!(cli.command, Command::Default);
        assert_eq!(cli.scss_files, "style");
        assert_eq!(cli.livereload_port, LIVERELOAD_PORT);
        assert_eq!(cli.uglify_file, DEFAULT_SCRIPT_BUNDLE);
        assert!(!cli.dev);
        assert!(!cli.beep);
        assert!(cli.style.is_none());
        assert!(cli.jobs >= 1);
    }

    #[test]
    fn test_cli_positional_commands() {
        let cases = [
            ("sass", Command::Sass),
            ("sass-clean", Command::SassClean),
            ("sass-watch", Command::SassWatch),
            ("livereload", Command::Livereload),
            ("imagemin", Command::Imagemin),
            ("uglifyjs", Command::Uglifyjs),
            ("usage", Command::Usage),
            ("watch", Command::Default),
        ];
        for (arg, expected) in cases {
            let cli = Cli::try_parse_from(["drupal-theme-build", arg]).unwrap();
            assert_eq!(cli.command, expected, "command {arg}");
        }
    }

    #[test]
    fn test_cli_short_flags_and_aliases() {
        let cli = Cli::try_parse_from([
            "drupal-theme-build",
            "sass",
            "-D",
            "-B",
            "-d",
            "/site",
            "-t",
            "foo",
            "-f",
            "style,admin",
            "-y",
            "Compressed",
            "-m",
        ])
        .unwrap();

        assert!(cli.dev);
        assert!(cli.beep);
        assert_eq!(cli.drupal_root, Some(PathBuf::from("/site")));
        assert_eq!(cli.theme.as_deref(), Some("foo"));
        assert_eq!(cli.scss_files, "style,admin");
        assert_eq!(cli.style.as_deref(), Some("Compressed"));
        assert!(cli.sourcemap);
    }

    #[test]
    fn test_cli_explicit_dirs_conflict_with_theme() {
        let result = Cli::try_parse_from([
            "drupal-theme-build",
            "--scssdir",
            "/a/scss",
            "--theme",
            "foo",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["drupal-theme-build", "build"]).is_err());
    }

    // ==================== Command tests ====================

    #[test]
    fn test_command_operation_mapping() {
        assert_eq!(Command::Default.operation(), Some(Operation::WatchAll));
        assert_eq!(Command::Sass.operation(), Some(Operation::Compile));
        assert_eq!(Command::SassClean.operation(), Some(Operation::Clean));
        assert_eq!(Command::SassWatch.operation(), Some(Operation::Watch));
        assert_eq!(Command::Livereload.operation(), Some(Operation::LiveReload));
        assert_eq!(Command::Imagemin.operation(), Some(Operation::MinifyImages));
        assert_eq!(Command::Uglifyjs.operation(), Some(Operation::MinifyScripts));
        assert_eq!(Command::Usage.operation(), None);
    }

    // ==================== OutputStyle tests ====================

    #[test]
    fn test_output_style_parse_case_insensitive() {
        assert_eq!("Compressed".parse::<OutputStyle>().unwrap(), OutputStyle::Compressed);
        assert_eq!("EXPANDED".parse::<OutputStyle>().unwrap(), OutputStyle::Expanded);
        assert_eq!("compact".parse::<OutputStyle>().unwrap(), OutputStyle::Compact);
        assert_eq!(" nested ".parse::<OutputStyle>().unwrap(), OutputStyle::Nested);
    }

    #[test]
    fn test_output_style_parse_invalid() {
        let err = "fancy".parse::<OutputStyle>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOutputStyle(ref v) if v == "fancy"));
        assert!("".parse::<OutputStyle>().is_err());
    }

    #[test]
    fn test_output_style_default_for() {
        assert_eq!(OutputStyle::default_for(true), OutputStyle::Expanded);
        assert_eq!(OutputStyle::default_for(false), OutputStyle::Compressed);
    }

    #[test]
    fn test_output_style_display() {
        assert_eq!(format!("{}", OutputStyle::Nested), "nested");
    }

    // ==================== ScriptBundle tests ====================

    #[test]
    fn test_script_bundle_output_path() {
        let bundle = ScriptBundle {
            source_dir: PathBuf::from("/t/js/src"),
            dest_dir: PathBuf::from("/t/js"),
            file_name: "site.min.js".to_string(),
        };
        assert_eq!(bundle.output_path(), PathBuf::from("/t/js/site.min.js"));
    }
}
