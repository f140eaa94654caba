//! Style sheet compilation.
//!
//! Each entry file goes through the same pipeline:
//!
//! 1. compile with `rsass` in the configured output style
//! 2. write `<out>/<stem>.css`
//! 3. vendor-prefix in place with `postcss` + `autoprefixer` when installed
//! 4. when source maps are on, write `<out>/<stem>.css.map` and append the
//!    `sourceMappingURL` annotation
//!
//! A failing entry is reported and the remaining entries still compile.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use rsass::output::{Format, Style};
use serde::Serialize;

use crate::config::{BuildConfig, OutputStyle};
use crate::error::TaskError;
use crate::theme::EntryFile;
use crate::tools;

/// Browsers targeted by vendor prefixing
pub const BROWSERS: &str =
    "last 2 versions, safari 5, ie 8, ie 9, opera 12.1, ios 6, android 4";

/// Map the configured output style onto the compiler's formats.
/// The compiler only knows expanded and compressed output.
pub fn sass_format(style: OutputStyle) -> Format {
    let style = match style {
        OutputStyle::Expanded | OutputStyle::Nested => Style::Expanded,
        OutputStyle::Compact | OutputStyle::Compressed => Style::Compressed,
    };
    Format {
        style,
        ..Default::default()
    }
}

/// Vendor prefixer backed by the external `postcss` CLI
#[derive(Debug, Clone, Default)]
pub struct Prefixer {
    postcss: Option<PathBuf>,
}

impl Prefixer {
    /// Look up `postcss` on `PATH`
    pub fn detect() -> Self {
        let postcss = tools::find("postcss");
        if postcss.is_none() {
            tracing::debug!("postcss not found, vendor prefixing skipped");
        }
        Self { postcss }
    }

    /// A prefixer that never runs
    pub fn disabled() -> Self {
        Self { postcss: None }
    }

    /// Prefix `css_file` in place
    pub fn prefix(&self, css_file: &Path) -> Result<(), TaskError> {
        let Some(postcss) = &self.postcss else {
            return Ok(());
        };
        let file = css_file.as_os_str();
        tools::run_with_env(
            postcss,
            [
                file,
                "--use".as_ref(),
                "autoprefixer".as_ref(),
                "--no-map".as_ref(),
                "--replace".as_ref(),
            ],
            css_file.parent(),
            &[("BROWSERSLIST", BROWSERS)],
        )?;
        Ok(())
    }
}

/// Version 3 source map
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    pub file: String,
    pub source_root: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    /// Map for one compiled entry. The compiler reports no segment
    /// mappings, so the map carries the source reference and content.
    pub fn for_entry(entry: &EntryFile, css_path: &Path, map_dir: &Path) -> Result<Self, TaskError> {
        let content = fs::read_to_string(&entry.path).map_err(|e| TaskError::io(&entry.path, e))?;
        let file = css_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Self {
            version: 3,
            file,
            source_root: String::new(),
            sources: vec![relative_url(&entry.path, map_dir)],
            sources_content: vec![content],
            names: Vec::new(),
            mappings: String::new(),
        })
    }
}

/// `/`-separated path from `base` dir to `target`, for map `sources`
pub fn relative_url(target: &Path, base: &Path) -> String {
    let target: Vec<Component<'_>> = target.components().collect();
    let base: Vec<Component<'_>> = base.components().collect();
    let common = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::with_capacity(base.len() - common + target.len() - common);
    parts.extend(std::iter::repeat("..".to_string()).take(base.len() - common));
    parts.extend(
        target[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().to_string()),
    );
    parts.join("/")
}

/// Outcome of one compile pass
#[derive(Debug, Default)]
pub struct CompileReport {
    /// Files written, style sheets and maps
    pub written: Vec<PathBuf>,
    /// Per-entry failures
    pub failures: Vec<TaskError>,
    pub duration: Duration,
}

impl CompileReport {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Compile a single entry, returns the files written
pub fn compile_entry(
    entry: &EntryFile,
    config: &BuildConfig,
    prefixer: &Prefixer,
) -> Result<Vec<PathBuf>, TaskError> {
    let out_dir = &config.style_output_dir;
    let css_path = entry.css_path(out_dir);

    tracing::debug!("input : {}", entry.path.display());
    tracing::debug!("output: {}", css_path.display());

    let css = rsass::compile_scss_path(&entry.path, sass_format(config.output_style)).map_err(
        |e| TaskError::Compile {
            entry: entry.path.clone(),
            message: e.to_string(),
        },
    )?;
    fs::write(&css_path, &css).map_err(|e| TaskError::io(&css_path, e))?;

    if let Err(e) = prefixer.prefix(&css_path) {
        tracing::warn!("vendor prefixing skipped for {}: {e}", entry.name);
    }

    let mut written = vec![css_path.clone()];

    if config.source_maps {
        let map_path = entry.map_path(out_dir);
        let map = SourceMap::for_entry(entry, &css_path, out_dir)?;
        let json = serde_json::to_vec(&map).map_err(|e| TaskError::Compile {
            entry: entry.path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&map_path, json).map_err(|e| TaskError::io(&map_path, e))?;

        let mut css = fs::read_to_string(&css_path).map_err(|e| TaskError::io(&css_path, e))?;
        if !css.ends_with('\n') {
            css.push('\n');
        }
        let map_name = map_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        css.push_str(&format!("/*# sourceMappingURL={map_name} */\n"));
        fs::write(&css_path, css).map_err(|e| TaskError::io(&css_path, e))?;

        written.push(map_path);
    }

    Ok(written)
}

/// Compile every entry file into the output directory
pub fn compile_all(config: &BuildConfig, prefixer: &Prefixer) -> CompileReport {
    let start = Instant::now();
    let mut report = CompileReport::default();

    for entry in &config.entry_files {
        match compile_entry(entry, config, prefixer) {
            Ok(files) => {
                tracing::info!(
                    "compiled {} -> {}",
                    entry.name,
                    entry.css_path(&config.style_output_dir).display()
                );
                report.written.extend(files);
            }
            Err(e) => {
                tracing::error!("{e}");
                report.failures.push(e);
            }
        }
    }

    report.duration = start.elapsed();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_config(temp: &TempDir, source_maps: bool, style: OutputStyle) -> BuildConfig {
        let theme = temp.path().to_path_buf();
        let scss = theme.join("scss");
        let css = theme.join("css");
        fs::create_dir_all(&scss).unwrap();
        fs::create_dir_all(&css).unwrap();
        fs::write(
            scss.join("style.scss"),
            "$brand: #336699;\n.header { .title { color: $brand; } }\n",
        )
        .unwrap();

        BuildConfig {
            theme_dir: theme,
            style_source_dir: scss.clone(),
            style_output_dir: css,
            entry_files: vec![EntryFile {
                name: "style.scss".to_string(),
                path: scss.join("style.scss"),
            }],
            template_dir: None,
            image_dirs: Vec::new(),
            assets_dir: None,
            output_style: style,
            source_maps,
            dev_build: source_maps,
            verbose: false,
            debug: false,
            beep: false,
            livereload_port: 35729,
            imagemin: false,
            scripts: None,
            jobs: 1,
        }
    }

    // ==================== format tests ====================

    #[test]
    fn test_sass_format_mapping() {
        assert!(matches!(sass_format(OutputStyle::Expanded).style, Style::Expanded));
        assert!(matches!(sass_format(OutputStyle::Nested).style, Style::Expanded));
        assert!(matches!(sass_format(OutputStyle::Compressed).style, Style::Compressed));
        assert!(matches!(sass_format(OutputStyle::Compact).style, Style::Compressed));
    }

    // ==================== relative_url tests ====================

    #[test]
    fn test_relative_url_sibling_dir() {
        assert_eq!(
            relative_url(Path::new("/t/scss/style.scss"), Path::new("/t/css")),
            "../scss/style.scss"
        );
    }

    #[test]
    fn test_relative_url_nested() {
        assert_eq!(
            relative_url(Path::new("/t/scss/style.scss"), Path::new("/t/scss/css")),
            "../style.scss"
        );
        assert_eq!(
            relative_url(Path::new("/t/css/a.scss"), Path::new("/t/css")),
            "a.scss"
        );
    }

    // ==================== compile tests ====================

    #[test]
    fn test_compile_expanded() {
        let temp = TempDir::new().unwrap();
        let config = make_config(&temp, false, OutputStyle::Expanded);

        let report = compile_all(&config, &Prefixer::disabled());

        assert!(report.is_success());
        let css = fs::read_to_string(config.style_output_dir.join("style.css")).unwrap();
        assert!(css.contains(".header .title"));
        assert!(css.contains("#336699") || css.contains("#369"));
        assert!(!css.contains("sourceMappingURL"));
        assert_eq!(report.written.len(), 1);
    }

    #[test]
    fn test_compile_compressed_has_no_newlines_inside_rules() {
        let temp = TempDir::new().unwrap();
        let config = make_config(&temp, false, OutputStyle::Compressed);

        compile_all(&config, &Prefixer::disabled());

        let css = fs::read_to_string(config.style_output_dir.join("style.css")).unwrap();
        assert!(css.trim().lines().count() <= 1);
        assert!(css.contains(".header .title{"));
    }

    #[test]
    fn test_compile_with_source_map() {
        let temp = TempDir::new().unwrap();
        let config = make_config(&temp, true, OutputStyle::Expanded);

        let report = compile_all(&config, &Prefixer::disabled());

        assert!(report.is_success());
        let map_path = config.style_output_dir.join("style.css.map");
        assert!(report.written.contains(&map_path));

        let map: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&map_path).unwrap()).unwrap();
        assert_eq!(map["version"], 3);
        assert_eq!(map["file"], "style.css");
        assert_eq!(map["sources"][0], "../scss/style.scss");
        assert!(map["sourcesContent"][0].as_str().unwrap().contains("$brand"));

        let css = fs::read_to_string(config.style_output_dir.join("style.css")).unwrap();
        assert!(css.trim_end().ends_with("/*# sourceMappingURL=style.css.map */"));
    }

    #[test]
    fn test_compile_error_reported_and_other_entries_continue() {
        let temp = TempDir::new().unwrap();
        let mut config = make_config(&temp, false, OutputStyle::Expanded);
        let broken = config.style_source_dir.join("broken.scss");
        fs::write(&broken, ".a { color: $undefined-var; }").unwrap();
        config.entry_files.insert(
            0,
            EntryFile {
                name: "broken.scss".to_string(),
                path: broken,
            },
        );

        let report = compile_all(&config, &Prefixer::disabled());

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], TaskError::Compile { .. }));
        assert!(config.style_output_dir.join("style.css").exists());
        assert!(!config.style_output_dir.join("broken.css").exists());
    }

    #[test]
    fn test_compile_resolves_imports() {
        let temp = TempDir::new().unwrap();
        let config = make_config(&temp, false, OutputStyle::Expanded);
        fs::write(
            config.style_source_dir.join("_vars.scss"),
            "$gap: 12px;\n",
        )
        .unwrap();
        fs::write(
            config.style_source_dir.join("style.scss"),
            "@import 'vars';\n.grid { margin: $gap; }\n",
        )
        .unwrap();

        let report = compile_all(&config, &Prefixer::disabled());

        assert!(report.is_success());
        let css = fs::read_to_string(config.style_output_dir.join("style.css")).unwrap();
        assert!(css.contains("margin: 12px"));
    }

    #[test]
    fn test_prefixer_disabled_is_noop() {
        assert!(Prefixer::disabled()
            .prefix(Path::new("/nonexistent.css"))
            .is_ok());
    }
}
