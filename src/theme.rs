//! Theme names, conventional theme layouts, and style entry files.
//!
//! Provides type-safe wrappers for theme names and entry files, and the
//! ordered candidate lists used to locate a theme inside a Drupal tree.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::probe::Candidate;

/// Web-root prefixes a Drupal install may put in front of `themes/`,
/// in probing order. Empty means the project root itself.
pub const WEB_ROOT_PREFIXES: &[&str] = &["", "public_html", "web"];

/// Theme directories relative to the themes dir, in probing order
pub const THEME_SUBDIRS: &[&str] = &["", "custom"];

/// Style source directory inside a theme
pub const SCSS_DIR: &str = "scss";
/// Compiled style output directory inside a theme
pub const CSS_DIR: &str = "css";
/// Template directory inside a theme
pub const TEMPLATES_DIR: &str = "templates";
/// Image directories inside a theme, every existing one is used
pub const IMAGE_DIRS: &[&str] = &["images", "img"];
/// Assets directory name, probed above the theme
pub const ASSETS_DIR: &str = "assets";

/// Default entry list when none is given
pub const DEFAULT_ENTRY: &str = "style";
/// Extensions accepted for entry files. Indented `.sass` syntax is not
/// supported by the compiler.
pub const STYLE_EXTENSIONS: &[&str] = &["scss"];

/// Logical theme name (e.g., "bootstrap_sub").
/// Newtype wrapper for validation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThemeName(Arc<str>);

impl ThemeName {
    /// Create a validated ThemeName, returning None for empty names or
    /// names that would escape the themes directory
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let valid = !s.is_empty()
            && s != "."
            && s != ".."
            && !s.contains('/')
            && !s.contains('\\');
        valid.then(|| Self(Arc::from(s)))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThemeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered theme directory candidates for `theme` under `root`
///
/// `themes/<n>`, `themes/custom/<n>`, then the same two under each
/// web-root prefix.
pub fn theme_candidates(root: &Path, theme: &ThemeName) -> Vec<Candidate> {
    // Pre-allocate for the full prefix x subdir grid
    let mut candidates = Vec::with_capacity(WEB_ROOT_PREFIXES.len() * THEME_SUBDIRS.len());
    for prefix in WEB_ROOT_PREFIXES {
        let themes = root.join(prefix).join("themes");
        for sub in THEME_SUBDIRS {
            candidates.push(Candidate::dir(themes.join(sub).join(theme.as_str())));
        }
    }
    candidates
}

/// Candidates for the compiled output dir given only the source dir
pub fn css_candidates_for(scss_dir: &Path) -> Vec<Candidate> {
    vec![
        Candidate::dir(scss_dir.join("..").join(CSS_DIR)),
        Candidate::dir(scss_dir.join(CSS_DIR)),
    ]
}

/// Candidates for the source dir given only the compiled output dir
pub fn scss_candidates_for(css_dir: &Path) -> Vec<Candidate> {
    vec![
        Candidate::dir(css_dir.join("..").join(SCSS_DIR)),
        Candidate::dir(css_dir.join(SCSS_DIR)),
    ]
}

/// Assets directory candidates at the two supported ancestor depths
pub fn assets_candidates(theme_dir: &Path) -> Vec<Candidate> {
    vec![
        Candidate::dir(theme_dir.join("..").join(ASSETS_DIR)),
        Candidate::dir(theme_dir.join("..").join("..").join(ASSETS_DIR)),
    ]
}

/// Script source candidates when `--uglifysrc` is not given
pub fn script_source_candidates(theme_dir: &Path) -> Vec<Candidate> {
    vec![
        Candidate::dir(theme_dir.join("js").join("src")),
        Candidate::dir(theme_dir.join("lib")),
    ]
}

/// A top-level style sheet handed directly to the compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFile {
    /// File name as looked up, e.g. "style.scss"
    pub name: String,
    /// Full path inside the style source directory
    pub path: PathBuf,
}

impl EntryFile {
    /// Stem used for the compiled file, e.g. "style" -> "style.css"
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }

    /// Compiled style sheet path under `out_dir`
    pub fn css_path(&self, out_dir: &Path) -> PathBuf {
        out_dir.join(format!("{}.css", self.stem()))
    }

    /// Source map path under `out_dir`
    pub fn map_path(&self, out_dir: &Path) -> PathBuf {
        out_dir.join(format!("{}.css.map", self.stem()))
    }
}

/// Split a comma-delimited entry list into file names.
///
/// Items are trimmed, empty items dropped, and `.scss` appended when the
/// item has no style extension.
pub fn split_entry_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let has_ext = Path::new(s)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| STYLE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if has_ext {
                s.to_string()
            } else {
                format!("{s}.scss")
            }
        })
        .collect()
}
