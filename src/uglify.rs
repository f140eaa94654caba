//! Merge and minify theme scripts into a single bundle.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ScriptBundle;
use crate::error::TaskError;
use crate::tools;

/// `*.js` files directly under the bundle's source dir, sorted by name.
/// The bundle's own output file is never an input.
pub fn collect_scripts(bundle: &ScriptBundle) -> Result<Vec<PathBuf>, TaskError> {
    let output = bundle.output_path();
    let entries =
        fs::read_dir(&bundle.source_dir).map_err(|e| TaskError::io(&bundle.source_dir, e))?;

    let mut scripts: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().is_some_and(|ext| ext == "js"))
        .filter(|p| *p != output)
        .collect();
    scripts.sort();
    Ok(scripts)
}

/// Plain concatenation, used when `uglifyjs` is not installed
fn concatenate(scripts: &[PathBuf], out: &Path) -> Result<(), TaskError> {
    let mut merged = String::new();
    for script in scripts {
        let body = fs::read_to_string(script).map_err(|e| TaskError::io(script, e))?;
        merged.push_str(&body);
        if !body.ends_with('\n') {
            merged.push('\n');
        }
        // Guard against sources without a trailing semicolon
        merged.push_str(";\n");
    }
    fs::write(out, merged).map_err(|e| TaskError::io(out, e))
}

fn uglify(tool: &Path, scripts: &[PathBuf], out: &Path) -> Result<(), TaskError> {
    let mut args: Vec<OsString> = scripts.iter().map(|s| s.clone().into_os_string()).collect();
    args.extend(["-c", "-m", "-o"].map(OsString::from));
    args.push(out.as_os_str().to_owned());

    let output = tools::run(tool, &args, None)?;
    if !output.stderr.trim().is_empty() {
        tracing::warn!("uglifyjs: {}", output.stderr.trim());
    }
    Ok(())
}

/// Merge the bundle's scripts into its output file.
/// Returns the written path.
pub fn minify_scripts(bundle: &ScriptBundle) -> Result<PathBuf, TaskError> {
    minify_scripts_with(bundle, tools::find("uglifyjs").as_deref())
}

pub fn minify_scripts_with(
    bundle: &ScriptBundle,
    uglifyjs: Option<&Path>,
) -> Result<PathBuf, TaskError> {
    let scripts = collect_scripts(bundle)?;
    let out = bundle.output_path();

    tracing::info!(
        "merging {} script(s) from {} into {}",
        scripts.len(),
        bundle.source_dir.display(),
        out.display()
    );
    if scripts.is_empty() {
        tracing::warn!("no scripts found in {}", bundle.source_dir.display());
    }

    fs::create_dir_all(&bundle.dest_dir).map_err(|e| TaskError::io(&bundle.dest_dir, e))?;

    match uglifyjs {
        Some(tool) if !scripts.is_empty() => uglify(tool, &scripts, &out)?,
        Some(_) => concatenate(&scripts, &out)?,
        None => {
            tracing::warn!("uglifyjs not found, writing unminified bundle");
            concatenate(&scripts, &out)?;
        }
    }

    Ok(out)
}
