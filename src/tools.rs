//! External tool lookup and invocation.
//!
//! Prefixing, raster image optimization and script minification are
//! delegated to well-known command line tools when they are installed.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::TaskError;

/// Locate a tool on `PATH`
pub fn find(tool: &str) -> Option<PathBuf> {
    which::which(tool).ok()
}

/// Captured output of a successful tool run
#[derive(Debug)]
pub struct ToolOutput {
    pub stderr: String,
}

/// Run `program` with `args`, failing on a non-zero exit status
pub fn run<I, S>(program: &Path, args: I, cwd: Option<&Path>) -> Result<ToolOutput, TaskError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run_with_env(program, args, cwd, &[])
}

/// [`run`] with extra environment variables
pub fn run_with_env<I, S>(
    program: &Path,
    args: I,
    cwd: Option<&Path>,
    env: &[(&str, &str)],
) -> Result<ToolOutput, TaskError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let tool = program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.display().to_string());

    let mut cmd = Command::new(program);
    cmd.args(args).envs(env.iter().copied());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    tracing::trace!("running {:?}", cmd);

    let output = cmd.output().map_err(|e| TaskError::io(program, e))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        tracing::trace!("{tool}: {}", stdout.trim());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if output.status.success() {
        Ok(ToolOutput { stderr })
    } else {
        Err(TaskError::ToolFailed {
            tool,
            code: output.status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        })
    }
}
