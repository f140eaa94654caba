use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;

/// Glob for stale source maps directly under the output directory
fn map_pattern(output_dir: &Path) -> String {
    let escaped = glob::Pattern::escape(&output_dir.to_string_lossy());
    format!("{}/*.map", escaped.trim_end_matches('/'))
}

/// Stale source maps under `output_dir` (not recursive)
pub fn stale_maps(output_dir: &Path) -> Vec<PathBuf> {
    let Ok(paths) = glob(&map_pattern(output_dir)) else {
        return Vec::new();
    };
    paths
        .filter_map(|p| p.ok())
        .filter(|p| p.is_file())
        .collect()
}

/// Delete stale `*.map` files, returns how many were removed.
/// Deletion failures are ignored.
pub fn remove_stale_maps(output_dir: &Path) -> usize {
    tracing::info!("removing maps {}", map_pattern(output_dir));

    let mut removed = 0;
    for path in stale_maps(output_dir) {
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("removed {}", path.display());
                removed += 1;
            }
            Err(e) => tracing::trace!("could not remove {}: {e}", path.display()),
        }
    }
    removed
}
