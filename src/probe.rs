//! First-match path probing over ordered candidate lists.
//!
//! Every directory lookup in the resolver goes through [`probe`]: a list of
//! conventional locations is tried in order and the first one that exists
//! with the required kind wins. The file system is reached through the
//! [`Inspect`] trait so resolution can be tested without touching disk.

use std::fs;
use std::path::{Component, Path, PathBuf};

/// Required kind of a probed path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    Directory,
    File,
}

/// Answers "what is at this path", if anything
pub trait Inspect {
    /// `None` for missing paths, unreadable paths, and anything that is
    /// neither a regular file nor a directory.
    fn kind_of(&self, path: &Path) -> Option<PathKind>;
}

/// [`Inspect`] backed by the real file system
#[derive(Debug, Clone, Copy, Default)]
pub struct FsInspector;

impl Inspect for FsInspector {
    fn kind_of(&self, path: &Path) -> Option<PathKind> {
        let meta = fs::metadata(path).ok()?;
        if meta.is_dir() {
            Some(PathKind::Directory)
        } else if meta.is_file() {
            Some(PathKind::File)
        } else {
            None
        }
    }
}

impl<T: Inspect + ?Sized> Inspect for &T {
    fn kind_of(&self, path: &Path) -> Option<PathKind> {
        (**self).kind_of(path)
    }
}

/// A path that may satisfy a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub kind: PathKind,
}

impl Candidate {
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: normalize(&path.into()),
            kind: PathKind::Directory,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: normalize(&path.into()),
            kind: PathKind::File,
        }
    }
}

/// Return the first candidate, in list order, that exists with its kind
pub fn probe<I: Inspect>(inspector: &I, candidates: &[Candidate]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|c| inspector.kind_of(&c.path) == Some(c.kind))
        .map(|c| c.path.clone())
}

/// Check a single path against a required kind
#[inline]
pub fn validate<I: Inspect>(inspector: &I, path: &Path, kind: PathKind) -> bool {
    let candidate = Candidate {
        path: normalize(path),
        kind,
    };
    probe(inspector, std::slice::from_ref(&candidate)).is_some()
}

/// Lexically resolve `.` and `..` components.
///
/// `..` at the root stays at the root; leading `..` on a relative path is
/// kept since there is nothing to pop.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}


#[cfg(test)]
mod tests {
    use super::fake::FakeFs;
    use super::*;
    use tempfile::TempDir;

    // ==================== normalize tests ====================

    #[test]
    fn test_normalize_parent_dir() {
        assert_eq!(normalize(Path::new("/a/scss/../css")), PathBuf::from("/a/css"));
    }

    #[test]
    fn test_normalize_cur_dir() {
        assert_eq!(normalize(Path::new("/a/./b/.")), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_normalize_parent_at_root_stays_at_root() {
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
    }

    #[test]
    fn test_normalize_relative_leading_parent_kept() {
        assert_eq!(normalize(Path::new("../a/../b")), PathBuf::from("../b"));
        assert_eq!(normalize(Path::new("a/..")), PathBuf::from("."));
    }

    // ==================== probe tests ====================

    #[test]
    fn test_probe_first_match_wins() {
        let fs = FakeFs::new().dir("/one").dir("/two");
        let found = probe(&fs, &[Candidate::dir("/one"), Candidate::dir("/two")]);
        assert_eq!(found, Some(PathBuf::from("/one")));
    }

    #[test]
    fn test_probe_order_sensitive() {
        // Later valid candidate must never win over an earlier valid one
        let fs = FakeFs::new().dir("/one").dir("/two");
        let found = probe(&fs, &[Candidate::dir("/two"), Candidate::dir("/one")]);
        assert_eq!(found, Some(PathBuf::from("/two")));
    }

    #[test]
    fn test_probe_skips_missing() {
        let fs = FakeFs::new().dir("/two");
        let found = probe(&fs, &[Candidate::dir("/one"), Candidate::dir("/two")]);
        assert_eq!(found, Some(PathBuf::from("/two")));
    }

    #[test]
    fn test_probe_skips_wrong_kind() {
        let fs = FakeFs::new().file("/one").dir("/two");
        let found = probe(&fs, &[Candidate::dir("/one"), Candidate::dir("/two")]);
        assert_eq!(found, Some(PathBuf::from("/two")));
    }

    #[test]
    fn test_probe_none_when_nothing_matches() {
        let fs = FakeFs::new().file("/one");
        assert_eq!(probe(&fs, &[Candidate::dir("/one"), Candidate::dir("/x")]), None);
        assert_eq!(probe(&fs, &[]), None);
    }

    #[test]
    fn test_probe_normalizes_candidates() {
        let fs = FakeFs::new().dir("/a/css");
        let found = probe(&fs, &[Candidate::dir("/a/scss/../css")]);
        assert_eq!(found, Some(PathBuf::from("/a/css")));
    }

    // ==================== validate tests ====================

    #[test]
    fn test_validate_kind() {
        let fs = FakeFs::new().file("/a/style.scss");
        assert!(validate(&fs, Path::new("/a/style.scss"), PathKind::File));
        assert!(!validate(&fs, Path::new("/a/style.scss"), PathKind::Directory));
        assert!(validate(&fs, Path::new("/a"), PathKind::Directory));
        assert!(!validate(&fs, Path::new("/b"), PathKind::Directory));
    }

    // ==================== FsInspector tests ====================

    #[test]
    fn test_fs_inspector_real_paths() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("style.scss");
        std::fs::write(&file, "a{}").unwrap();

        assert_eq!(FsInspector.kind_of(temp.path()), Some(PathKind::Directory));
        assert_eq!(FsInspector.kind_of(&file), Some(PathKind::File));
        assert_eq!(FsInspector.kind_of(&temp.path().join("missing")), None);
    }
}
