//! Flat cache keys for hierarchical paths.
//!
//! The cache tier stores every payload directly under one directory, so a
//! relative path such as `project-1/lib/util.py` is turned into the single
//! file name `project-1$lib$util.py`.
//!
//! `$` is a legal character inside a POSIX file name. A segment that already
//! contains it would make two different paths collide on one key, so such
//! paths are rejected instead of being flattened.

use std::fmt;
use thiserror::Error;

/// Character substituted for the path separator.
pub const MARKER: char = '$';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathKeyError {
    #[error("empty path has no cache key")]
    Empty,

    #[error("path `{0}` contains a `..` segment")]
    ParentSegment(String),

    #[error("segment `{segment}` of `{path}` contains the reserved marker `{MARKER}`")]
    ReservedMarker { path: String, segment: String },
}

/// A normalized, single-segment cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlatKey(String);

impl FlatKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Flatten a relative path into a cache key.
///
/// Leading slashes, empty segments and `.` segments are dropped so that
/// `/a//./b.txt` and `a/b.txt` share one key.
pub fn flatten(path: &str) -> Result<FlatKey, PathKeyError> {
    let mut out = String::with_capacity(path.len());
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(PathKeyError::ParentSegment(path.to_string())),
            s if s.contains(MARKER) => {
                return Err(PathKeyError::ReservedMarker {
                    path: path.to_string(),
                    segment: s.to_string(),
                });
            }
            s => {
                if !out.is_empty() {
                    out.push(MARKER);
                }
                out.push_str(s);
            }
        }
    }
    if out.is_empty() {
        return Err(PathKeyError::Empty);
    }
    Ok(FlatKey(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_flatten_replaces_separator() {
        assert_eq!(flatten("a/b.txt").unwrap().as_str(), "a$b.txt");
        assert_eq!(flatten("top.txt").unwrap().as_str(), "top.txt");
        assert_eq!(
            flatten("project-1/lib/util.py").unwrap().to_string(),
            "project-1$lib$util.py"
        );
    }

    #[test]
    fn test_flatten_normalizes_equivalent_spellings() {
        let want = flatten("a/b/c").unwrap();
        for p in ["/a/b/c", "a//b/c", "./a/b/./c", "a/b/c/"] {
            assert_eq!(flatten(p).unwrap(), want, "path {p}");
        }
    }

    #[test]
    fn test_flatten_rejects_bad_paths() {
        assert_eq!(flatten(""), Err(PathKeyError::Empty));
        assert_eq!(flatten("/./"), Err(PathKeyError::Empty));
        assert!(matches!(
            flatten("a/../b"),
            Err(PathKeyError::ParentSegment(_))
        ));
        assert!(matches!(
            flatten("a$b/c"),
            Err(PathKeyError::ReservedMarker { segment, .. }) if segment == "a$b"
        ));
    }

    #[test]
    fn test_flatten_is_injective_without_marker() {
        let paths = [
            "a/b", "a/b/c", "ab", "a/bc", "ab/c", "a/b.c", "a.b/c", "b/a", "a-b", "a/-b",
        ];
        let mut seen: HashMap<FlatKey, &str> = HashMap::new();
        for p in paths {
            let key = flatten(p).unwrap();
            if let Some(prev) = seen.insert(key.clone(), p) {
                panic!("{prev} and {p} collide on {key}");
            }
        }
    }
}
