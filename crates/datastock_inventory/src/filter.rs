//! Per-candidate file filters applied during enumeration.

use crate::error::{InventoryError, Result};
use crate::types::FileHandle;
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use std::time::Duration;

/// A filter deciding whether an enumerated file belongs to a collection.
#[derive(Debug, Clone)]
pub enum FileFilter {
    /// Regular expression that must match the whole file name.
    NameRegex(Regex),
    /// Glob (`*`, `?`, `[..]`) matched against the file name.
    NameWildcard { pattern: String, matcher: GlobMatcher },
    /// Glob matched against the full path; `*` crosses directory separators.
    PathWildcard { pattern: String, matcher: GlobMatcher },
    /// Accept only files last modified at least this long ago.
    LastModifiedLimit(Duration),
    /// All filters must accept.
    Composite(Vec<FileFilter>),
    /// Rejects everything. Stands in for a filter that failed to compile.
    MatchNothing,
}

/// Build a case-sensitive glob matcher.
pub fn build_matcher(glob_pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(glob_pattern)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| InventoryError::Pattern(format!("{}: {}", glob_pattern, e)))
}

impl FileFilter {
    /// Compile a name regex anchored at both ends.
    pub fn name_regex(pattern: &str) -> Result<Self> {
        let anchored = format!("^(?:{})$", pattern);
        Regex::new(&anchored)
            .map(FileFilter::NameRegex)
            .map_err(|e| InventoryError::Pattern(format!("{}: {}", pattern, e)))
    }

    pub fn name_wildcard(pattern: &str) -> Result<Self> {
        Ok(FileFilter::NameWildcard {
            pattern: pattern.to_string(),
            matcher: build_matcher(pattern)?,
        })
    }

    pub fn path_wildcard(pattern: &str) -> Result<Self> {
        Ok(FileFilter::PathWildcard {
            pattern: pattern.to_string(),
            matcher: build_matcher(pattern)?,
        })
    }

    /// Combine filters, collapsing the trivial cases.
    pub fn all(mut filters: Vec<FileFilter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(FileFilter::Composite(filters)),
        }
    }

    /// Whether `file` passes this filter at wall-clock time `now_ms`.
    pub fn accept(&self, file: &FileHandle, now_ms: i64) -> bool {
        match self {
            FileFilter::NameRegex(regex) => regex.is_match(file.name()),
            FileFilter::NameWildcard { matcher, .. } => matcher.is_match(file.name()),
            FileFilter::PathWildcard { matcher, .. } => matcher.is_match(file.path()),
            FileFilter::LastModifiedLimit(limit) => {
                let limit_ms = i64::try_from(limit.as_millis()).unwrap_or(i64::MAX);
                now_ms.saturating_sub(file.last_modified_ms()) >= limit_ms
            }
            FileFilter::Composite(filters) => filters.iter().all(|f| f.accept(file, now_ms)),
            FileFilter::MatchNothing => false,
        }
    }

    /// Human-readable description for logs and the CLI.
    pub fn describe(&self) -> String {
        match self {
            FileFilter::NameRegex(regex) => format!("name~{}", regex.as_str()),
            FileFilter::NameWildcard { pattern, .. } => format!("name={}", pattern),
            FileFilter::PathWildcard { pattern, .. } => format!("path={}", pattern),
            FileFilter::LastModifiedLimit(limit) => format!("olderThan={}s", limit.as_secs()),
            FileFilter::Composite(filters) => filters
                .iter()
                .map(|f| f.describe())
                .collect::<Vec<_>>()
                .join(" & "),
            FileFilter::MatchNothing => "nothing".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, mtime: i64) -> FileHandle {
        FileHandle::new(path, 1, mtime, false)
    }

    #[test]
    fn test_name_regex_is_anchored() {
        let filter = FileFilter::name_regex(r".*\.nc").unwrap();
        assert!(filter.accept(&file("/data/a.nc", 0), 0));
        assert!(!filter.accept(&file("/data/a.nc4", 0), 0));
        assert!(!filter.accept(&file("/data.nc/a.txt", 0), 0));
    }

    #[test]
    fn test_wildcards() {
        let by_name = FileFilter::name_wildcard("*.grib2").unwrap();
        assert!(by_name.accept(&file("/data/gfs.grib2", 0), 0));
        assert!(!by_name.accept(&file("/data/gfs.GRIB2", 0), 0));

        let by_path = FileFilter::path_wildcard("*/radar/*.nc").unwrap();
        assert!(by_path.accept(&file("/data/radar/x.nc", 0), 0));
        assert!(!by_path.accept(&file("/data/model/x.nc", 0), 0));
    }

    #[test]
    fn test_last_modified_limit() {
        let filter = FileFilter::LastModifiedLimit(Duration::from_secs(60));
        let now = 1_000_000;
        assert!(filter.accept(&file("/a", now - 60_000), now));
        assert!(!filter.accept(&file("/a", now - 59_999), now));
    }

    #[test]
    fn test_composite_and_nothing() {
        let filter = FileFilter::all(vec![
            FileFilter::name_wildcard("*.nc").unwrap(),
            FileFilter::LastModifiedLimit(Duration::from_secs(1)),
        ])
        .unwrap();
        assert!(filter.accept(&file("/a.nc", 0), 10_000));
        assert!(!filter.accept(&file("/a.nc", 10_000), 10_000));
        assert!(!FileFilter::MatchNothing.accept(&file("/a.nc", 0), 0));
        assert!(FileFilter::all(Vec::new()).is_none());
    }

    #[test]
    fn test_invalid_patterns_are_errors() {
        assert!(FileFilter::name_regex("(unclosed").is_err());
        assert!(FileFilter::name_wildcard("[unclosed").is_err());
    }
}
