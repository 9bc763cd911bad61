//! Core types for the inventory engine
//!
//! A [`FileHandle`] describes one inventory item. Handles are shared as
//! `Arc<FileHandle>`; the `Arc` identity is what a rescan carries forward
//! for files that did not change, so anything keyed off that identity
//! survives until the file really changes.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::fs::Metadata;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::UNIX_EPOCH;

/// Opaque per-file data attached by collaborators.
pub type AuxInfo = Arc<dyn Any + Send + Sync>;

/// Normalize a path to use forward slashes consistently.
///
/// Paths are the inventory key, so the same physical file must produce the
/// same string on every rescan and on every platform.
pub fn normalize_path(path: &Path) -> String {
    let joined = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    // components() drops the separator after a root component
    if joined.starts_with("//") {
        joined[1..].to_string()
    } else {
        joined
    }
}

/// Last path segment of a normalized path.
fn name_of(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Modification time of a file in Unix milliseconds, 0 if unknown.
pub fn mtime_millis(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Descriptor of one inventory item.
pub struct FileHandle {
    path: String,
    name: String,
    size: u64,
    last_modified_ms: i64,
    is_directory: bool,
    aux_info: RwLock<Option<AuxInfo>>,
}

impl FileHandle {
    /// Create a handle from an already normalized path.
    pub fn new(path: impl Into<String>, size: u64, last_modified_ms: i64, is_directory: bool) -> Self {
        let path = path.into();
        let name = name_of(&path).to_string();
        Self {
            path,
            name,
            size,
            last_modified_ms,
            is_directory,
            aux_info: RwLock::new(None),
        }
    }

    /// Create a handle from a filesystem path and its stat result.
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        Self::new(
            normalize_path(path),
            metadata.len(),
            mtime_millis(metadata),
            metadata.is_dir(),
        )
    }

    /// Stat a path and build its handle.
    pub fn stat(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self::from_metadata(path, &metadata))
    }

    pub fn with_aux_info(self, aux_info: Option<AuxInfo>) -> Self {
        self.set_aux_info(aux_info);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn last_modified_ms(&self) -> i64 {
        self.last_modified_ms
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.last_modified_ms).single()
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// Attached auxiliary data, if any.
    pub fn aux_info(&self) -> Option<AuxInfo> {
        match self.aux_info.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Attached auxiliary data downcast to a concrete type.
    pub fn aux_info_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.aux_info().and_then(|aux| aux.downcast::<T>().ok())
    }

    /// Attach (or clear) auxiliary data. This is the only mutation a handle allows.
    pub fn set_aux_info(&self, aux_info: Option<AuxInfo>) {
        match self.aux_info.write() {
            Ok(mut guard) => *guard = aux_info,
            Err(poisoned) => *poisoned.into_inner() = aux_info,
        }
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("last_modified_ms", &self.last_modified_ms)
            .field("is_directory", &self.is_directory)
            .field("has_aux_info", &self.aux_info().is_some())
            .finish()
    }
}

impl PartialEq for FileHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileHandle {}

impl PartialOrd for FileHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

impl Hash for FileHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

/// Outcome of one scan: how the file set moved relative to the previous snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub added: u64,
    pub modified: u64,
    pub removed: u64,
}

impl ChangeReport {
    pub fn is_changed(&self) -> bool {
        self.added > 0 || self.modified > 0 || self.removed > 0
    }
}

impl fmt::Display for ChangeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added={}, modified={}, removed={}",
            self.added, self.modified, self.removed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    #[test]
    fn test_name_is_last_segment() {
        let handle = FileHandle::new("/data/radar/KFTG_20230615.nc", 10, 0, false);
        assert_eq!(handle.name(), "KFTG_20230615.nc");

        let dir = FileHandle::new("/data/radar/", 0, 0, true);
        assert_eq!(dir.name(), "radar");

        let bare = FileHandle::new("file.nc", 0, 0, false);
        assert_eq!(bare.name(), "file.nc");
    }

    #[test]
    fn test_handles_compare_by_path() {
        let a = FileHandle::new("/data/a.nc", 1, 100, false);
        let a_again = FileHandle::new("/data/a.nc", 999, 200, false);
        let b = FileHandle::new("/data/b.nc", 1, 100, false);

        assert_eq!(a, a_again);
        assert!(a < b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(a_again));
        assert!(set.insert(b));
    }

    #[test]
    fn test_aux_info_attach_and_downcast() {
        let handle = FileHandle::new("/data/a.nc", 1, 100, false);
        assert!(handle.aux_info().is_none());

        handle.set_aux_info(Some(Arc::new(42u32)));
        assert_eq!(handle.aux_info_as::<u32>().as_deref(), Some(&42));
        assert!(handle.aux_info_as::<String>().is_none());

        handle.set_aux_info(None);
        assert!(handle.aux_info().is_none());
    }

    #[test]
    fn test_normalize_path() {
        let path: PathBuf = ["data", "radar", "file.nc"].iter().collect();
        assert_eq!(normalize_path(&path), "data/radar/file.nc");
        assert_eq!(normalize_path(Path::new("/data/x.nc")), "/data/x.nc");
    }

    #[test]
    fn test_change_report() {
        assert!(!ChangeReport::default().is_changed());
        let report = ChangeReport {
            added: 1,
            modified: 0,
            removed: 0,
        };
        assert!(report.is_changed());
        assert_eq!(report.to_string(), "added=1, modified=0, removed=0");
    }
}
