use super::{Enumerator, FileStream};
use crate::error::{InventoryError, Result};
use crate::spec::ScanTarget;
use crate::types::FileHandle;
use chrono::Utc;
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// Wraps a caller-supplied list of paths.
///
/// Each path is stat'ed lazily as the stream is consumed. A path that no
/// longer exists is skipped, so it shows up as a removal on the next rescan.
#[derive(Debug, Clone, Default)]
pub struct ExplicitList {
    paths: Vec<PathBuf>,
}

impl ExplicitList {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// Parse a list delimited by `;`, `,` or whitespace.
    pub fn parse(list: &str) -> Self {
        Self::new(
            list.split(|c: char| c == ';' || c == ',' || c.is_whitespace())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        )
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Enumerator for ExplicitList {
    fn enumerate(&self, target: &ScanTarget) -> Result<FileStream> {
        let paths = self.paths.clone();
        let filter = target.filter.clone();
        let now_ms = Utc::now().timestamp_millis();

        let stream = paths.into_iter().filter_map(move |path| {
            let handle = match FileHandle::stat(&path) {
                Ok(handle) => handle,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "Listed file no longer exists");
                    return None;
                }
                Err(e) => {
                    return Some(Err(InventoryError::Io(io::Error::new(
                        e.kind(),
                        format!("{}: {}", path.display(), e),
                    ))))
                }
            };
            match &filter {
                Some(filter) if !filter.accept(&handle, now_ms) => None,
                _ => Some(Ok(handle)),
            }
        });

        Ok(Box::new(stream))
    }

    fn kind(&self) -> &'static str {
        "list"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FileFilter;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_delimiters() {
        let list = ExplicitList::parse("/a/x.nc; /a/y.nc,/a/z.nc\n/a/w.nc");
        assert_eq!(list.paths().len(), 4);
        assert_eq!(list.paths()[1], PathBuf::from("/a/y.nc"));
    }

    #[test]
    fn test_enumerate_existing_paths_only() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.nc");
        let b = temp.path().join("b.txt");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"bb").unwrap();
        let missing = temp.path().join("gone.nc");

        let list = ExplicitList::new(vec![a.clone(), b, missing]);
        let target = ScanTarget::new("list", false, None);
        let files: Vec<FileHandle> = list.enumerate(&target).unwrap().map(|f| f.unwrap()).collect();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name(), "a.nc");
        assert_eq!(files[0].size(), 1);

        let filtered = ScanTarget::new("list", false, Some(FileFilter::name_wildcard("*.nc").unwrap()));
        let files: Vec<FileHandle> = list.enumerate(&filtered).unwrap().map(|f| f.unwrap()).collect();
        assert_eq!(files.len(), 1);
    }
}
