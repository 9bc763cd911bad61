use super::{Enumerator, FileStream};
use crate::error::{InventoryError, Result};
use crate::spec::ScanTarget;
use crate::types::FileHandle;
use chrono::Utc;
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into.
pub const DEFAULT_EXCLUDE_DIR_NAMES: &[&str] = &[".git", ".svn", "__pycache__"];

/// Configuration for local filesystem walks
#[derive(Debug, Clone)]
pub struct LocalWalkConfig {
    /// Yield directories as inventory items
    pub include_directories: bool,
    /// Whether to include hidden files/directories
    pub include_hidden: bool,
    /// Whether to follow symlinks
    pub follow_symlinks: bool,
    /// Directory names to skip (matched against the name, not the path)
    pub exclude_dir_names: Vec<String>,
}

impl Default for LocalWalkConfig {
    fn default() -> Self {
        Self {
            include_directories: false,
            include_hidden: true,
            follow_symlinks: false,
            exclude_dir_names: DEFAULT_EXCLUDE_DIR_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Walks a local directory tree.
#[derive(Debug, Clone, Default)]
pub struct LocalWalk {
    config: LocalWalkConfig,
}

impl LocalWalk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LocalWalkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LocalWalkConfig {
        &self.config
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// The entry was removed between the directory read and the stat.
fn vanished(e: &walkdir::Error) -> bool {
    e.io_error().map_or(false, |io| io.kind() == io::ErrorKind::NotFound)
}

impl Enumerator for LocalWalk {
    fn enumerate(&self, target: &ScanTarget) -> Result<FileStream> {
        let root = PathBuf::from(&target.root_dir);
        if !root.exists() {
            // configuration fault: behave as empty until the directory appears
            warn!(collection = %target.name, root = %target.root_dir, "Collection root does not exist");
            return Ok(Box::new(std::iter::empty()));
        }
        if !root.is_dir() {
            return Err(InventoryError::Config(format!(
                "Collection root is not a directory: {}",
                target.root_dir
            )));
        }

        let mut walker = WalkDir::new(&root)
            .min_depth(1)
            .follow_links(self.config.follow_symlinks);
        if !target.recurse {
            walker = walker.max_depth(1);
        }

        let include_hidden = self.config.include_hidden;
        let exclude_dir_names = self.config.exclude_dir_names.clone();
        let include_directories = self.config.include_directories;
        let follow_symlinks = self.config.follow_symlinks;
        let filter = target.filter.clone();
        let now_ms = Utc::now().timestamp_millis();

        let entries = walker.into_iter().filter_entry(move |entry| {
            // the root itself is always walked, whatever its name
            if entry.depth() == 0 {
                return true;
            }
            if !include_hidden && is_hidden(entry) {
                return false;
            }
            if entry.file_type().is_dir() {
                let name = entry.file_name().to_string_lossy();
                if exclude_dir_names.iter().any(|excluded| *excluded == name) {
                    debug!(path = %entry.path().display(), "Skipping excluded directory");
                    return false;
                }
            }
            true
        });

        let stream = entries.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if vanished(&e) => {
                    debug!(path = ?e.path(), "Entry disappeared during walk");
                    return None;
                }
                Err(e) => return Some(Err(InventoryError::Walk(e))),
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() && !follow_symlinks {
                return None;
            }
            if file_type.is_dir() && !include_directories {
                return None;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) if vanished(&e) => {
                    debug!(path = %entry.path().display(), "File disappeared before stat");
                    return None;
                }
                Err(e) => return Some(Err(InventoryError::Walk(e))),
            };
            let handle = FileHandle::from_metadata(entry.path(), &metadata);

            match &filter {
                Some(filter) if !filter.accept(&handle, now_ms) => None,
                _ => Some(Ok(handle)),
            }
        });

        Ok(Box::new(stream))
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}
