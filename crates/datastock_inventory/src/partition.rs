//! Splitting a large inventory into disjoint sub-collections.
//!
//! Time windows are half-open: a partition covers `[start, end)`, so a file
//! stamped exactly at midnight belongs to the day that starts there.

use crate::error::{PartitionError, Result};
use crate::inventory::Inventory;
use crate::spec::ScanTarget;
use crate::types::{normalize_path, FileHandle};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use walkdir::WalkDir;

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// How to split an inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionSpec {
    /// One partition per immediate subdirectory of each scan root.
    Directory,
    /// Date-ordered files bucketed into fixed windows aligned to the epoch.
    TimePeriod(Duration),
    /// Subdirectories containing this marker file; others are skipped.
    Marker(String),
}

impl PartitionSpec {
    pub fn daily() -> Self {
        PartitionSpec::TimePeriod(Duration::from_secs(24 * 60 * 60))
    }

    pub fn describe(&self) -> String {
        match self {
            PartitionSpec::Directory => "directory".to_string(),
            PartitionSpec::TimePeriod(period) => format!("period={}s", period.as_secs()),
            PartitionSpec::Marker(marker) => format!("marker={}", marker),
        }
    }
}

impl Default for PartitionSpec {
    fn default() -> Self {
        Self::daily()
    }
}

/// A read-only sub-collection.
#[derive(Debug, Clone)]
pub struct Partition {
    pub name: String,
    /// Inclusive start; `None` when the parent has no date extractor.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive end.
    pub end: Option<DateTime<Utc>>,
    pub inventory: Arc<Inventory>,
}

impl Partition {
    /// Whether `date` falls inside `[start, end)`.
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= date && date < end,
            _ => false,
        }
    }
}

pub struct Partitioner;

impl Partitioner {
    /// Build the partitions of `inventory`.
    ///
    /// Time partitioning works on the current snapshot, so scan first.
    /// Directory and marker partitioning enumerate the subdirectories afresh.
    pub fn make_partitions(inventory: &Inventory, spec: &PartitionSpec) -> Result<Vec<Partition>> {
        let partitions = match spec {
            PartitionSpec::TimePeriod(period) => by_time_period(inventory, *period)?,
            PartitionSpec::Directory => by_directory(inventory, None)?,
            PartitionSpec::Marker(marker) => by_directory(inventory, Some(marker))?,
        };
        info!(
            collection = %inventory.name(),
            mode = %spec.describe(),
            partitions = partitions.len(),
            "Partitions built"
        );
        Ok(partitions)
    }
}

fn millis_to_date(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn child_inventory(
    parent: &Inventory,
    name: String,
    target: Option<ScanTarget>,
) -> Inventory {
    let mut builder = Inventory::builder(name)
        .enumerator(parent.enumerator())
        .date_extractor(parent.date_extractor().clone())
        .proto_choice(parent.proto_choice())
        .static_collection(true);
    if let Some(target) = target {
        builder = builder.scan_target(target);
    }
    builder.build()
}

fn by_time_period(inventory: &Inventory, period: Duration) -> Result<Vec<Partition>> {
    let period_ms = i64::try_from(period.as_millis()).unwrap_or(0);
    if period_ms <= 0 {
        return Err(PartitionError::InvalidPeriod(format!("{:?}", period)).into());
    }
    if !inventory.has_date_extractor() {
        return Err(PartitionError::NoDateExtractor(inventory.name().to_string()).into());
    }

    let name_format = if period_ms % DAY_MILLIS == 0 {
        "%Y%m%d"
    } else {
        "%Y%m%d_%H%M"
    };

    // (start, end, members)
    let mut buckets: Vec<(DateTime<Utc>, DateTime<Utc>, Vec<Arc<FileHandle>>)> = Vec::new();
    for file in inventory.files_sorted() {
        let date = inventory
            .extract_date(&file)
            .ok_or_else(|| PartitionError::NoDate {
                collection: inventory.name().to_string(),
                path: file.path().to_string(),
            })?;

        let needs_new = buckets.last().map_or(true, |(_, end, _)| *end <= date);
        if needs_new {
            let ms = date.timestamp_millis();
            let start = millis_to_date(ms - ms.rem_euclid(period_ms));
            let end = start.and_then(|s| s.checked_add_signed(ChronoDuration::milliseconds(period_ms)));
            let (Some(start), Some(end)) = (start, end) else {
                return Err(PartitionError::InvalidPeriod(format!(
                    "window for {} is out of range",
                    date
                ))
                .into());
            };
            buckets.push((start, end, Vec::new()));
        }
        if let Some((_, _, members)) = buckets.last_mut() {
            members.push(file);
        }
    }

    Ok(buckets
        .into_iter()
        .map(|(start, end, members)| {
            let name = format!("{}-{}", inventory.name(), start.format(name_format));
            debug!(partition = %name, files = members.len(), "Time partition");
            let child = child_inventory(inventory, name.clone(), None);
            child.set_shared_files(members);
            Partition {
                name,
                start: Some(start),
                end: Some(end),
                inventory: Arc::new(child),
            }
        })
        .collect())
}

fn by_directory(inventory: &Inventory, marker: Option<&str>) -> Result<Vec<Partition>> {
    let enumerator = inventory.enumerator();
    let mut partitions = Vec::new();

    for target in inventory.scan_targets() {
        let root = Path::new(&target.root_dir);
        if !root.is_dir() {
            debug!(root = %target.root_dir, "Partition root is not a local directory");
            continue;
        }

        let mut subdirs = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_dir() {
                subdirs.push(entry.into_path());
            }
        }

        for dir in subdirs {
            let dir_name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if let Some(marker) = marker {
                if !dir.join(marker).is_file() {
                    debug!(dir = %dir.display(), marker, "Skipping directory without partition marker");
                    continue;
                }
            }

            let mut child_target = target.clone();
            child_target.root_dir = normalize_path(&dir);
            child_target.name = format!("{}-{}", inventory.name(), dir_name);

            let mut members = Vec::new();
            for item in enumerator.enumerate(&child_target)? {
                members.push(item?);
            }
            if members.is_empty() {
                debug!(dir = %dir.display(), "Skipping empty directory");
                continue;
            }
            members.sort();

            let (start, end) = if inventory.has_date_extractor() {
                let dates: Vec<DateTime<Utc>> = members
                    .iter()
                    .filter_map(|f| inventory.extract_date(f))
                    .collect();
                let Some(first) = dates.first().copied() else {
                    return Err(PartitionError::NoDate {
                        collection: inventory.name().to_string(),
                        path: normalize_path(&dir),
                    }
                    .into());
                };
                let latest = dates.iter().max().copied().unwrap_or(first);
                (Some(first), latest.checked_add_signed(ChronoDuration::milliseconds(1)))
            } else {
                (None, None)
            };

            let name = child_target.name.clone();
            debug!(partition = %name, files = members.len(), "Directory partition");
            let child = child_inventory(inventory, name.clone(), Some(child_target));
            child.set_files(members);
            partitions.push(Partition {
                name,
                start,
                end,
                inventory: Arc::new(child),
            });
        }
    }
    Ok(partitions)
}
