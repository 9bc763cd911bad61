//! Configuration for collections

use crate::duration::TimeDuration;
use crate::error::{Diagnostics, InventoryError, Result};
use crate::inventory::Inventory;
use crate::partition::PartitionSpec;
use crate::proto::ProtoChoice;
use crate::spec::CollectionSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration: a set of collections plus watch defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastockConfig {
    /// Recheck interval for collections that do not set their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_recheck_after: Option<TimeDuration>,

    /// How often the watcher polls `is_scan_needed`, in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for DatastockConfig {
    fn default() -> Self {
        Self {
            default_recheck_after: None,
            poll_interval_secs: default_poll_interval(),
            collections: Vec::new(),
        }
    }
}

/// One collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,

    /// Collection spec, e.g. `/data/radar/**/KFTG_#yyyyMMdd_HHmm#.nc`
    pub spec: String,

    /// Date template searched for in the full path, overriding the spec's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format_mark: Option<String>,

    /// Files modified more recently than this are not indexed yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub older_than: Option<TimeDuration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recheck_after: Option<TimeDuration>,

    /// Cron expression handed to the host scheduler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescan: Option<String>,

    /// Whether change events go to listeners
    #[serde(default = "default_true")]
    pub trigger_ok: bool,

    #[serde(default)]
    pub proto: ProtoChoice,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionConfig>,

    /// Extra directories scanned into the same collection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scans: Vec<DirectoryScanConfig>,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>, spec: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: spec.into(),
            date_format_mark: None,
            older_than: None,
            recheck_after: None,
            rescan: None,
            trigger_ok: true,
            proto: ProtoChoice::default(),
            start_date: None,
            partition: None,
            scans: Vec::new(),
        }
    }

    /// Build the inventory this entry describes.
    ///
    /// `default_recheck` applies when the entry has no interval of its own.
    pub fn to_inventory(&self, default_recheck: Option<&TimeDuration>) -> Result<Inventory> {
        let mut diagnostics = Diagnostics::new();
        let spec = CollectionSpec::parse(&self.spec, &mut diagnostics)
            .with_older_than(self.older_than.clone());
        let mut builder = Inventory::builder(&self.name)
            .collection_spec(spec, diagnostics)
            .proto_choice(self.proto)
            .trigger_ok(self.trigger_ok);
        if let Some(mark) = &self.date_format_mark {
            builder = builder.date_format_mark(mark.clone());
        }
        if let Some(recheck) = self.recheck_after.as_ref().or(default_recheck) {
            builder = builder.recheck_after(recheck.clone());
        }
        if let Some(rescan) = &self.rescan {
            builder = builder.rescan_cron(rescan.clone());
        }
        if let Some(start) = self.start_date {
            builder = builder.start_date(start);
        }

        let inventory = builder.build();
        for scan in &self.scans {
            inventory.add_directory_scan(
                &scan.dir,
                scan.suffix.as_deref(),
                scan.regexp.as_deref(),
                scan.subdirs,
                scan.older_than.as_ref(),
                None,
            )?;
        }
        Ok(inventory)
    }

    pub fn partition_spec(&self) -> Result<Option<PartitionSpec>> {
        self.partition.as_ref().map(PartitionConfig::to_spec).transpose()
    }
}

/// An additional directory scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryScanConfig {
    pub dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<String>,
    #[serde(default = "default_true")]
    pub subdirs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub older_than: Option<TimeDuration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    Directory,
    Time,
    Marker,
}

/// How to partition a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub by: PartitionKind,
    /// Window length for time partitions; one day when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<TimeDuration>,
    /// Marker file name for marker partitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

impl PartitionConfig {
    pub fn to_spec(&self) -> Result<PartitionSpec> {
        match self.by {
            PartitionKind::Directory => Ok(PartitionSpec::Directory),
            PartitionKind::Time => Ok(match &self.period {
                Some(period) => PartitionSpec::TimePeriod(period.duration()),
                None => PartitionSpec::daily(),
            }),
            PartitionKind::Marker => self
                .marker
                .clone()
                .map(PartitionSpec::Marker)
                .ok_or_else(|| InventoryError::Config("marker partitions need a 'marker' file name".to_string())),
        }
    }
}

impl DatastockConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DatastockConfig =
            toml::from_str(&content).map_err(|e| InventoryError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| InventoryError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.name == name)
    }
}
