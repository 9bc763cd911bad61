//! Datastock Inventory - Collection Inventory & Change Detection
//!
//! Turns a live, changing population of dataset files into a maintained
//! index, keeps it in sync with the filesystem (or a remote catalog) without
//! discarding already-known entries, pulls timestamps out of file names, and
//! splits large collections into time- or directory-bounded partitions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌───────────────┐
//! │    Spec     │     │ Enumerator  │     │  Inventory  │     │  Partitioner  │
//! │ (root, glob,│────▶│ (walk, list,│────▶│ (snapshot + │────▶│ (day / dir /  │
//! │  date mask) │     │   crawl)    │     │    diff)    │     │    marker)    │
//! └─────────────┘     └─────────────┘     └──────┬──────┘     └───────────────┘
//!                                                │ TriggerEvent
//!                                                ▼
//!                                           listeners
//! ```
//!
//! # Core Concepts
//!
//! - **FileHandle**: one inventory item, shared as `Arc` so unchanged files keep their identity
//! - **CollectionSpec**: path + filter + date template describing membership
//! - **Inventory**: rescannable index of one named collection
//! - **Partition**: disjoint sub-collection, itself an inventory

pub mod aux_table;
pub mod config;
pub mod date;
pub mod date_pattern;
pub mod duration;
pub mod enumerate;
pub mod error;
pub mod events;
pub mod filter;
pub mod inventory;
pub mod partition;
pub mod proto;
pub mod spec;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use config::{CollectionConfig, DatastockConfig, DirectoryScanConfig, PartitionConfig, PartitionKind};
pub use date::{extract, DateExtractor, DateTemplate};
pub use duration::{parse_duration, TimeDuration};
pub use enumerate::{
    CatalogCrawler, CatalogRef, CrawlRecord, CrawlVisitor, Enumerator, ExplicitList, FileStream,
    LocalWalk, LocalWalkConfig, RemoteCrawl,
};
pub use error::{Diagnostic, Diagnostics, InventoryError, PartitionError, Result, Severity};
pub use events::{ListenerError, ListenerId, TriggerEvent, TriggerKind, TriggerListener};
pub use filter::FileFilter;
pub use inventory::{ChangeChecker, FileIter, Inventory, InventoryBuilder, Snapshot};
pub use partition::{Partition, PartitionSpec, Partitioner};
pub use proto::ProtoChoice;
pub use spec::{CollectionSpec, ScanTarget};
pub use store::{MemorySideStore, SideStore};
pub use types::{ChangeReport, FileHandle};
