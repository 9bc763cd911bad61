//! Enumeration strategies.
//!
//! An [`Enumerator`] turns a [`ScanTarget`] into a lazy, order-unstable
//! stream of [`FileHandle`]s. Streams can be dropped mid-iteration without
//! leaking descriptors. An `Err` item is a terminal fault: the inventory
//! abandons the scan and keeps its previous snapshot.
//!
//! - [`LocalWalk`]: filesystem walk (the default)
//! - [`ExplicitList`]: a caller-supplied list of paths
//! - [`RemoteCrawl`]: a remote catalog crawl driven through [`CatalogCrawler`]

mod crawl;
mod list;
mod local;

pub use crawl::{CatalogCrawler, CatalogRef, CrawlRecord, CrawlVisitor, RemoteCrawl};
pub use list::ExplicitList;
pub use local::{LocalWalk, LocalWalkConfig, DEFAULT_EXCLUDE_DIR_NAMES};

use crate::error::Result;
use crate::spec::ScanTarget;
use crate::types::FileHandle;

/// Lazy sequence of enumerated files.
pub type FileStream = Box<dyn Iterator<Item = Result<FileHandle>> + Send>;

/// Pluggable enumeration strategy, injected per inventory.
pub trait Enumerator: Send + Sync {
    fn enumerate(&self, target: &ScanTarget) -> Result<FileStream>;

    /// Short strategy name for logs.
    fn kind(&self) -> &'static str;
}
