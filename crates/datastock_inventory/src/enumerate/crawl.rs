use super::{Enumerator, FileStream};
use crate::error::{InventoryError, Result};
use crate::filter::FileFilter;
use crate::spec::ScanTarget;
use crate::types::FileHandle;
use chrono::{DateTime, Utc};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// One dataset reported by a catalog crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRecord {
    /// Dataset URL or access path; becomes the inventory key.
    pub url: String,
    pub size: Option<u64>,
    /// Declared "modified" date, if the catalog carries one.
    pub modified: Option<DateTime<Utc>>,
}

/// A nested catalog the crawler may descend into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRef {
    pub url: String,
    pub title: Option<String>,
    /// Nesting depth below the root catalog (root children are depth 1).
    pub depth: usize,
}

/// Callback protocol driven by a [`CatalogCrawler`].
pub trait CrawlVisitor {
    fn on_dataset(&mut self, record: CrawlRecord);

    /// Whether the crawler should follow this reference.
    fn on_catalog_ref(&mut self, reference: &CatalogRef) -> bool;
}

/// Remote catalog crawl collaborator.
pub trait CatalogCrawler: Send + Sync {
    fn crawl(&self, catalog_url: &str, visitor: &mut dyn CrawlVisitor) -> Result<()>;
}

/// Drives a [`CatalogCrawler`] on a worker thread and streams its records.
#[derive(Clone)]
pub struct RemoteCrawl {
    crawler: Arc<dyn CatalogCrawler>,
    max_depth: Option<usize>,
    channel_capacity: usize,
}

impl RemoteCrawl {
    pub fn new(crawler: Arc<dyn CatalogCrawler>) -> Self {
        Self {
            crawler,
            max_depth: None,
            channel_capacity: 1_000,
        }
    }

    /// Do not follow references nested deeper than `max_depth`.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

struct ChannelVisitor {
    tx: mpsc::SyncSender<Result<FileHandle>>,
    filter: Option<FileFilter>,
    recurse: bool,
    max_depth: Option<usize>,
    now_ms: i64,
    closed: bool,
}

impl CrawlVisitor for ChannelVisitor {
    fn on_dataset(&mut self, record: CrawlRecord) {
        if self.closed {
            return;
        }
        let last_modified_ms = record.modified.map(|d| d.timestamp_millis()).unwrap_or(0);
        let handle = FileHandle::new(record.url, record.size.unwrap_or(0), last_modified_ms, false);
        if let Some(filter) = &self.filter {
            if !filter.accept(&handle, self.now_ms) {
                return;
            }
        }
        // send blocks while the consumer is behind; an error means it hung up
        if self.tx.send(Ok(handle)).is_err() {
            debug!("Crawl consumer closed the stream");
            self.closed = true;
        }
    }

    fn on_catalog_ref(&mut self, reference: &CatalogRef) -> bool {
        if self.closed || !self.recurse {
            return false;
        }
        self.max_depth.map_or(true, |max| reference.depth <= max)
    }
}

/// Receiving end of a crawl. Once the channel drains, the worker is joined
/// so a panicked crawl ends the stream with an error instead of a short list.
struct CrawlStream {
    rx: mpsc::Receiver<Result<FileHandle>>,
    handle: Option<JoinHandle<()>>,
    url: String,
}

impl Iterator for CrawlStream {
    type Item = Result<FileHandle>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Ok(item) = self.rx.recv() {
            return Some(item);
        }
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(()) => None,
            Err(_) => {
                warn!(catalog = %self.url, "Catalog crawl panicked");
                Some(Err(InventoryError::Crawl(format!(
                    "{}: crawl task panicked",
                    self.url
                ))))
            }
        }
    }
}

impl Enumerator for RemoteCrawl {
    fn enumerate(&self, target: &ScanTarget) -> Result<FileStream> {
        let (tx, rx) = mpsc::sync_channel::<Result<FileHandle>>(self.channel_capacity);
        let crawler = Arc::clone(&self.crawler);
        let url = target.root_dir.clone();
        let mut visitor = ChannelVisitor {
            tx,
            filter: target.filter.clone(),
            recurse: target.recurse,
            max_depth: self.max_depth,
            now_ms: Utc::now().timestamp_millis(),
            closed: false,
        };

        let thread_url = url.clone();
        let handle = std::thread::Builder::new()
            .name("catalog-crawl".to_string())
            .spawn(move || {
                if let Err(e) = crawler.crawl(&thread_url, &mut visitor) {
                    warn!(catalog = %thread_url, error = %e, "Catalog crawl failed");
                    if !visitor.closed {
                        let _ = visitor
                            .tx
                            .send(Err(InventoryError::Crawl(format!("{}: {}", thread_url, e))));
                    }
                }
            })?;

        Ok(Box::new(CrawlStream {
            rx,
            handle: Some(handle),
            url,
        }))
    }

    fn kind(&self) -> &'static str {
        "crawl"
    }
}
