//! The inventory: a rescannable index of one named collection.
//!
//! An [`Inventory`] starts out never scanned. The first [`Inventory::scan`]
//! enumerates every scan target unconditionally; later scans diff the fresh
//! enumeration against the previous snapshot:
//!
//! - a path not seen before is an addition, unless it is younger than the
//!   age cutoff (it may still be being written)
//! - a known path whose modification time increased, or that a
//!   [`ChangeChecker`] flags, is modified and takes the new handle
//! - every other known path keeps its previous `Arc<FileHandle>`
//! - known paths no longer enumerated are removals
//!
//! The snapshot is swapped only when something changed, and then exactly one
//! [`TriggerKind::Always`] event is dispatched on the calling thread.
//!
//! Scans of one inventory are serialized by a dedicated lock. Enumeration runs
//! under that lock only; readers take a short read lock to clone the current
//! `Arc<Snapshot>` and never see a half-built one.

use crate::aux_table::AuxTable;
use crate::date::{DateExtractor, DateTemplate};
use crate::duration::TimeDuration;
use crate::enumerate::{CatalogCrawler, Enumerator, LocalWalk, RemoteCrawl};
use crate::error::{Diagnostics, InventoryError, Result};
use crate::events::{ListenerId, ListenerRegistry, TriggerEvent, TriggerKind, TriggerListener};
use crate::filter::FileFilter;
use crate::proto::ProtoChoice;
use crate::spec::{CollectionSpec, ScanTarget};
use crate::types::{AuxInfo, ChangeReport, FileHandle};
use chrono::{DateTime, TimeZone, Utc};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, info};

/// Decides whether a file changed when its modification time did not.
///
/// Typically checks a paired ancillary resource (an index file, a sidecar).
pub trait ChangeChecker: Send + Sync {
    fn has_changed(&self, previous: &FileHandle, current: &FileHandle) -> bool;
}

impl<F> ChangeChecker for F
where
    F: Fn(&FileHandle, &FileHandle) -> bool + Send + Sync,
{
    fn has_changed(&self, previous: &FileHandle, current: &FileHandle) -> bool {
        self(previous, current)
    }
}

/// Immutable set of files produced by one scan, ordered by path.
#[derive(Debug, Default)]
pub struct Snapshot {
    files: Vec<Arc<FileHandle>>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    fn from_handles(mut files: Vec<Arc<FileHandle>>) -> Self {
        files.sort_by(|a, b| a.path().cmp(b.path()));
        files.dedup_by(|a, b| a.path() == b.path());
        let index = files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.path().to_string(), i))
            .collect();
        Self { files, index }
    }

    pub fn get(&self, path: &str) -> Option<&Arc<FileHandle>> {
        self.index.get(path).map(|&i| &self.files[i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn files(&self) -> &[Arc<FileHandle>] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Lazy, unordered iteration over one snapshot.
pub struct FileIter {
    snapshot: Option<Arc<Snapshot>>,
    pos: usize,
}

impl Iterator for FileIter {
    type Item = Arc<FileHandle>;

    fn next(&mut self) -> Option<Self::Item> {
        let snapshot = self.snapshot.as_ref()?;
        let file = snapshot.files.get(self.pos)?;
        self.pos += 1;
        Some(Arc::clone(file))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .snapshot
            .as_ref()
            .map_or(0, |s| s.files.len().saturating_sub(self.pos));
        (remaining, Some(remaining))
    }
}

#[derive(Default)]
struct State {
    snapshot: Option<Arc<Snapshot>>,
    last_scanned: Option<DateTime<Utc>>,
    last_changed: Option<DateTime<Utc>>,
}

pub struct Inventory {
    name: String,
    spec: Option<CollectionSpec>,
    targets: RwLock<Vec<ScanTarget>>,
    enumerator: Arc<dyn Enumerator>,
    change_checker: Option<Arc<dyn ChangeChecker>>,
    date_extractor: DateExtractor,
    proto_choice: ProtoChoice,
    recheck_after: Option<TimeDuration>,
    rescan_cron: Option<String>,
    is_static: bool,
    trigger_ok: bool,
    older_than: Option<TimeDuration>,
    start_date: Option<DateTime<Utc>>,
    diagnostics: Diagnostics,
    scan_lock: Mutex<()>,
    state: RwLock<State>,
    listeners: ListenerRegistry,
    aux: AuxTable,
}

impl Inventory {
    pub fn builder(name: impl Into<String>) -> InventoryBuilder {
        InventoryBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root directory (or catalog URL) of the collection.
    pub fn root(&self) -> String {
        if let Some(spec) = &self.spec {
            return spec.root_dir().to_string();
        }
        self.read_targets()
            .first()
            .map(|t| t.root_dir.clone())
            .unwrap_or_default()
    }

    pub fn spec(&self) -> Option<&CollectionSpec> {
        self.spec.as_ref()
    }

    pub fn scan_targets(&self) -> Vec<ScanTarget> {
        self.read_targets().clone()
    }

    pub fn enumerator(&self) -> Arc<dyn Enumerator> {
        Arc::clone(&self.enumerator)
    }

    /// Configuration faults found while building this inventory.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn recheck_after(&self) -> Option<&TimeDuration> {
        self.recheck_after.as_ref()
    }

    pub fn rescan_cron(&self) -> Option<&str> {
        self.rescan_cron.as_deref()
    }

    pub fn older_than(&self) -> Option<&TimeDuration> {
        self.older_than.as_ref()
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    pub fn proto_choice(&self) -> ProtoChoice {
        self.proto_choice
    }

    pub fn date_extractor(&self) -> &DateExtractor {
        &self.date_extractor
    }

    pub fn has_date_extractor(&self) -> bool {
        self.date_extractor.has_date_extractor()
    }

    pub fn extract_date(&self, file: &FileHandle) -> Option<DateTime<Utc>> {
        self.date_extractor.extract(file)
    }

    /// Index of the proto dataset among `n` sorted files.
    pub fn proto_index(&self, n: usize) -> usize {
        self.proto_choice.index(n)
    }

    pub fn is_scanned(&self) -> bool {
        self.read_state().snapshot.is_some()
    }

    pub fn last_scanned(&self) -> Option<DateTime<Utc>> {
        self.read_state().last_scanned
    }

    pub fn last_changed(&self) -> Option<DateTime<Utc>> {
        self.read_state().last_changed
    }

    /// The current snapshot, `None` before the first scan.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.read_state().snapshot.clone()
    }

    pub fn file_count(&self) -> usize {
        self.snapshot().map_or(0, |s| s.len())
    }

    pub fn get_file(&self, path: &str) -> Option<Arc<FileHandle>> {
        self.snapshot().and_then(|s| s.get(path).cloned())
    }

    /// Unordered iteration over the current snapshot.
    pub fn file_iterator(&self) -> FileIter {
        FileIter {
            snapshot: self.snapshot(),
            pos: 0,
        }
    }

    /// Files ordered by extracted date when a date extractor is configured
    /// (undated files last), otherwise by path. Ties break by path.
    pub fn files_sorted(&self) -> Vec<Arc<FileHandle>> {
        let Some(snapshot) = self.snapshot() else {
            return Vec::new();
        };
        if !self.has_date_extractor() {
            return snapshot.files.clone();
        }

        let mut dated: Vec<(Option<DateTime<Utc>>, Arc<FileHandle>)> = snapshot
            .files
            .iter()
            .map(|f| (self.extract_date(f), Arc::clone(f)))
            .collect();
        dated.sort_by(|(da, fa), (db, fb)| match (da, db) {
            (Some(a), Some(b)) => a.cmp(b).then_with(|| fa.path().cmp(fb.path())),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => fa.path().cmp(fb.path()),
        });
        dated.into_iter().map(|(_, f)| f).collect()
    }

    /// Whether a scheduler should scan this inventory now.
    ///
    /// False without a recheck interval. True when never scanned unless the
    /// collection is static. Otherwise true once the interval has elapsed
    /// since the last scan.
    pub fn is_scan_needed(&self) -> bool {
        let Some(recheck) = &self.recheck_after else {
            return false;
        };
        if self.read_targets().is_empty() {
            return false;
        }
        let state = self.read_state();
        match state.last_scanned {
            None => !self.is_static,
            Some(_) if self.is_static => false,
            Some(last) => Utc::now().timestamp_millis() - last.timestamp_millis() >= recheck.as_millis(),
        }
    }

    /// First pass when never scanned, otherwise a diffing rescan.
    pub fn scan(&self) -> Result<ChangeReport> {
        let _guard = self.lock_scan();
        if self.read_state().snapshot.is_some() {
            self.rescan_locked()
        } else {
            self.first_scan_locked()
        }
    }

    /// Diff against the previous snapshot. Falls back to a first pass when
    /// the inventory was never scanned.
    pub fn rescan(&self) -> Result<ChangeReport> {
        let _guard = self.lock_scan();
        if self.read_state().snapshot.is_some() {
            self.rescan_locked()
        } else {
            self.first_scan_locked()
        }
    }

    /// Out-of-band "resync now". Runs whether or not the collection is static.
    pub fn force_rescan(&self) -> Result<ChangeReport> {
        info!(collection = %self.name, "Forced rescan requested");
        self.rescan()
    }

    /// Scan only if [`Inventory::is_scan_needed`]. Returns whether a scan ran.
    pub fn scan_if_needed(&self) -> Result<bool> {
        if !self.is_scan_needed() {
            return Ok(false);
        }
        self.scan()?;
        Ok(true)
    }

    /// Ask downstream aggregation to recompute its proto dataset.
    pub fn reset_proto(&self) {
        if !self.trigger_ok {
            return;
        }
        self.listeners.dispatch(&TriggerEvent {
            collection: self.name.clone(),
            kind: TriggerKind::ResetProto,
            report: None,
        });
    }

    /// Replace the snapshot with an explicit file set.
    pub fn set_files(&self, files: impl IntoIterator<Item = FileHandle>) {
        self.set_shared_files(files.into_iter().map(Arc::new));
    }

    /// Replace the snapshot with already shared handles, keeping their identity.
    pub fn set_shared_files(&self, files: impl IntoIterator<Item = Arc<FileHandle>>) {
        let _guard = self.lock_scan();
        let snapshot = Snapshot::from_handles(files.into_iter().collect());
        let now = Utc::now();
        let count = snapshot.len();
        let mut state = self.write_state();
        state.snapshot = Some(Arc::new(snapshot));
        state.last_scanned = Some(now);
        state.last_changed = Some(now);
        debug!(collection = %self.name, files = count, "Snapshot replaced");
    }

    /// Add another directory to scan.
    ///
    /// `suffix` and `regexp` restrict file names, `older_than` excludes files
    /// modified too recently, and `aux_info` is attached to every file found.
    pub fn add_directory_scan(
        &self,
        dir: &str,
        suffix: Option<&str>,
        regexp: Option<&str>,
        subdirs: bool,
        older_than: Option<&TimeDuration>,
        aux_info: Option<AuxInfo>,
    ) -> Result<()> {
        let mut filters = Vec::new();
        if let Some(suffix) = suffix {
            filters.push(FileFilter::name_wildcard(&format!("*{}", suffix))?);
        }
        if let Some(regexp) = regexp {
            filters.push(FileFilter::name_regex(regexp)?);
        }
        if let Some(older_than) = older_than {
            filters.push(FileFilter::LastModifiedLimit(older_than.duration()));
        }

        let mut target = ScanTarget::new(dir.trim_end_matches('/'), subdirs, FileFilter::all(filters));
        target.name = format!("{}:{}", self.name, dir);
        target.aux_info = aux_info;
        debug!(collection = %self.name, target = ?target, "Added directory scan");

        match self.targets.write() {
            Ok(mut guard) => guard.push(target),
            Err(poisoned) => poisoned.into_inner().push(target),
        }
        Ok(())
    }

    pub fn add_event_listener(&self, listener: Arc<dyn TriggerListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn put_aux_info<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.aux.put(key, value);
    }

    pub fn get_aux_info<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.aux.get(key)
    }

    fn first_scan_locked(&self) -> Result<ChangeReport> {
        let start = Instant::now();
        let now_ms = Utc::now().timestamp_millis();
        let enumerated = self.enumerate_all()?;
        let discovered = enumerated.len();

        let files: Vec<Arc<FileHandle>> = enumerated
            .into_values()
            .filter(|f| !self.is_too_young(f, now_ms))
            .map(Arc::new)
            .collect();
        let snapshot = Snapshot::from_handles(files);
        let report = ChangeReport {
            added: snapshot.len() as u64,
            ..ChangeReport::default()
        };

        let now = Utc::now();
        {
            let mut state = self.write_state();
            state.snapshot = Some(Arc::new(snapshot));
            state.last_scanned = Some(now);
            if report.is_changed() {
                state.last_changed = Some(now);
            }
        }

        info!(
            collection = %self.name,
            discovered,
            files = report.added,
            duration_ms = start.elapsed().as_millis() as u64,
            "Initial scan complete"
        );
        self.fire_change(report);
        Ok(report)
    }

    fn rescan_locked(&self) -> Result<ChangeReport> {
        let start = Instant::now();
        let Some(previous) = self.snapshot() else {
            return Err(InventoryError::InvalidState(format!(
                "Collection '{}' has no snapshot to diff against",
                self.name
            )));
        };
        let now_ms = Utc::now().timestamp_millis();
        // an enumeration fault returns here, leaving the snapshot untouched
        let enumerated = self.enumerate_all()?;

        let mut report = ChangeReport::default();
        let mut files = Vec::with_capacity(enumerated.len());
        for (path, current) in enumerated {
            match previous.get(&path) {
                None => {
                    if self.is_too_young(&current, now_ms) {
                        debug!(collection = %self.name, path = %path, "Deferring file younger than age cutoff");
                        continue;
                    }
                    debug!(collection = %self.name, path = %path, "New file");
                    report.added += 1;
                    files.push(Arc::new(current));
                }
                Some(old) => {
                    let newer = current.last_modified_ms() > old.last_modified_ms();
                    let flagged = !newer
                        && self
                            .change_checker
                            .as_ref()
                            .map_or(false, |checker| checker.has_changed(old, &current));
                    if newer || flagged {
                        debug!(collection = %self.name, path = %path, flagged, "Changed file");
                        report.modified += 1;
                        files.push(Arc::new(current));
                    } else {
                        files.push(Arc::clone(old));
                    }
                }
            }
        }

        let snapshot = Snapshot::from_handles(files);
        for old in previous.files() {
            if !snapshot.contains(old.path()) {
                debug!(collection = %self.name, path = %old.path(), "Removed file");
                report.removed += 1;
            }
        }

        let now = Utc::now();
        {
            let mut state = self.write_state();
            state.last_scanned = Some(now);
            if report.is_changed() {
                state.snapshot = Some(Arc::new(snapshot));
                state.last_changed = Some(now);
            }
        }

        info!(
            collection = %self.name,
            files = self.file_count(),
            new = report.added,
            changed = report.modified,
            deleted = report.removed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Rescan complete"
        );
        self.fire_change(report);
        Ok(report)
    }

    fn fire_change(&self, report: ChangeReport) {
        if !report.is_changed() || !self.trigger_ok {
            return;
        }
        self.listeners.dispatch(&TriggerEvent {
            collection: self.name.clone(),
            kind: TriggerKind::Always,
            report: Some(report),
        });
    }

    /// Enumerate every scan target into a path-keyed map.
    fn enumerate_all(&self) -> Result<HashMap<String, FileHandle>> {
        let targets = self.scan_targets();
        let mut files = HashMap::new();
        for target in &targets {
            debug!(
                collection = %self.name,
                root = %target.root_dir,
                enumerator = self.enumerator.kind(),
                "Enumerating scan target"
            );
            for item in self.enumerator.enumerate(target)? {
                let file = item?;
                if let Some(aux) = &target.aux_info {
                    if file.aux_info().is_none() {
                        file.set_aux_info(Some(Arc::clone(aux)));
                    }
                }
                if self.before_start_date(&file) {
                    continue;
                }
                files.insert(file.path().to_string(), file);
            }
        }
        Ok(files)
    }

    fn is_too_young(&self, file: &FileHandle, now_ms: i64) -> bool {
        self.older_than
            .as_ref()
            .map_or(false, |limit| now_ms.saturating_sub(file.last_modified_ms()) < limit.as_millis())
    }

    fn before_start_date(&self, file: &FileHandle) -> bool {
        match self.start_date {
            Some(start) => self.extract_date(file).map_or(false, |date| date < start),
            None => false,
        }
    }

    fn lock_scan(&self) -> MutexGuard<'_, ()> {
        match self.scan_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_targets(&self) -> RwLockReadGuard<'_, Vec<ScanTarget>> {
        match self.targets.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inventory")
            .field("name", &self.name)
            .field("root", &self.root())
            .field("enumerator", &self.enumerator.kind())
            .field("date_extractor", &self.date_extractor.to_string())
            .field("is_static", &self.is_static)
            .field("files", &self.file_count())
            .finish()
    }
}

/// Builder for [`Inventory`]. Building never fails; configuration faults are
/// recorded in the inventory's [`Diagnostics`].
pub struct InventoryBuilder {
    name: String,
    spec: Option<CollectionSpec>,
    targets: Vec<ScanTarget>,
    enumerator: Option<Arc<dyn Enumerator>>,
    crawler: Option<Arc<dyn CatalogCrawler>>,
    change_checker: Option<Arc<dyn ChangeChecker>>,
    date_extractor: Option<DateExtractor>,
    date_format_mark: Option<String>,
    proto_choice: ProtoChoice,
    recheck_after: Option<TimeDuration>,
    rescan_cron: Option<String>,
    is_static: Option<bool>,
    trigger_ok: bool,
    older_than: Option<TimeDuration>,
    start_date: Option<DateTime<Utc>>,
    diagnostics: Diagnostics,
}

impl InventoryBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: None,
            targets: Vec::new(),
            enumerator: None,
            crawler: None,
            change_checker: None,
            date_extractor: None,
            date_format_mark: None,
            proto_choice: ProtoChoice::default(),
            recheck_after: None,
            rescan_cron: None,
            is_static: None,
            trigger_ok: true,
            older_than: None,
            start_date: None,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Parse and use a collection spec.
    pub fn spec(mut self, spec: &str) -> Self {
        let parsed = CollectionSpec::parse(spec, &mut self.diagnostics);
        self.spec = Some(parsed);
        self
    }

    /// Use an already-parsed spec along with the faults its parse recorded.
    pub fn collection_spec(mut self, spec: CollectionSpec, diagnostics: Diagnostics) -> Self {
        self.diagnostics.append(diagnostics);
        self.spec = Some(spec);
        self
    }

    /// Add a scan target besides the one the spec describes.
    pub fn scan_target(mut self, target: ScanTarget) -> Self {
        self.targets.push(target);
        self
    }

    pub fn enumerator(mut self, enumerator: Arc<dyn Enumerator>) -> Self {
        self.enumerator = Some(enumerator);
        self
    }

    /// Crawler used for `catalog:` specs when no enumerator is given.
    pub fn crawler(mut self, crawler: Arc<dyn CatalogCrawler>) -> Self {
        self.crawler = Some(crawler);
        self
    }

    pub fn change_checker(mut self, checker: Arc<dyn ChangeChecker>) -> Self {
        self.change_checker = Some(checker);
        self
    }

    pub fn date_extractor(mut self, extractor: DateExtractor) -> Self {
        self.date_extractor = Some(extractor);
        self
    }

    /// Date template searched for in the full path, e.g. `radar_#yyyyMMdd`.
    pub fn date_format_mark(mut self, mark: impl Into<String>) -> Self {
        self.date_format_mark = Some(mark.into());
        self
    }

    pub fn proto_choice(mut self, choice: ProtoChoice) -> Self {
        self.proto_choice = choice;
        self
    }

    pub fn recheck_after(mut self, interval: TimeDuration) -> Self {
        self.recheck_after = Some(interval);
        self
    }

    /// Cron expression for an external scheduler. Stored, never evaluated.
    pub fn rescan_cron(mut self, cron: impl Into<String>) -> Self {
        self.rescan_cron = Some(cron.into());
        self
    }

    /// Force the static flag. By default a collection is static when it has
    /// neither a recheck interval nor a rescan schedule.
    pub fn static_collection(mut self, is_static: bool) -> Self {
        self.is_static = Some(is_static);
        self
    }

    /// Disable event dispatch. Scans still update the snapshot.
    pub fn trigger_ok(mut self, trigger_ok: bool) -> Self {
        self.trigger_ok = trigger_ok;
        self
    }

    pub fn older_than(mut self, older_than: TimeDuration) -> Self {
        self.older_than = Some(older_than);
        self
    }

    /// Exclude files whose extracted date is before `start`.
    pub fn start_date(mut self, start: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self
    }

    pub fn start_date_millis(self, start_ms: i64) -> Self {
        match Utc.timestamp_millis_opt(start_ms).single() {
            Some(start) => self.start_date(start),
            None => self,
        }
    }

    pub fn build(mut self) -> Inventory {
        let mut targets = Vec::new();
        if let Some(spec) = &self.spec {
            targets.push(spec.scan_target(&self.name));
        }
        targets.append(&mut self.targets);

        let is_catalog = self.spec.as_ref().map_or(false, |s| s.is_catalog());
        let enumerator: Arc<dyn Enumerator> = match (self.enumerator.take(), self.crawler.take()) {
            (Some(enumerator), _) => enumerator,
            (None, Some(crawler)) => Arc::new(RemoteCrawl::new(crawler)),
            (None, None) => {
                if is_catalog {
                    self.diagnostics.error(format!(
                        "Collection '{}' is a catalog crawl but no crawler is configured",
                        self.name
                    ));
                }
                Arc::new(LocalWalk::new())
            }
        };

        let date_extractor = match (self.date_extractor.take(), self.date_format_mark.take()) {
            (Some(extractor), _) => extractor,
            (None, Some(mark)) => match DateTemplate::parse(&mark) {
                Ok(template) => DateExtractor::FromPath(template),
                Err(e) => {
                    self.diagnostics
                        .error(format!("Invalid date format mark '{}': {}", mark, e));
                    DateExtractor::None
                }
            },
            (None, None) => self
                .spec
                .as_ref()
                .map(|s| s.date_extractor())
                .unwrap_or_default(),
        };

        let older_than = self
            .older_than
            .or_else(|| self.spec.as_ref().and_then(|s| s.older_than().cloned()));
        let is_static = self
            .is_static
            .unwrap_or(self.recheck_after.is_none() && self.rescan_cron.is_none());

        Inventory {
            name: self.name,
            spec: self.spec,
            targets: RwLock::new(targets),
            enumerator,
            change_checker: self.change_checker,
            date_extractor,
            proto_choice: self.proto_choice,
            recheck_after: self.recheck_after,
            rescan_cron: self.rescan_cron,
            is_static,
            trigger_ok: self.trigger_ok,
            older_than,
            start_date: self.start_date,
            diagnostics: self.diagnostics,
            scan_lock: Mutex::new(()),
            state: RwLock::new(State::default()),
            listeners: ListenerRegistry::default(),
            aux: AuxTable::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ListenerError;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, mtime_secs: i64) {
        let path = dir.join(name);
        fs::write(&path, b"data").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
    }

    fn inventory_for(temp: &TempDir) -> Inventory {
        Inventory::builder("test")
            .spec(&format!("{}/.*\\.nc", temp.path().display()))
            .build()
    }

    #[test]
    fn test_first_scan_counts_everything_as_added() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "a.nc", 1_000_000);
        create_test_file(temp.path(), "b.nc", 1_000_000);
        create_test_file(temp.path(), "c.txt", 1_000_000);

        let inv = inventory_for(&temp);
        assert!(!inv.is_scanned());
        assert_eq!(inv.file_count(), 0);

        let report = inv.scan().unwrap();
        assert_eq!(report.added, 2);
        assert!(inv.is_scanned());
        assert_eq!(inv.file_count(), 2);
        assert!(inv.last_scanned().is_some());
        assert!(inv.last_changed().is_some());
    }

    #[test]
    fn test_scanned_empty_differs_from_never_scanned() {
        let temp = TempDir::new().unwrap();
        let inv = inventory_for(&temp);
        assert!(inv.snapshot().is_none());

        let report = inv.scan().unwrap();
        assert!(!report.is_changed());
        assert!(inv.snapshot().unwrap().is_empty());
        assert!(inv.last_changed().is_none());
    }

    #[test]
    fn test_modified_file_gets_new_handle() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "a.nc", 1_000_000);
        let inv = inventory_for(&temp);
        inv.scan().unwrap();
        let before = inv.files_sorted()[0].clone();

        set_file_mtime(temp.path().join("a.nc"), FileTime::from_unix_time(2_000_000, 0)).unwrap();
        let report = inv.rescan().unwrap();
        assert_eq!(report.modified, 1);
        let after = inv.files_sorted()[0].clone();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_older_mtime_is_not_a_change() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "a.nc", 2_000_000);
        let inv = inventory_for(&temp);
        inv.scan().unwrap();

        set_file_mtime(temp.path().join("a.nc"), FileTime::from_unix_time(1_000_000, 0)).unwrap();
        assert!(!inv.rescan().unwrap().is_changed());
    }

    #[test]
    fn test_change_checker_replaces_identity() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "a.nc", 1_000_000);
        let flag = Arc::new(AtomicUsize::new(0));
        let checker_flag = Arc::clone(&flag);
        let inv = Inventory::builder("checked")
            .spec(&format!("{}/.*\\.nc", temp.path().display()))
            .change_checker(Arc::new(move |_: &FileHandle, _: &FileHandle| {
                checker_flag.load(Ordering::SeqCst) > 0
            }))
            .build();
        inv.scan().unwrap();
        let before = inv.files_sorted()[0].clone();

        assert!(!inv.rescan().unwrap().is_changed());
        flag.store(1, Ordering::SeqCst);
        let report = inv.rescan().unwrap();
        assert_eq!(report.modified, 1);
        let after = inv.get_file(before.path()).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_enumeration_fault_keeps_previous_snapshot() {
        struct Failing(AtomicUsize);
        impl Enumerator for Failing {
            fn enumerate(&self, _target: &ScanTarget) -> Result<crate::enumerate::FileStream> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    let files = vec![Ok(FileHandle::new("/x/a.nc", 1, 1, false))];
                    Ok(Box::new(files.into_iter()))
                } else {
                    let files = vec![
                        Ok(FileHandle::new("/x/b.nc", 1, 1, false)),
                        Err(InventoryError::Crawl("connection reset".to_string())),
                    ];
                    Ok(Box::new(files.into_iter()))
                }
            }

            fn kind(&self) -> &'static str {
                "failing"
            }
        }

        let inv = Inventory::builder("faulty")
            .scan_target(ScanTarget::new("/x", false, None))
            .enumerator(Arc::new(Failing(AtomicUsize::new(0))))
            .build();
        inv.scan().unwrap();
        let scanned_at = inv.last_scanned();
        let before = inv.snapshot().unwrap();

        assert!(inv.rescan().is_err());
        assert!(Arc::ptr_eq(&before, &inv.snapshot().unwrap()));
        assert_eq!(inv.last_scanned(), scanned_at);
    }

    #[test]
    fn test_panicked_crawl_keeps_previous_snapshot() {
        use crate::enumerate::{CrawlRecord, CrawlVisitor};

        /// Lists two datasets, then panics midway on later crawls.
        struct Flaky(AtomicUsize);
        impl CatalogCrawler for Flaky {
            fn crawl(&self, catalog_url: &str, visitor: &mut dyn CrawlVisitor) -> Result<()> {
                let run = self.0.fetch_add(1, Ordering::SeqCst);
                for name in ["a.nc", "b.nc"] {
                    visitor.on_dataset(CrawlRecord {
                        url: format!("{}/{}", catalog_url, name),
                        size: Some(1),
                        modified: None,
                    });
                    if run > 0 {
                        panic!("catalog connection dropped");
                    }
                }
                Ok(())
            }
        }

        let inv = Inventory::builder("remote")
            .spec("catalog:https://example.org/catalog.xml")
            .crawler(Arc::new(Flaky(AtomicUsize::new(0))))
            .build();
        assert_eq!(inv.scan().unwrap().added, 2);
        let before = inv.snapshot().unwrap();

        assert!(matches!(inv.rescan(), Err(InventoryError::Crawl(_))));
        assert!(Arc::ptr_eq(&before, &inv.snapshot().unwrap()));
        assert_eq!(inv.file_count(), 2);
    }

    #[test]
    fn test_events_fire_once_per_change() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "a.nc", 1_000_000);
        let inv = inventory_for(&temp);
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let id = inv.add_event_listener(Arc::new(move |e: &TriggerEvent| -> std::result::Result<(), ListenerError> {
            sink.lock().unwrap().push(e.clone());
            Ok(())
        }));

        inv.scan().unwrap();
        inv.rescan().unwrap();
        create_test_file(temp.path(), "b.nc", 1_000_000);
        inv.rescan().unwrap();
        inv.reset_proto();

        {
            let events = events.lock().unwrap();
            assert_eq!(events.len(), 3);
            assert_eq!(events[0].kind, TriggerKind::Always);
            assert_eq!(events[1].report.unwrap().added, 1);
            assert_eq!(events[2].kind, TriggerKind::ResetProto);
            assert!(events[2].report.is_none());
        }

        assert!(inv.remove_event_listener(id));
        inv.reset_proto();
        assert_eq!(events.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_is_scan_needed() {
        let temp = TempDir::new().unwrap();
        let no_policy = inventory_for(&temp);
        assert!(no_policy.is_static());
        assert!(!no_policy.is_scan_needed());

        let polled = Inventory::builder("polled")
            .spec(&format!("{}/.*", temp.path().display()))
            .recheck_after(TimeDuration::from_duration(Duration::from_secs(3600)))
            .build();
        assert!(!polled.is_static());
        assert!(polled.is_scan_needed());
        assert!(polled.scan_if_needed().unwrap());
        assert!(!polled.is_scan_needed());
        assert!(!polled.scan_if_needed().unwrap());

        let eager = Inventory::builder("eager")
            .spec(&format!("{}/.*", temp.path().display()))
            .recheck_after(TimeDuration::from_duration(Duration::ZERO))
            .build();
        eager.scan().unwrap();
        assert!(eager.is_scan_needed());

        let frozen = Inventory::builder("frozen")
            .spec(&format!("{}/.*", temp.path().display()))
            .recheck_after(TimeDuration::from_duration(Duration::ZERO))
            .static_collection(true)
            .build();
        assert!(!frozen.is_scan_needed());
        // forced resync ignores the static flag
        assert!(frozen.force_rescan().is_ok());
        assert!(frozen.is_scanned());
    }

    #[test]
    fn test_files_sorted_by_date_with_undated_last() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "obs_20230603.nc", 1_000_000);
        create_test_file(temp.path(), "obs_20230601.nc", 1_000_000);
        create_test_file(temp.path(), "obs_latest.nc", 1_000_000);

        let inv = Inventory::builder("obs")
            .spec(&format!("{}/obs_#yyyyMMdd", temp.path().display()))
            .build();
        assert!(inv.has_date_extractor());
        inv.scan().unwrap();

        let names: Vec<String> = inv.files_sorted().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["obs_20230601.nc", "obs_20230603.nc", "obs_latest.nc"]);
        assert_eq!(inv.proto_index(names.len()), 1);
    }

    #[test]
    fn test_add_directory_scan_with_aux_info() {
        let temp = TempDir::new().unwrap();
        let extra = TempDir::new().unwrap();
        create_test_file(temp.path(), "a.nc", 1_000_000);
        create_test_file(extra.path(), "b.grib2", 1_000_000);
        create_test_file(extra.path(), "b.idx", 1_000_000);

        let inv = inventory_for(&temp);
        inv.add_directory_scan(
            &extra.path().to_string_lossy(),
            Some(".grib2"),
            None,
            false,
            None,
            Some(Arc::new("grib".to_string())),
        )
        .unwrap();
        assert_eq!(inv.scan().unwrap().added, 2);

        let grib = inv
            .file_iterator()
            .find(|f| f.name() == "b.grib2")
            .unwrap();
        assert_eq!(grib.aux_info_as::<String>().as_deref().map(String::as_str), Some("grib"));

        assert!(inv
            .add_directory_scan("/tmp", None, Some("(unclosed"), false, None, None)
            .is_err());
    }

    #[test]
    fn test_set_files_and_aux_table() {
        let inv = Inventory::builder("explicit").build();
        inv.set_files(vec![
            FileHandle::new("/d/b.nc", 1, 0, false),
            FileHandle::new("/d/a.nc", 1, 0, false),
        ]);
        assert_eq!(inv.file_count(), 2);
        assert_eq!(inv.files_sorted()[0].path(), "/d/a.nc");
        assert_eq!(inv.file_iterator().size_hint(), (2, Some(2)));

        inv.put_aux_info("proto", 3usize);
        assert_eq!(inv.get_aux_info::<usize>("proto").as_deref(), Some(&3));
        assert!(inv.get_aux_info::<String>("proto").is_none());
    }

    #[test]
    fn test_catalog_spec_without_crawler_is_diagnosed() {
        let inv = Inventory::builder("remote")
            .spec("catalog:https://example.org/catalog.xml")
            .build();
        assert!(inv.diagnostics().has_errors());
        assert_eq!(inv.root(), "https://example.org/catalog.xml");
        assert_eq!(inv.scan().unwrap().added, 0);
    }

    #[test]
    fn test_start_date_excludes_earlier_files() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "obs_20230601.nc", 1_000_000);
        create_test_file(temp.path(), "obs_20230603.nc", 1_000_000);

        let inv = Inventory::builder("obs")
            .spec(&format!("{}/obs_#yyyyMMdd", temp.path().display()))
            .start_date(Utc.with_ymd_and_hms(2023, 6, 2, 0, 0, 0).unwrap())
            .build();
        inv.scan().unwrap();
        assert_eq!(inv.file_count(), 1);
    }
}
