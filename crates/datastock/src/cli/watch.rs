//! Watch command - keep a set of configured collections up to date
//!
//! Polls every collection on a fixed interval and rescans the ones whose
//! recheck interval has elapsed. Cron rescans are left to the host scheduler.

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_optional_time, print_json, print_table};
use anyhow::Context;
use chrono::{DateTime, Utc};
use datastock_inventory::{
    DatastockConfig, Inventory, ListenerError, MemorySideStore, SideStore, TriggerEvent,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct WatchArgs {
    pub config: PathBuf,
    /// Run a single poll and exit
    pub once: bool,
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct CollectionStatus {
    pub name: String,
    pub files: usize,
    pub last_scanned: Option<DateTime<Utc>>,
    pub last_changed: Option<DateTime<Utc>>,
    pub last_event: Option<TriggerEvent>,
}

fn event_key(collection: &str) -> String {
    format!("{}/last_event", collection)
}

/// Build one inventory per configured collection, each recording its latest
/// change event into `store`.
pub fn load_inventories(
    config: &DatastockConfig,
    store: &Arc<MemorySideStore>,
) -> anyhow::Result<Vec<Arc<Inventory>>> {
    let mut inventories = Vec::with_capacity(config.collections.len());
    for collection in &config.collections {
        let inventory = collection
            .to_inventory(config.default_recheck_after.as_ref())
            .with_context(|| format!("Failed to set up collection '{}'", collection.name))?;
        if inventory.diagnostics().has_errors() {
            warn!(collection = %collection.name, "Collection has configuration errors and stays empty");
        }

        let store = Arc::clone(store);
        inventory.add_event_listener(Arc::new(
            move |event: &TriggerEvent| -> Result<(), ListenerError> {
                let bytes = serde_json::to_vec(event)?;
                store.put(&event_key(&event.collection), bytes);
                Ok(())
            },
        ));
        inventories.push(Arc::new(inventory));
    }
    Ok(inventories)
}

/// Run one polling round. Collections never scanned get their first pass
/// regardless of interval, so static collections are populated once.
pub async fn poll(inventories: &[Arc<Inventory>]) -> usize {
    let mut handles = Vec::with_capacity(inventories.len());
    for inventory in inventories {
        let inventory = Arc::clone(inventory);
        handles.push(tokio::task::spawn_blocking(move || {
            let result = if inventory.is_scanned() {
                inventory.scan_if_needed()
            } else {
                inventory.scan().map(|_| true)
            };
            (inventory.name().to_string(), result)
        }));
    }

    let mut scanned = 0;
    for handle in handles {
        match handle.await {
            Ok((_, Ok(true))) => scanned += 1,
            Ok((name, Ok(false))) => debug!(collection = %name, "Scan not needed"),
            Ok((name, Err(e))) => error!(collection = %name, error = %e, "Scan failed"),
            Err(e) => error!(error = %e, "Scan task failed"),
        }
    }
    scanned
}

pub fn status(inventories: &[Arc<Inventory>], store: &MemorySideStore) -> Vec<CollectionStatus> {
    inventories
        .iter()
        .map(|inventory| CollectionStatus {
            name: inventory.name().to_string(),
            files: inventory.file_count(),
            last_scanned: inventory.last_scanned(),
            last_changed: inventory.last_changed(),
            last_event: store
                .get(&event_key(inventory.name()))
                .and_then(|bytes| serde_json::from_slice(&bytes).ok()),
        })
        .collect()
}

pub async fn watch(config: DatastockConfig, once: bool) -> anyhow::Result<Vec<CollectionStatus>> {
    let store = Arc::new(MemorySideStore::new());
    let inventories = load_inventories(&config, &store)?;
    info!(
        collections = inventories.len(),
        poll_interval_secs = config.poll_interval_secs,
        "Watching collections"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.poll_interval_secs.max(1)));
    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                break;
            }

            _ = interval.tick() => {
                let scanned = poll(&inventories).await;
                debug!(scanned, "Poll complete");
                if once {
                    break;
                }
            }
        }
    }

    Ok(status(&inventories, &store))
}

pub fn run(args: WatchArgs) -> anyhow::Result<()> {
    if !args.config.exists() {
        return Err(HelpfulError::config_not_found(&args.config).into());
    }
    let config = DatastockConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let statuses = runtime.block_on(watch(config, args.once))?;

    if args.json {
        return print_json(&statuses);
    }
    let rows = statuses
        .into_iter()
        .map(|s| {
            vec![
                s.name,
                s.files.to_string(),
                format_optional_time(s.last_scanned),
                format_optional_time(s.last_changed),
                s.last_event
                    .and_then(|e| e.report)
                    .map(|r| format!("+{} ~{} -{}", r.added, r.modified, r.removed))
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(&["Collection", "Files", "Scanned", "Changed", "Last change"], rows);
    Ok(())
}
