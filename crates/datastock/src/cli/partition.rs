//! Partition command - split a collection into sub-collections

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_optional_time, print_json, print_table};
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use datastock_inventory::{
    Inventory, InventoryError, PartitionSpec, Partitioner, TimeDuration,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PartitionBy {
    /// Fixed time windows over the file dates
    Time,
    /// One partition per subdirectory
    Directory,
    /// Subdirectories holding a marker file
    Marker,
}

#[derive(Debug)]
pub struct PartitionArgs {
    pub spec: String,
    pub by: PartitionBy,
    pub period: Option<String>,
    pub marker: Option<String>,
    pub date_mark: Option<String>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct PartitionRow {
    pub name: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub files: usize,
}

fn partition_spec(args: &PartitionArgs) -> anyhow::Result<PartitionSpec> {
    Ok(match args.by {
        PartitionBy::Directory => PartitionSpec::Directory,
        PartitionBy::Marker => {
            let marker = args.marker.clone().ok_or_else(|| {
                HelpfulError::new("Marker partitions need a marker file name")
                    .with_suggestion("TRY: --by marker --marker READY")
            })?;
            PartitionSpec::Marker(marker)
        }
        PartitionBy::Time => match &args.period {
            Some(text) => {
                let period: TimeDuration = text
                    .parse()
                    .map_err(|e: String| HelpfulError::invalid_duration(text, &e))?;
                PartitionSpec::TimePeriod(period.duration())
            }
            None => PartitionSpec::daily(),
        },
    })
}

pub fn partition(args: &PartitionArgs) -> anyhow::Result<Vec<PartitionRow>> {
    let spec = partition_spec(args)?;

    let mut builder = Inventory::builder("partition").spec(&args.spec);
    if let Some(mark) = &args.date_mark {
        builder = builder.date_format_mark(mark.clone());
    }
    let inventory = builder.build();
    if inventory.diagnostics().has_errors() {
        return Err(HelpfulError::invalid_spec(&args.spec, inventory.diagnostics()).into());
    }

    if matches!(spec, PartitionSpec::TimePeriod(_)) {
        inventory
            .scan()
            .with_context(|| format!("Failed to scan {}", inventory.root()))?;
    }

    let partitions = match Partitioner::make_partitions(&inventory, &spec) {
        Ok(partitions) => partitions,
        Err(InventoryError::Partition(e)) => {
            return Err(HelpfulError::partition_failed(&args.spec, &e.to_string()).into())
        }
        Err(e) => return Err(e).context("Failed to build partitions"),
    };

    Ok(partitions
        .iter()
        .map(|p| PartitionRow {
            name: p.name.clone(),
            start: p.start,
            end: p.end,
            files: p.inventory.file_count(),
        })
        .collect())
}

pub fn run(args: PartitionArgs) -> anyhow::Result<()> {
    let rows = partition(&args)?;

    if args.json {
        return print_json(&rows);
    }

    let count = rows.len();
    let table_rows = rows
        .into_iter()
        .map(|r| {
            vec![
                r.name,
                format_optional_time(r.start),
                format_optional_time(r.end),
                r.files.to_string(),
            ]
        })
        .collect();
    print_table(&["Partition", "Start", "End", "Files"], table_rows);
    println!("{} partitions", count);
    Ok(())
}
