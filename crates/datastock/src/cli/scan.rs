//! Scan command - build a collection inventory and list its files
//!
//! Runs a single first-pass scan. No state is kept between runs.

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_optional_time, format_size, format_time, print_json, print_table};
use anyhow::Context;
use chrono::{DateTime, Utc};
use datastock_inventory::{ExplicitList, Inventory, TimeDuration};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug)]
pub struct ScanArgs {
    pub spec: String,
    pub older_than: Option<String>,
    pub date_mark: Option<String>,
    /// Explicit file list instead of a directory walk
    pub files: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Debug, Serialize)]
pub struct ScannedFile {
    pub path: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ScanOutput {
    pub collection: String,
    pub root: String,
    pub files: Vec<ScannedFile>,
    pub total_size: u64,
    pub dated: usize,
    pub proto: Option<String>,
}

pub fn build_inventory(args: &ScanArgs) -> anyhow::Result<Inventory> {
    let mut builder = Inventory::builder("scan").spec(&args.spec);
    if let Some(text) = &args.older_than {
        let older_than: TimeDuration = text
            .parse()
            .map_err(|e: String| HelpfulError::invalid_duration(text, &e))?;
        builder = builder.older_than(older_than);
    }
    if let Some(mark) = &args.date_mark {
        builder = builder.date_format_mark(mark.clone());
    }
    if let Some(list) = &args.files {
        builder = builder.enumerator(Arc::new(ExplicitList::parse(list)));
    }

    let inventory = builder.build();
    if inventory.diagnostics().has_errors() {
        return Err(HelpfulError::invalid_spec(&args.spec, inventory.diagnostics()).into());
    }
    Ok(inventory)
}

pub fn scan(args: &ScanArgs) -> anyhow::Result<ScanOutput> {
    let inventory = build_inventory(args)?;
    inventory
        .scan()
        .with_context(|| format!("Failed to scan {}", inventory.root()))?;

    let sorted = inventory.files_sorted();
    let files: Vec<ScannedFile> = sorted
        .iter()
        .map(|f| ScannedFile {
            path: f.path().to_string(),
            size: f.size(),
            last_modified: f.last_modified(),
            date: inventory.extract_date(f),
        })
        .collect();
    let proto = if sorted.is_empty() {
        None
    } else {
        Some(sorted[inventory.proto_index(sorted.len())].path().to_string())
    };

    Ok(ScanOutput {
        collection: inventory.name().to_string(),
        root: inventory.root(),
        total_size: files.iter().map(|f| f.size).sum(),
        dated: files.iter().filter(|f| f.date.is_some()).count(),
        files,
        proto,
    })
}

pub fn run(args: ScanArgs) -> anyhow::Result<()> {
    let output = scan(&args)?;

    if args.json {
        return print_json(&output);
    }
    if args.quiet {
        for file in &output.files {
            println!("{}", file.path);
        }
        return Ok(());
    }

    let rows = output
        .files
        .iter()
        .map(|f| {
            vec![
                f.path.clone(),
                format_size(f.size),
                f.last_modified.map(format_time).unwrap_or_else(|| "-".to_string()),
                format_optional_time(f.date),
            ]
        })
        .collect();
    print_table(&["Path", "Size", "Modified", "Date"], rows);
    println!(
        "{} files, {} total, {} dated, root {}",
        output.files.len(),
        format_size(output.total_size),
        output.dated,
        output.root
    );
    if let Some(proto) = &output.proto {
        println!("proto: {}", proto);
    }
    Ok(())
}
