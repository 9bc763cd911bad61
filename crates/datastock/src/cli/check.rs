//! Check command - parse a collection spec and report what it means

use crate::cli::error::HelpfulError;
use crate::cli::output::{print_json, print_table};
use datastock_inventory::{CollectionSpec, Diagnostics, Severity};
use serde::Serialize;

#[derive(Debug)]
pub struct CheckArgs {
    pub spec: String,
    pub sentinel: char,
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub spec: String,
    pub root_dir: String,
    pub recurse: bool,
    pub catalog: bool,
    pub filter: Option<String>,
    pub date_template: Option<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

pub fn check_spec(spec: &str, sentinel: char) -> (CheckReport, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let parsed = CollectionSpec::parse_with_sentinel(spec, sentinel, &mut diagnostics);

    let messages = |severity: Severity| -> Vec<String> {
        diagnostics
            .entries()
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.message.clone())
            .collect()
    };

    let report = CheckReport {
        spec: parsed.spec().to_string(),
        root_dir: parsed.root_dir().to_string(),
        recurse: parsed.recurse(),
        catalog: parsed.is_catalog(),
        filter: parsed.filter().map(|f| f.describe()),
        date_template: parsed.date_template().map(|t| t.to_string()),
        warnings: messages(Severity::Warning),
        errors: messages(Severity::Error),
    };
    (report, diagnostics)
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let (report, diagnostics) = check_spec(&args.spec, args.sentinel);

    if args.json {
        print_json(&report)?;
    } else {
        let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();
        print_table(
            &["Field", "Value"],
            vec![
                vec!["root".to_string(), report.root_dir.clone()],
                vec!["recurse".to_string(), yes_no(report.recurse)],
                vec!["catalog".to_string(), yes_no(report.catalog)],
                vec![
                    "filter".to_string(),
                    report.filter.clone().unwrap_or_else(|| "(everything)".to_string()),
                ],
                vec![
                    "date template".to_string(),
                    report.date_template.clone().unwrap_or_else(|| "-".to_string()),
                ],
            ],
        );
        for warning in &report.warnings {
            println!("warning: {}", warning);
        }
    }

    if diagnostics.has_errors() {
        return Err(HelpfulError::invalid_spec(&args.spec, &diagnostics).into());
    }
    Ok(())
}
