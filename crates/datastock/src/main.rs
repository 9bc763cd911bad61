//! Datastock command-line launcher
//!
//! Inspect collection specs, list and partition collections, and watch a
//! configured set of collections for changes.

mod cli;

use clap::{Parser, Subcommand};
use cli::partition::PartitionBy;
use datastock_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "datastock", version, about = "Collection inventory and change detection")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a collection spec and show its root, filter and date template
    Check {
        /// Collection spec, e.g. /data/**/KFTG_#yyyyMMdd_HHmm#.nc
        spec: String,

        /// Character delimiting the date template
        #[arg(long, default_value_t = '#')]
        sentinel: char,

        #[arg(long)]
        json: bool,
    },

    /// Scan a collection and list its files in date order
    Scan {
        spec: String,

        /// Skip files modified more recently than this (e.g. "5 min")
        #[arg(long)]
        older_than: Option<String>,

        /// Date template searched in the full path, e.g. "#yyyy/MM/dd#"
        #[arg(long)]
        date_mark: Option<String>,

        /// Explicit file list (`;`, `,` or whitespace separated) instead of a walk
        #[arg(long)]
        files: Option<String>,

        #[arg(long)]
        json: bool,

        /// Print paths only
        #[arg(short, long)]
        quiet: bool,
    },

    /// Split a collection into partitions
    Partition {
        spec: String,

        #[arg(long, value_enum, default_value_t = PartitionBy::Time)]
        by: PartitionBy,

        /// Window length for time partitions (default one day)
        #[arg(long)]
        period: Option<String>,

        /// Marker file name for marker partitions
        #[arg(long)]
        marker: Option<String>,

        #[arg(long)]
        date_mark: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Poll configured collections and rescan them when due
    Watch {
        /// TOML file listing the collections
        #[arg(short, long, env = "DATASTOCK_CONFIG", default_value = "datastock.toml")]
        config: PathBuf,

        /// Poll once and exit
        #[arg(long)]
        once: bool,

        #[arg(long)]
        json: bool,
    },
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Check { json, .. } => *json,
        Commands::Scan { json, .. } => *json,
        Commands::Partition { json, .. } => *json,
        Commands::Watch { json, .. } => *json,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = command_wants_json(&cli.command);

    let _log_guard = match init_logging(LogConfig {
        app_name: "datastock",
        verbose: cli.verbose,
        quiet: json_mode,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:#}", err);
            None
        }
    };

    let result = match cli.command {
        Commands::Check { spec, sentinel, json } => {
            cli::check::run(cli::check::CheckArgs { spec, sentinel, json })
        }
        Commands::Scan {
            spec,
            older_than,
            date_mark,
            files,
            json,
            quiet,
        } => cli::scan::run(cli::scan::ScanArgs {
            spec,
            older_than,
            date_mark,
            files,
            json,
            quiet,
        }),
        Commands::Partition {
            spec,
            by,
            period,
            marker,
            date_mark,
            json,
        } => cli::partition::run(cli::partition::PartitionArgs {
            spec,
            by,
            period,
            marker,
            date_mark,
            json,
        }),
        Commands::Watch { config, once, json } => {
            cli::watch::run(cli::watch::WatchArgs { config, once, json })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_partition_args() {
        let cli = Cli::try_parse_from([
            "datastock", "partition", "/data/obs_#yyyyMMdd#.nc", "--by", "marker", "--marker", "READY",
        ])
        .unwrap();
        match cli.command {
            Commands::Partition { by, marker, .. } => {
                assert_eq!(by, PartitionBy::Marker);
                assert_eq!(marker.as_deref(), Some("READY"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_json_flag_detection() {
        let cli = Cli::try_parse_from(["datastock", "-v", "check", "/data/.*", "--json"]).unwrap();
        assert!(cli.verbose);
        assert!(command_wants_json(&cli.command));
    }
}
