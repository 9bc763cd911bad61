//! Error types for the inventory engine

use std::fmt;
use std::io;
use thiserror::Error;

/// Inventory error type
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Crawl error: {0}")]
    Crawl(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Pattern error: {0}")]
    Pattern(String),

    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Failures that abort a single partition build.
#[derive(Error, Debug)]
pub enum PartitionError {
    #[error("No date extractor configured for collection '{0}'")]
    NoDateExtractor(String),

    #[error("Cannot extract a date from '{path}' in collection '{collection}'")]
    NoDate { collection: String, path: String },

    #[error("Invalid partition period: {0}")]
    InvalidPeriod(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Severity of a configuration diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single configuration fault reported while parsing or building a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Warning => write!(f, "warning: {}", self.message),
            Severity::Error => write!(f, "error: {}", self.message),
        }
    }
}

/// Diagnostic sink for configuration faults.
///
/// Configuration problems never abort parsing: they are collected here and
/// logged, and the collection behaves as present-but-empty until corrected.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "collection configuration warning");
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            message,
        });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(%message, "collection configuration error");
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            message,
        });
    }

    /// Take over entries that were already logged when recorded.
    pub(crate) fn append(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}
