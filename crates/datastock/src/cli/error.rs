//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use datastock_inventory::Diagnostics;
use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// Config file does not exist
    pub fn config_not_found(path: &Path) -> Self {
        Self::new(format!("Config file not found: {}", path.display()))
            .with_context("The watch command reads collections from a TOML file")
            .with_suggestions([
                format!("TRY: Check that the file exists: ls -la {}", path.display()),
                "TRY: Start from a minimal file with one [[collections]] table (name, spec)".to_string(),
            ])
    }

    /// A collection spec has configuration errors
    pub fn invalid_spec(spec: &str, diagnostics: &Diagnostics) -> Self {
        let mut err = Self::new(format!("Invalid collection spec: {}", spec))
            .with_context(
                diagnostics
                    .entries()
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            );
        err = err.with_suggestions([
            "TRY: Filters are regular expressions on the file name, e.g. /data/**/.*\\.nc".to_string(),
            "TRY: Plain globs also work when they are not valid regexes, e.g. /data/**/*.nc".to_string(),
            "TRY: Mark a date with two sentinels, e.g. /data/obs_#yyyyMMdd_HHmm#.nc".to_string(),
        ]);
        err
    }

    /// Invalid duration format
    pub fn invalid_duration(text: &str, reason: &str) -> Self {
        Self::new(format!("Invalid duration: '{}'", text))
            .with_context(reason.to_string())
            .with_suggestions([
                "TRY: Use a number followed by a unit: 30 sec, 15 min, 1 hour, 2 days".to_string(),
                "TRY: Valid units: ms, s, sec, m, min, h, hour, d, day, w, week".to_string(),
            ])
    }

    /// Partitioning needs a date in every file name
    pub fn partition_failed(collection: &str, reason: &str) -> Self {
        Self::new(format!("Cannot partition collection '{}'", collection))
            .with_context(reason.to_string())
            .with_suggestions([
                "TRY: Add a date template to the spec, e.g. /data/obs_#yyyyMMdd#.nc".to_string(),
                "TRY: Narrow the filter so undated files are excluded".to_string(),
                "TRY: Partition by directory instead: --by directory".to_string(),
            ])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// Print an error as a JSON object on stdout
pub fn print_json_error(err: &anyhow::Error) {
    let payload = match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "error": helpful.message,
            "context": helpful.context,
            "suggestions": helpful.suggestions,
        }),
        None => serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(|c| c.to_string()).collect::<Vec<_>>(),
        }),
    };
    println!("{}", payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_helpful_error_display() {
        let err = HelpfulError::new("Something went wrong")
            .with_context("While scanning")
            .with_suggestion("Try again");

        let display = format!("{}", err);
        assert!(display.contains("ERROR: Something went wrong"));
        assert!(display.contains("CONTEXT: While scanning"));
        assert!(display.contains("Try again"));
    }

    #[test]
    fn test_config_not_found() {
        let path = PathBuf::from("/nonexistent/datastock.toml");
        let display = format!("{}", HelpfulError::config_not_found(&path));
        assert!(display.contains("/nonexistent/datastock.toml"));
        assert!(display.contains("TRY:"));
    }

    #[test]
    fn test_invalid_spec_lists_diagnostics() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.error("Invalid filter '[x': unclosed");
        let display = format!("{}", HelpfulError::invalid_spec("/data/[x", &diagnostics));
        assert!(display.contains("error: Invalid filter"));
    }
}
