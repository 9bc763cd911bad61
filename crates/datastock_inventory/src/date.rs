//! Date extraction from file names and paths.
//!
//! A date template is a literal prefix, a sentinel (`#` by default), a date
//! mask and optionally a second sentinel followed by a literal suffix:
//!
//! ```text
//! data_#yyyyMMdd_HHmm#.ext    two sentinels: prefix, mask, suffix
//! gfs_#yyyyMMdd_HH            one sentinel: prefix, mask, trailing text ignored
//! ```

use crate::date_pattern::DatePattern;
use crate::types::FileHandle;
use chrono::{DateTime, Utc};
use std::fmt;

/// Default sentinel demarcating the date mask.
pub const DEFAULT_SENTINEL: char = '#';

/// A compiled date template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTemplate {
    text: String,
    prefix: String,
    pattern: DatePattern,
    suffix: Option<String>,
}

impl DateTemplate {
    pub fn parse(template: &str) -> Result<Self, String> {
        Self::parse_with_sentinel(template, DEFAULT_SENTINEL)
    }

    pub fn parse_with_sentinel(template: &str, sentinel: char) -> Result<Self, String> {
        let parts: Vec<&str> = template.split(sentinel).collect();
        let (prefix, mask, suffix) = match parts.as_slice() {
            [prefix, mask] => (*prefix, *mask, None),
            [prefix, mask, suffix] => (*prefix, *mask, Some(suffix.to_string())),
            [_] => {
                return Err(format!(
                    "Date template '{}' has no '{}' marker",
                    template, sentinel
                ))
            }
            _ => {
                return Err(format!(
                    "Date template '{}' has more than two '{}' markers",
                    template, sentinel
                ))
            }
        };

        let pattern = DatePattern::compile(mask)?;
        Ok(Self {
            text: template.to_string(),
            prefix: prefix.to_string(),
            pattern,
            suffix,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn pattern(&self) -> &DatePattern {
        &self.pattern
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Walk the template and `text` in lock-step.
    ///
    /// The prefix must match verbatim, the masked region must parse as a date,
    /// and with two sentinels the rest of `text` must equal the suffix.
    pub fn extract(&self, text: &str) -> Option<DateTime<Utc>> {
        let rest = text.strip_prefix(self.prefix.as_str())?;
        let (date, consumed) = self.pattern.parse_prefix(rest)?;
        match &self.suffix {
            Some(suffix) if rest[consumed..] != *suffix => None,
            _ => Some(date),
        }
    }

    /// Find the template anywhere in `text`, trying the rightmost prefix first.
    pub fn find_in(&self, text: &str) -> Option<DateTime<Utc>> {
        for (idx, _) in text.rmatch_indices(self.prefix.as_str()) {
            let rest = &text[idx + self.prefix.len()..];
            let Some((date, consumed)) = self.pattern.parse_prefix(rest) else {
                continue;
            };
            match &self.suffix {
                Some(suffix) if !rest[consumed..].starts_with(suffix.as_str()) => continue,
                _ => return Some(date),
            }
        }
        None
    }
}

impl fmt::Display for DateTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Extract a date from `text` using a template string.
///
/// A malformed template or a mismatching text both yield `None`.
pub fn extract(template: &str, text: &str) -> Option<DateTime<Utc>> {
    DateTemplate::parse(template).ok()?.extract(text)
}

/// Derives a timestamp from a file handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DateExtractor {
    /// Always yields no date.
    #[default]
    None,
    /// Match the template against the file name.
    FromName(DateTemplate),
    /// Search the full path for the template.
    FromPath(DateTemplate),
}

impl DateExtractor {
    pub fn extract(&self, file: &FileHandle) -> Option<DateTime<Utc>> {
        let result = match self {
            DateExtractor::None => return None,
            DateExtractor::FromName(template) => template.extract(file.name()),
            DateExtractor::FromPath(template) => template.find_in(file.path()),
        };
        if result.is_none() {
            tracing::debug!(path = %file.path(), extractor = %self, "No date extracted");
        }
        result
    }

    pub fn has_date_extractor(&self) -> bool {
        !matches!(self, DateExtractor::None)
    }

    pub fn template(&self) -> Option<&DateTemplate> {
        match self {
            DateExtractor::None => None,
            DateExtractor::FromName(t) | DateExtractor::FromPath(t) => Some(t),
        }
    }
}

impl fmt::Display for DateExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateExtractor::None => f.write_str("none"),
            DateExtractor::FromName(t) => write!(f, "name:{}", t),
            DateExtractor::FromPath(t) => write!(f, "path:{}", t),
        }
    }
}
