//! Collection specification parsing.
//!
//! A collection spec is a path with an optional wildcard tail:
//!
//! ```text
//! /data/radar/**/KFTG_#yyyyMMdd_HHmm#.nc   recurse, filter, date template
//! /data/model/gfs_.*\.grib2$               top level only, regex filter
//! /data/model/gfs_#yyyyMMdd                one sentinel: prefix filter
//! /data/model/file.nc                      no wildcard: everything under /data/model
//! catalog:https://host/thredds/catalog.xml remote crawl
//! ```
//!
//! Parsing never fails. Problems (a missing root, a filter that will not
//! compile) go to the [`Diagnostics`] sink and the collection behaves as
//! present-but-empty until the spec is corrected.

use crate::date::{DateExtractor, DateTemplate, DEFAULT_SENTINEL};
use crate::duration::TimeDuration;
use crate::error::Diagnostics;
use crate::filter::FileFilter;
use crate::types::AuxInfo;
use std::fmt;
use std::path::Path;

/// Prefix marking a remote catalog crawl instead of a directory walk.
pub const CATALOG_PREFIX: &str = "catalog:";

/// Characters that turn a path segment into a wildcard segment.
const WILDCARD_CHARS: &[char] = &[
    '*', '?', '[', ']', '^', '$', '#', '\\', '(', ')', '|', '+', '{', '}',
];

/// Expand a leading `~` to the home directory.
pub fn expand_home(spec: &str) -> String {
    if spec == "~" || spec.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.to_string_lossy().trim_end_matches('/'), &spec[1..]);
        }
    }
    spec.to_string()
}

fn is_wildcard_segment(segment: &str) -> bool {
    segment.contains(WILDCARD_CHARS)
}

/// A parsed, immutable collection specification.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    spec: String,
    root_dir: String,
    recurse: bool,
    filter_text: Option<String>,
    filter: Option<FileFilter>,
    date_template: Option<DateTemplate>,
    older_than: Option<TimeDuration>,
    catalog: bool,
}

impl CollectionSpec {
    /// Parse a spec with the default `#` sentinel.
    pub fn parse(spec: &str, diagnostics: &mut Diagnostics) -> Self {
        Self::parse_with_sentinel(spec, DEFAULT_SENTINEL, diagnostics)
    }

    pub fn parse_with_sentinel(spec: &str, sentinel: char, diagnostics: &mut Diagnostics) -> Self {
        let spec = spec.trim();

        if let Some(url) = spec.strip_prefix(CATALOG_PREFIX) {
            return Self {
                spec: spec.to_string(),
                root_dir: url.trim().to_string(),
                recurse: true,
                filter_text: None,
                filter: None,
                date_template: None,
                older_than: None,
                catalog: true,
            };
        }

        let expanded = expand_home(spec);
        let segments: Vec<&str> = expanded.split('/').collect();
        let first_wildcard = segments.iter().position(|s| is_wildcard_segment(s));

        let (root_segments, recurse, filter_text) = match first_wildcard {
            Some(idx) if segments[idx] == "**" => {
                (&segments[..idx], true, segments[idx + 1..].join("/"))
            }
            Some(idx) => (&segments[..idx], false, segments[idx..].join("/")),
            None => (&segments[..segments.len().saturating_sub(1)], false, String::new()),
        };

        let root_dir = match root_segments.join("/") {
            root if root.is_empty() && expanded.starts_with('/') => "/".to_string(),
            root if root.is_empty() => ".".to_string(),
            root => root,
        };

        if !Path::new(&root_dir).exists() {
            diagnostics.warn(format!("Directory {} does not exist", root_dir));
        }

        let mut parsed = Self {
            spec: spec.to_string(),
            root_dir,
            recurse,
            filter_text: None,
            filter: None,
            date_template: None,
            older_than: None,
            catalog: false,
        };

        if !filter_text.is_empty() {
            parsed.apply_filter_text(&filter_text, sentinel, diagnostics);
        }
        parsed
    }

    /// Build a spec from a root directory and a separate name regex.
    pub fn from_parts(root_dir: &str, regex: Option<&str>, diagnostics: &mut Diagnostics) -> Self {
        let root_dir = expand_home(root_dir.trim()).trim_end_matches('/').to_string();
        if !Path::new(&root_dir).exists() {
            diagnostics.warn(format!("Directory {} does not exist", root_dir));
        }
        let spec = match regex {
            Some(re) => format!("{}/{}", root_dir, re),
            None => root_dir.clone(),
        };

        let filter = regex.map(|re| match FileFilter::name_regex(re) {
            Ok(filter) => filter,
            Err(e) => {
                diagnostics.error(format!("Invalid filter '{}': {}", re, e));
                FileFilter::MatchNothing
            }
        });

        Self {
            spec,
            root_dir,
            recurse: false,
            filter_text: regex.map(str::to_string),
            filter,
            date_template: None,
            older_than: None,
            catalog: false,
        }
    }

    fn apply_filter_text(&mut self, text: &str, sentinel: char, diagnostics: &mut Diagnostics) {
        self.filter_text = Some(text.to_string());
        let marks: Vec<usize> = text.match_indices(sentinel).map(|(i, _)| i).collect();

        let (regex_text, glob_text) = match marks.as_slice() {
            [] => (text.to_string(), text.to_string()),
            [first] => {
                let prefix = &text[..*first];
                self.set_template(text, sentinel, diagnostics);
                (format!("{}.*", prefix), format!("{}*", prefix))
            }
            [first, second] => {
                let prefix = &text[..*first];
                let mask = &text[first + sentinel.len_utf8()..*second];
                let suffix = &text[second + sentinel.len_utf8()..];
                self.set_template(text, sentinel, diagnostics);
                // quotes in the mask do not appear in file names
                let width = self
                    .date_template
                    .as_ref()
                    .map_or_else(|| mask.chars().count(), |t| t.pattern().width());
                (
                    format!("{}.{{{}}}{}", prefix, width, suffix),
                    format!("{}{}{}", prefix, "?".repeat(width), suffix),
                )
            }
            _ => {
                diagnostics.error(format!(
                    "Filter '{}' has more than two '{}' date markers",
                    text, sentinel
                ));
                self.filter = Some(FileFilter::MatchNothing);
                return;
            }
        };

        // Filters are regular expressions; plain globs are accepted when the
        // text is not a valid regex (e.g. "*.nc").
        let filter = FileFilter::name_regex(&regex_text)
            .or_else(|_| FileFilter::name_wildcard(&glob_text));
        self.filter = Some(match filter {
            Ok(filter) => filter,
            Err(e) => {
                diagnostics.error(format!("Invalid filter '{}': {}", text, e));
                FileFilter::MatchNothing
            }
        });
    }

    fn set_template(&mut self, text: &str, sentinel: char, diagnostics: &mut Diagnostics) {
        match DateTemplate::parse_with_sentinel(text, sentinel) {
            Ok(template) => self.date_template = Some(template),
            Err(e) => diagnostics.error(format!("Invalid date template '{}': {}", text, e)),
        }
    }

    /// Attach an age cutoff; newer files are not indexed yet.
    pub fn with_older_than(mut self, older_than: Option<TimeDuration>) -> Self {
        self.older_than = older_than;
        self
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }

    pub fn recurse(&self) -> bool {
        self.recurse
    }

    pub fn filter_text(&self) -> Option<&str> {
        self.filter_text.as_deref()
    }

    pub fn filter(&self) -> Option<&FileFilter> {
        self.filter.as_ref()
    }

    pub fn date_template(&self) -> Option<&DateTemplate> {
        self.date_template.as_ref()
    }

    pub fn older_than(&self) -> Option<&TimeDuration> {
        self.older_than.as_ref()
    }

    pub fn is_catalog(&self) -> bool {
        self.catalog
    }

    /// The date extractor implied by the spec's own template.
    pub fn date_extractor(&self) -> DateExtractor {
        match &self.date_template {
            Some(template) => DateExtractor::FromName(template.clone()),
            None => DateExtractor::None,
        }
    }

    /// The directory scan described by this spec.
    pub fn scan_target(&self, name: &str) -> ScanTarget {
        ScanTarget {
            name: name.to_string(),
            root_dir: self.root_dir.clone(),
            recurse: self.recurse,
            filter: self.filter.clone(),
            aux_info: None,
        }
    }
}

impl fmt::Display for CollectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

/// One directory (or catalog) scan feeding an inventory.
#[derive(Clone)]
pub struct ScanTarget {
    pub name: String,
    pub root_dir: String,
    pub recurse: bool,
    pub filter: Option<FileFilter>,
    /// Attached to every file this scan finds.
    pub aux_info: Option<AuxInfo>,
}

impl ScanTarget {
    pub fn new(root_dir: impl Into<String>, recurse: bool, filter: Option<FileFilter>) -> Self {
        let root_dir = root_dir.into();
        Self {
            name: root_dir.clone(),
            root_dir,
            recurse,
            filter,
            aux_info: None,
        }
    }
}

impl fmt::Debug for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanTarget")
            .field("name", &self.name)
            .field("root_dir", &self.root_dir)
            .field("recurse", &self.recurse)
            .field("filter", &self.filter.as_ref().map(|f| f.describe()))
            .field("has_aux_info", &self.aux_info.is_some())
            .finish()
    }
}
