use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DataorgError, DataorgResult};
use crate::row::Row;

const SEGMENT_SEPARATOR: &str = "->";
const KEY_SEPARATOR: char = ';';

/// Strips forbidden characters from folder and file names.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    pattern: Option<Regex>,
}

impl Sanitizer {
    pub fn new(pattern: &str) -> DataorgResult<Self> {
        if pattern.is_empty() {
            return Ok(Self::disabled());
        }

        let regex = Regex::new(pattern).map_err(|e| DataorgError::InvalidRegexPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            pattern: Some(regex),
        })
    }

    pub fn disabled() -> Self {
        Self { pattern: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.pattern.is_some()
    }

    pub fn apply(&self, value: &str) -> String {
        match &self.pattern {
            Some(pattern) => pattern.replace_all(value, "").into_owned(),
            None => value.to_string(),
        }
    }

    /// Sanitized file name, or the original one when nothing would be left.
    pub fn file_name(&self, name: &str) -> String {
        let cleaned = self.apply(name);
        if cleaned.trim().is_empty() {
            debug!("Sanitizing '{}' leaves an empty name, keeping it", name);
            name.to_string()
        } else {
            cleaned
        }
    }
}

/// Ordered segment list mapping row columns to directory names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Vec<String>>,
}

impl PathTemplate {
    /// Parse `Decade->Series Title->Episode Number;Episode Title`.
    pub fn parse(spec: &str) -> Self {
        let segments = spec
            .split(SEGMENT_SEPARATOR)
            .map(|segment| {
                segment
                    .split(KEY_SEPARATOR)
                    .map(|key| key.trim().to_string())
                    .filter(|key| !key.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|keys| !keys.is_empty())
            .collect();

        Self { segments }
    }

    pub fn segments(&self) -> &[Vec<String>] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Outcome of resolving a row against a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(PathBuf),
    /// A required key was missing; the row goes to the quarantine directory.
    Quarantined { missing_key: String },
}

impl Resolution {
    pub fn is_quarantined(&self) -> bool {
        matches!(self, Resolution::Quarantined { .. })
    }

    /// Directory the row's files are copied into.
    pub fn target_dir<'a>(&'a self, quarantine_dir: &'a Path) -> &'a Path {
        match self {
            Resolution::Resolved(path) => path,
            Resolution::Quarantined { .. } => quarantine_dir,
        }
    }
}

/// Build the target directory for `row` under `base_dir`.
pub fn resolve(
    template: &PathTemplate,
    optional_keys: &HashSet<String>,
    row: &Row,
    base_dir: &Path,
    sanitizer: &Sanitizer,
) -> Resolution {
    let mut target = base_dir.to_path_buf();

    for keys in template.segments() {
        let mut parts: Vec<String> = Vec::with_capacity(keys.len());

        for key in keys {
            let Some(value) = row.get(key) else {
                if optional_keys.contains(key) {
                    continue;
                }
                return Resolution::Quarantined {
                    missing_key: key.clone(),
                };
            };

            let value = component_safe(&sanitizer.apply(value));
            if !value.is_empty() {
                parts.push(value);
            }
        }

        if !parts.is_empty() {
            target.push(parts.join(" "));
        }
    }

    Resolution::Resolved(target)
}

// Values must stay a single, non-traversing path component.
fn component_safe(value: &str) -> String {
    let value = value.replace(['/', '\\'], "-");
    let value = value.trim();
    if value == "." || value == ".." {
        return String::new();
    }
    value.to_string()
}
