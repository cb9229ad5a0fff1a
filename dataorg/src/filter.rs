use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{DataorgError, DataorgResult};
use crate::utils::lowercase_extension;

/// Decides which source files and folders are left out of a migration.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    file_types: HashSet<String>,
    patterns: Vec<Regex>,
}

impl ExclusionFilter {
    /// `file_types` are extensions without the dot (`srt`, `png`); `patterns`
    /// must match the whole path, case-insensitively.
    pub fn new<S: AsRef<str>>(file_types: &[S], patterns: &[S]) -> DataorgResult<Self> {
        let file_types = file_types
            .iter()
            .map(|t| t.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let patterns = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(compile_full_match)
            .collect::<DataorgResult<Vec<_>>>()?;

        Ok(Self {
            file_types,
            patterns,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.file_types.is_empty() && self.patterns.is_empty()
    }

    /// File check: excluded extension or a matching pattern.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.matches_file_type(path) || self.matches_pattern(path)
    }

    /// Directory check: only patterns apply, and a hit prunes the subtree.
    pub fn is_excluded_dir(&self, path: &Path) -> bool {
        self.matches_pattern(path)
    }

    fn matches_file_type(&self, path: &Path) -> bool {
        !self.file_types.is_empty() && self.file_types.contains(&lowercase_extension(path))
    }

    fn matches_pattern(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let text = path.to_string_lossy();
        self.patterns.iter().any(|p| p.is_match(&text))
    }
}

fn compile_full_match(pattern: &str) -> DataorgResult<Regex> {
    RegexBuilder::new(&format!("^(?:{})$", pattern))
        .case_insensitive(true)
        .build()
        .map_err(|e| DataorgError::InvalidRegexPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_exclusion() {
        let filter = ExclusionFilter::new(&["srt", ".PNG"], &[]).unwrap();
        assert!(filter.is_excluded(Path::new("/src/a/subs.SRT")));
        assert!(filter.is_excluded(Path::new("/src/a/cover.png")));
        assert!(!filter.is_excluded(Path::new("/src/a/movie.mov")));
        assert!(!filter.is_excluded(Path::new("/src/a/README")));
    }

    #[test]
    fn test_pattern_is_full_match_and_case_insensitive() {
        let filter = ExclusionFilter::new(&[], &[".*h264.mov"]).unwrap();
        assert!(filter.is_excluded(Path::new("/src/a/clip_H264.MOV")));
        assert!(!filter.is_excluded(Path::new("/src/a/clip_h264.mov.bak")));
    }

    #[test]
    fn test_directory_uses_patterns_only() {
        let filter = ExclusionFilter::new(&["tmp"], &[".*/proxies"]).unwrap();
        assert!(filter.is_excluded_dir(Path::new("/src/guid/Proxies")));
        assert!(!filter.is_excluded_dir(Path::new("/src/guid/cache.tmp")));
        assert!(!filter.is_excluded_dir(Path::new("/src/guid/proxies/inner")));
    }

    #[test]
    fn test_empty_filter() {
        let filter = ExclusionFilter::new::<&str>(&[], &[]).unwrap();
        assert!(filter.is_empty());
        assert!(!filter.is_excluded(Path::new("/anything.srt")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(ExclusionFilter::new(&[], &["(unclosed"]).is_err());
    }
}
