//! File name ignore patterns.

use globset::{Glob, GlobSet, GlobSetBuilder};

use cloudup_core::ScanError;

/// Matches file names against a set of glob patterns.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    set: GlobSet,
    empty: bool,
}

impl IgnoreFilter {
    /// Compile the given patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| ScanError::InvalidPattern {
            pattern: String::new(),
            message: e.to_string(),
        })?;

        Ok(Self {
            set,
            empty: patterns.is_empty(),
        })
    }

    /// A filter that ignores nothing.
    pub fn none() -> Self {
        Self {
            set: GlobSet::empty(),
            empty: true,
        }
    }

    /// Whether a file or directory with this name should be skipped.
    pub fn is_ignored(&self, name: &str) -> bool {
        !self.empty && self.set.is_match(name)
    }
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        Self::none()
    }
}
