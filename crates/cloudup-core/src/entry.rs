//! Selected upload entries.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identity of an entry within one [`PendingUpload`].
///
/// This is the entry's index, so two files sharing a name in different
/// folders are still tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub usize);

/// One file plus its relative path within a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEntry {
    /// Local file the bytes are streamed from.
    pub source: PathBuf,
    /// Forward-slash separated path relative to the selection root.
    pub relative_path: String,
    /// Size in bytes.
    pub size: u64,
}

impl UploadEntry {
    /// Create a new entry. `relative_path` is taken as already `/`-separated;
    /// other characters, backslashes included, belong to the segment names.
    pub fn new(source: impl Into<PathBuf>, relative_path: impl Into<String>, size: u64) -> Self {
        let relative_path = relative_path.into().trim_start_matches('/').to_string();
        Self {
            source: source.into(),
            relative_path,
            size,
        }
    }

    /// The final path segment.
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.relative_path)
    }

    /// Everything before the file name, or an empty string for flat entries.
    pub fn relative_dir(&self) -> &str {
        self.relative_path
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or("")
    }

    /// The implied top-level folder, if the path has more than one segment.
    pub fn top_level_folder(&self) -> Option<&str> {
        self.relative_path
            .split_once('/')
            .map(|(first, _)| first)
            .filter(|first| !first.is_empty())
    }

    /// Whether the path carries a directory component.
    pub fn is_nested(&self) -> bool {
        self.relative_path.contains('/')
    }
}

/// An ordered, immutable set of selected entries.
///
/// Re-selection replaces a pending upload entirely; nothing mutates it
/// after it is produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpload {
    entries: Vec<UploadEntry>,
}

impl PendingUpload {
    /// Create a pending upload from entries, preserving their order.
    pub fn new(entries: Vec<UploadEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[UploadEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entry sizes.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Entries paired with their identity.
    pub fn iter(&self) -> impl Iterator<Item = (FileId, &UploadEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (FileId(i), e))
    }
}

impl FromIterator<UploadEntry> for PendingUpload {
    fn from_iter<T: IntoIterator<Item = UploadEntry>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
