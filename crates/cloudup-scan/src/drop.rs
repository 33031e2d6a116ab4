//! Drag-and-drop traversal over paginated directory reads.
//!
//! Some directory primitives cap how many entries a single read returns, so
//! a directory is only fully listed once a read comes back empty. The
//! traversal here never assumes one read is complete.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use cloudup_core::{PendingUpload, ScanError, ScanWarning, UploadEntry};

use crate::filter::IgnoreFilter;

/// One item of a drop payload or of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropEntry {
    /// A regular file.
    File { path: PathBuf, name: String },
    /// A directory to expand.
    Directory { path: PathBuf, name: String },
}

impl DropEntry {
    /// Classify a local path, following symlinks.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ScanError> {
        let path = path.into();
        let metadata = fs::metadata(&path).map_err(|e| ScanError::io(&path, e))?;
        let name = entry_name(&path);

        if metadata.is_dir() {
            Ok(Self::Directory { path, name })
        } else {
            Ok(Self::File { path, name })
        }
    }

    /// The entry's own name.
    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } | Self::Directory { name, .. } => name,
        }
    }

    /// The entry's location.
    pub fn path(&self) -> &Path {
        match self {
            Self::File { path, .. } | Self::Directory { path, .. } => path,
        }
    }
}

/// A directory listing that yields its children one page at a time.
pub trait EntryReader {
    /// Read the next page. An empty page means the listing is exhausted.
    fn read_entries(&mut self) -> Result<Vec<DropEntry>, ScanError>;
}

/// Opens directories and resolves files for a traversal.
pub trait DirectoryOpener {
    type Reader: EntryReader;

    /// Start listing a directory.
    fn open(&self, dir: &Path) -> Result<Self::Reader, ScanError>;

    /// Resolve a file entry to its size in bytes.
    fn file_size(&self, file: &Path) -> Result<u64, ScanError>;
}

/// Local filesystem opener with a fixed page size.
#[derive(Debug, Clone, Copy)]
pub struct FsOpener {
    page_size: usize,
}

impl FsOpener {
    /// Create an opener whose reads return at most `page_size` entries.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }
}

impl Default for FsOpener {
    fn default() -> Self {
        Self::new(100)
    }
}

impl DirectoryOpener for FsOpener {
    type Reader = FsEntryReader;

    fn open(&self, dir: &Path) -> Result<Self::Reader, ScanError> {
        let iter = fs::read_dir(dir).map_err(|e| ScanError::io(dir, e))?;
        Ok(FsEntryReader {
            dir: dir.to_path_buf(),
            iter,
            page_size: self.page_size,
            deferred: None,
        })
    }

    fn file_size(&self, file: &Path) -> Result<u64, ScanError> {
        fs::metadata(file)
            .map(|m| m.len())
            .map_err(|e| ScanError::io(file, e))
    }
}

/// Paginated reader over [`fs::read_dir`].
#[derive(Debug)]
pub struct FsEntryReader {
    dir: PathBuf,
    iter: fs::ReadDir,
    page_size: usize,
    deferred: Option<ScanError>,
}

impl EntryReader for FsEntryReader {
    fn read_entries(&mut self) -> Result<Vec<DropEntry>, ScanError> {
        let dir = &self.dir;
        let mut items = self.iter.by_ref().map(|item| classify(dir, item));
        fill_page(&mut items, self.page_size, &mut self.deferred)
    }
}

/// Turn one `read_dir` item into a listing entry, or `None` when it is skipped.
fn classify(dir: &Path, item: io::Result<fs::DirEntry>) -> Result<Option<DropEntry>, ScanError> {
    let item = item.map_err(|e| ScanError::io(dir, e))?;
    let path = item.path();
    let name = item.file_name().to_string_lossy().into_owned();

    let file_type = match item.file_type() {
        Ok(t) => t,
        Err(err) => {
            tracing::warn!(path = %path.display(), "skipping entry: {err}");
            return Ok(None);
        }
    };

    if file_type.is_dir() {
        Ok(Some(DropEntry::Directory { path, name }))
    } else if file_type.is_symlink() {
        // Linked directories are not followed.
        match fs::metadata(&path) {
            Ok(m) if m.is_file() => Ok(Some(DropEntry::File { path, name })),
            Ok(_) => {
                tracing::debug!(path = %path.display(), "not following directory link");
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), "broken link: {err}");
                Ok(None)
            }
        }
    } else if file_type.is_file() {
        Ok(Some(DropEntry::File { path, name }))
    } else {
        Ok(None)
    }
}

/// Collect up to `page_size` entries from `items`.
///
/// An error hit after part of the page was read is parked in `deferred` and
/// returned by the next call, so the entries before it still come back.
fn fill_page<I>(
    items: &mut I,
    page_size: usize,
    deferred: &mut Option<ScanError>,
) -> Result<Vec<DropEntry>, ScanError>
where
    I: Iterator<Item = Result<Option<DropEntry>, ScanError>>,
{
    if let Some(err) = deferred.take() {
        return Err(err);
    }

    let mut page = Vec::with_capacity(page_size);
    while page.len() < page_size {
        match items.next() {
            None => break,
            Some(Ok(Some(entry))) => page.push(entry),
            Some(Ok(None)) => {}
            Some(Err(err)) if page.is_empty() => return Err(err),
            Some(Err(err)) => {
                *deferred = Some(err);
                break;
            }
        }
    }

    Ok(page)
}

/// Result of a drop traversal.
#[derive(Debug, Clone, Default)]
pub struct DropScan {
    /// Files found, tagged with their relative paths.
    pub selection: PendingUpload,
    /// Directories or files that could not be read.
    pub warnings: Vec<ScanWarning>,
    /// Zero-byte files dropped from the selection.
    pub skipped_empty: usize,
}

/// Expands a drop payload into a flat selection.
#[derive(Debug, Clone, Default)]
pub struct DropScanner<O> {
    opener: O,
    filter: IgnoreFilter,
}

impl<O: DirectoryOpener> DropScanner<O> {
    /// Create a scanner over the given opener.
    pub fn new(opener: O) -> Self {
        Self {
            opener,
            filter: IgnoreFilter::none(),
        }
    }

    /// Skip names matching the filter.
    pub fn with_filter(mut self, filter: IgnoreFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Expand every root entry, preserving payload order.
    pub fn scan(&self, roots: &[DropEntry]) -> DropScan {
        let mut entries = Vec::new();
        let mut scan = DropScan::default();

        for root in roots {
            self.scan_entry(root, "", &mut entries, &mut scan);
        }

        scan.selection = PendingUpload::new(entries);
        tracing::debug!(
            files = scan.selection.len(),
            warnings = scan.warnings.len(),
            skipped_empty = scan.skipped_empty,
            "drop traversal finished"
        );
        scan
    }

    fn scan_entry(
        &self,
        entry: &DropEntry,
        prefix: &str,
        out: &mut Vec<UploadEntry>,
        scan: &mut DropScan,
    ) {
        if self.filter.is_ignored(entry.name()) {
            return;
        }

        match entry {
            DropEntry::File { path, name } => {
                let size = match self.opener.file_size(path) {
                    Ok(size) => size,
                    Err(err) => {
                        scan.warnings.push(ScanWarning::from_error(&err));
                        return;
                    }
                };

                // Zero-byte files are never uploaded from a drop.
                if size == 0 {
                    scan.skipped_empty += 1;
                    return;
                }

                out.push(UploadEntry::new(path.clone(), format!("{prefix}{name}"), size));
            }
            DropEntry::Directory { path, name } => {
                let children = match self.read_all(path) {
                    Ok(children) => children,
                    Err((children, err)) => {
                        tracing::warn!(path = %path.display(), "incomplete directory listing: {err}");
                        scan.warnings.push(ScanWarning::from_error(&err));
                        children
                    }
                };

                let child_prefix = format!("{prefix}{name}/");
                for child in &children {
                    self.scan_entry(child, &child_prefix, out, scan);
                }
            }
        }
    }

    /// Read pages until one comes back empty. On failure, returns whatever
    /// was read before the error alongside it.
    fn read_all(&self, dir: &Path) -> Result<Vec<DropEntry>, (Vec<DropEntry>, ScanError)> {
        let mut reader = self.opener.open(dir).map_err(|e| (Vec::new(), e))?;
        let mut entries = Vec::new();

        loop {
            match reader.read_entries() {
                Ok(page) if page.is_empty() => return Ok(entries),
                Ok(page) => entries.extend(page),
                Err(err) => return Err((entries, err)),
            }
        }
    }
}

impl DropScanner<FsOpener> {
    /// Classify local paths as a drop payload and expand them.
    ///
    /// A root that does not exist fails the whole scan; anything unreadable
    /// below a root is recorded as a warning.
    pub fn scan_paths(&self, paths: &[PathBuf]) -> Result<DropScan, ScanError> {
        let roots = paths
            .iter()
            .map(|p| DropEntry::from_path(p.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.scan(&roots))
    }
}

/// The name a selected path is known by.
///
/// A path that does not end in a plain name (`.`, `..`, `a/..`) is resolved
/// first, so it is named after the directory it points at. Links are only
/// resolved in that case; a picked link keeps its own name.
pub(crate) fn entry_name(path: &Path) -> String {
    let resolved;
    let named = match path.components().next_back() {
        Some(Component::Normal(_)) => path,
        _ => match fs::canonicalize(path) {
            Ok(canonical) => {
                resolved = canonical;
                resolved.as_path()
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), "cannot resolve root name: {err}");
                path
            }
        },
    };

    named
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| named.to_string_lossy().into_owned())
}
