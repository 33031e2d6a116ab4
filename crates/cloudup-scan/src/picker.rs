//! File and folder picker selections.

use std::fs;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;

use cloudup_core::{PendingUpload, ScanError, UploadEntry};

use crate::drop::entry_name;
use crate::filter::IgnoreFilter;

/// Build a flat selection from individually picked files.
///
/// Every entry's relative path is just its file name, so no folder
/// conflict is implied unless a single `.zip` is picked.
pub fn pick_files(paths: &[PathBuf]) -> Result<PendingUpload, ScanError> {
    paths
        .iter()
        .map(|path| {
            let metadata = fs::metadata(path).map_err(|e| ScanError::io(path, e))?;
            if metadata.is_dir() {
                return Err(ScanError::NotAFile { path: path.clone() });
            }
            Ok(UploadEntry::new(path.clone(), entry_name(path), metadata.len()))
        })
        .collect()
}

/// Build a selection from a picked folder.
///
/// Each file is tagged `<folder name>/<path inside the folder>`, the way a
/// native folder picker reports relative paths. Entries are sorted by path.
pub fn pick_folder(root: &Path, filter: &IgnoreFilter) -> Result<PendingUpload, ScanError> {
    let metadata = fs::metadata(root).map_err(|e| ScanError::io(root, e))?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let root_name = entry_name(root);
    let filter = filter.clone();
    let walker = WalkDir::new(root)
        .sort(true)
        .follow_links(false)
        .skip_hidden(false)
        .process_read_dir(move |_depth, _path, _state, children| {
            children.retain(|child| match child {
                Ok(entry) => !filter.is_ignored(&entry.file_name().to_string_lossy()),
                Err(_) => true,
            });
        });

    let mut entries = Vec::new();
    for item in walker {
        let entry = item.map_err(|err| {
            let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            let message = err.to_string();
            ScanError::io(
                path,
                err.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other(message)),
            )
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let size = entry
            .metadata()
            .map(|m| m.len())
            .map_err(|e| ScanError::io(&path, std::io::Error::other(e.to_string())))?;

        let inner = path.strip_prefix(root).unwrap_or(&path);
        let relative = std::iter::once(root_name.clone())
            .chain(inner.components().map(|c| c.as_os_str().to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join("/");

        entries.push(UploadEntry::new(path.clone(), relative, size));
    }

    tracing::debug!(root = %root.display(), files = entries.len(), "folder selection built");
    Ok(PendingUpload::new(entries))
}
