//! Destination folder conflict detection.

use cloudup_core::{ConflictDecision, PendingUpload};

use crate::transport::StorageBackend;

/// Derive the top-level folder a selection would create.
///
/// - The first segment of the first nested relative path, if any entry is nested.
/// - Otherwise, for a lone `.zip` (any case), the name without the suffix.
/// - Otherwise nothing: a flat upload is never checked.
pub fn candidate_folder_name(selection: &PendingUpload) -> Option<String> {
    if let Some(folder) = selection
        .entries()
        .iter()
        .find_map(|entry| entry.top_level_folder())
    {
        return Some(folder.to_string());
    }

    match selection.entries() {
        [only] => {
            let name = only.file_name();
            let split = name.len().checked_sub(4)?;
            let (stem, suffix) = (name.get(..split)?, name.get(split..)?);
            (suffix.eq_ignore_ascii_case(".zip") && !stem.is_empty()).then(|| stem.to_string())
        }
        _ => None,
    }
}

/// Ask the backend whether `name` exists under `destination`.
///
/// A failed check is logged and counts as no collision.
pub async fn folder_collides<B: StorageBackend>(
    backend: &B,
    name: &str,
    destination: &str,
) -> bool {
    match backend.folder_exists(name, destination).await {
        Ok(exists) => exists,
        Err(err) => {
            tracing::warn!(
                folder = name,
                destination,
                "folder existence check failed, assuming no conflict: {err}"
            );
            false
        }
    }
}

/// Check a selection against the destination before any transfer starts.
pub async fn detect_conflict<B: StorageBackend>(
    backend: &B,
    selection: &PendingUpload,
    destination: &str,
) -> Option<ConflictDecision> {
    let candidate = candidate_folder_name(selection)?;
    if folder_collides(backend, &candidate, destination).await {
        tracing::info!(folder = %candidate, destination, "destination folder already exists");
        Some(ConflictDecision::new(candidate))
    } else {
        None
    }
}

/// Validate a replacement folder name.
pub fn validate_folder_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Please enter a folder name".into());
    }

    if name.len() > 255 {
        return Err("Name is too long (max 255 characters)".into());
    }

    for c in ['/', '\\', '\0'] {
        if name.contains(c) {
            return Err(format!("Name cannot contain '{}'", c.escape_default()));
        }
    }

    if name == "." || name == ".." {
        return Err("'.' and '..' are reserved names".into());
    }

    Ok(())
}
