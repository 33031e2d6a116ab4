//! Folder-name conflict decisions.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// How a destination folder collision is resolved.
///
/// The wire form (`merge`, `replace`, `rename`) is what the backend expects
/// in the `conflictAction` form field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConflictAction {
    /// Fold the new content into the existing folder.
    Merge,
    /// Delete the existing folder's contents, then upload.
    Replace,
    /// Upload under a different top-level folder name.
    Rename,
}

impl ConflictAction {
    /// The lowercase wire form.
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }
}

/// A pending decision about an existing folder at the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDecision {
    /// The colliding folder name.
    pub folder_name: String,
    /// The chosen action, `None` while the user has not picked one.
    pub action: Option<ConflictAction>,
    /// Replacement folder name for a rename.
    pub rename_to: Option<String>,
}

impl ConflictDecision {
    /// A fresh, unresolved decision.
    pub fn new(folder_name: impl Into<String>) -> Self {
        Self {
            folder_name: folder_name.into(),
            action: None,
            rename_to: None,
        }
    }

    /// Whether the user is at the rename prompt.
    pub fn is_renaming(&self) -> bool {
        self.action == Some(ConflictAction::Rename)
    }
}
