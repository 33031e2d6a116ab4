//! Selection and traversal for cloudup.
//!
//! Every input mode produces the same thing: a flat [`PendingUpload`] of
//! files tagged with their forward-slash relative paths.
//!
//! - [`pick_files`] mirrors a multi-file picker: each file is flat.
//! - [`pick_folder`] mirrors a folder picker: every file carries
//!   `<folder>/<path inside folder>`.
//! - [`DropScanner`] mirrors a drag-and-drop payload of mixed files and
//!   directories, expanded through a paginated [`EntryReader`].
//!
//! # Example
//!
//! ```rust,no_run
//! use cloudup_scan::{DropScanner, FsOpener};
//!
//! let scanner = DropScanner::new(FsOpener::new(100));
//! let scan = scanner.scan_paths(&["./photos".into(), "./notes.txt".into()]).unwrap();
//!
//! for entry in scan.selection.entries() {
//!     println!("{} ({} bytes)", entry.relative_path, entry.size);
//! }
//! ```

mod drop;
mod filter;
mod picker;

pub use drop::{DirectoryOpener, DropEntry, DropScan, DropScanner, EntryReader, FsEntryReader, FsOpener};
pub use filter::IgnoreFilter;
pub use picker::{pick_files, pick_folder};

// Re-export core types for convenience
pub use cloudup_core::{PendingUpload, ScanError, ScanWarning, UploadEntry, WarningKind};
