// Project file enumeration for deployment packaging.

use crate::error::Result;
use crate::ignore::PathFilter;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Collect every file under the filter's root that the filter accepts.
///
/// Rejected directories are pruned rather than listed and dropped, so large
/// trees such as `node_modules` are never read. Results come back in
/// filesystem order. A missing or unreadable root is an error.
pub fn walk(filter: &PathFilter) -> Result<Vec<PathBuf>> {
    let root = filter.root();
    let mut files = Vec::new();

    let entries = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.file_type().is_dir() {
                filter.accepts_dir(entry.path())
            } else {
                filter.accepts(entry.path())
            }
        });

    for entry in entries {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    tracing::debug!(root = %root.display(), files = files.len(), "walked project");
    Ok(files)
}
