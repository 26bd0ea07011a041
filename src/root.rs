//! Moving an archive's contents under a canonical root directory.
//!
//! Release bundles (GitHub's zipballs, for one) put everything in a single
//! top-level directory named after the project and version,
//! like `novnc-noVNC-33e1462/`. We rename it so that paths inside the
//! archive don't change from release to release.

use log::*;

use crate::archive::Entry;
use crate::result::*;

/// Returns true for a directory entry directly under the archive root,
/// like `foo/`.
fn is_top_level_directory(path: &str) -> bool {
    path.ends_with('/') && path.matches('/').count() == 1
}

/// Finds the archive's top-level directory, e.g. `novnc-noVNC-33e1462/`.
///
/// Returns `None` if there's no directory entry for it
/// (ZIP archives needn't have entries for directories),
/// and an error if there are several.
pub fn find_parent(entries: &[Entry]) -> ZipResult<Option<&str>> {
    let mut candidates = entries
        .iter()
        .map(|e| e.path.as_str())
        .filter(|p| is_top_level_directory(p));

    let parent = candidates.next();
    if let Some(other) = candidates.next() {
        return Err(ZipError::Hierarchy(format!(
            "Several top-level directories: {} and {other}",
            parent.unwrap_or_default(),
        )));
    }
    Ok(parent)
}

/// Replaces the first occurrence of `parent` in `path` with `root`.
///
/// An empty `parent` leaves every path alone.
pub fn rewrite_path(path: &str, parent: &str, root: &str) -> String {
    if parent.is_empty() {
        return path.to_owned();
    }
    path.replacen(parent, root, 1)
}

/// Moves every entry from the archive's top-level directory to `root`.
///
/// If there's no top-level directory, paths are left as-is
/// and this returns `false`.
pub fn rewrite_paths(entries: &mut [Entry], root: &str) -> ZipResult<bool> {
    let parent = match find_parent(entries)? {
        Some(p) => p.to_owned(),
        None => {
            warn!("No top-level directory entry; leaving paths alone");
            return Ok(false);
        }
    };
    info!("Moving {parent} to {root}");

    for entry in entries.iter_mut() {
        let rewritten = rewrite_path(&entry.path, &parent, root);
        trace!("{} -> {}", entry.path, rewritten);
        entry.path = rewritten;
    }
    Ok(true)
}
