//! Rewriting an archive: moving it under a new root and patching its files.

use std::collections::HashSet;
use std::io::{self, Write};

use chrono::{Local, NaiveDateTime};
use log::*;

use crate::archive::Archive;
use crate::format::DosDateTime;
use crate::patch::apply_patches;
use crate::result::*;
use crate::root;
use crate::table::PatchTable;
use crate::write::ZipWriter;

/// The directory everything is moved into unless told otherwise
pub const DEFAULT_ROOT: &str = "noVNC/";

/// Knobs for [`rewrite()`]
#[derive(Debug, Clone)]
pub struct RewriteOptions {
    root: String,
    modified: NaiveDateTime,
    require_root: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            root: String::from(DEFAULT_ROOT),
            modified: Local::now().naive_local(),
            require_root: true,
        }
    }
}

impl RewriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory to move the archive's contents into.
    /// A trailing `/` is added if it's missing.
    pub fn root<S: Into<String>>(mut self, root: S) -> Self {
        let mut root = root.into();
        if !root.ends_with('/') {
            root.push('/');
        }
        self.root = root;
        self
    }

    /// Sets the modification time given to patched files.
    /// Defaults to when the options were made.
    pub fn modified(mut self, modified: NaiveDateTime) -> Self {
        self.modified = modified;
        self
    }

    /// If true (the default), an archive without a top-level directory entry
    /// is an error. Otherwise its paths are left alone.
    pub fn require_root(mut self, require_root: bool) -> Self {
        self.require_root = require_root;
        self
    }

    pub fn root_dir(&self) -> &str {
        &self.root
    }
}

/// What a successful rewrite did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RewriteSummary {
    /// Entries written to the new archive
    pub entries: usize,
    /// Entries changed by at least one patch
    pub patched_entries: usize,
    /// Patches applied, across all entries
    pub applied: usize,
    /// Patches in the table
    pub declared: usize,
}

/// Moves the archive's contents under the new root, patches them,
/// and writes the result to `out`.
///
/// Every patch in `table` must be applied exactly once across the whole archive.
/// If not, the patches are out of date with the archive and this returns
/// [`ZipError::PatchCountMismatch`]. The archive is still finished, so that
/// `out` isn't left mid-entry, but the caller must throw it away.
pub fn rewrite<W: Write>(
    mut archive: Archive,
    table: &PatchTable,
    options: &RewriteOptions,
    out: W,
) -> ZipResult<(RewriteSummary, W)> {
    if !root::rewrite_paths(&mut archive.entries, &options.root)? && options.require_root {
        return Err(ZipError::MissingRootDirectory(options.root.clone()));
    }

    let modified = DosDateTime::from_naive(options.modified);
    let mut summary = RewriteSummary {
        declared: table.declared(),
        ..RewriteSummary::default()
    };
    let mut seen_paths = HashSet::new();
    let mut writer = ZipWriter::new(out);

    for mut entry in archive.entries {
        let (content, applied) = apply_patches(&entry.path, entry.content, &table.specs);
        entry.content = content;
        if applied > 0 {
            entry.metadata.last_modified = modified;
            summary.patched_entries += 1;
            summary.applied += applied;
            info!("Applied {applied} patch(es) to {}", entry.path);
        }

        writer.write_entry(&entry)?;
        summary.entries += 1;
        seen_paths.insert(entry.path);
    }
    let out = writer.finish()?;

    if summary.applied != summary.declared {
        for spec in &table.specs {
            if !seen_paths.contains(spec.target()) {
                warn!("No file at {} to patch", spec.target());
            }
        }
        return Err(ZipError::PatchCountMismatch {
            declared: summary.declared,
            applied: summary.applied,
        });
    }

    info!(
        "Rewrote {} entries under {}, applying {} patch(es) to {}",
        summary.entries, options.root, summary.applied, summary.patched_entries
    );
    Ok((summary, out))
}

/// Rewrites the ZIP archive in `input`, returning the new one.
pub fn rewrite_bytes(
    input: &[u8],
    table: &PatchTable,
    options: &RewriteOptions,
) -> ZipResult<(RewriteSummary, Vec<u8>)> {
    let archive = Archive::parse(input)?;
    let (summary, out) = rewrite(archive, table, options, io::Cursor::new(Vec::new()))?;
    Ok((summary, out.into_inner()))
}
