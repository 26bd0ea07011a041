//! rezip rewrites a third-party ZIP archive for redistribution:
//! it moves everything under a fixed root directory,
//! then applies a table of anchored text patches to the files inside.
//!
//! ```no_run
//! # use std::fs;
//! # use rezip::*;
//! let bytes = fs::read("novnc-v1.2.0.zip")?;
//! let table = PatchTable::builtin()?;
//! let (summary, rewritten) = rewrite_bytes(&bytes, &table, &RewriteOptions::new())?;
//! fs::write("noVNC.zip", rewritten)?;
//! println!("Applied {} patches", summary.applied);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Patches are deliberately dumb. Each one finds a literal anchor in its file,
//! then replaces the first bit of text after it that matches its end pattern.
//! (See the [`patch`] module for details.) There's no parsing of the files
//! being patched, so patches break when the files they target change upstream.
//! To catch that, every patch in the table must apply exactly once,
//! or the whole rewrite fails with [`ZipError::PatchCountMismatch`].
//!
//! The archive is read entirely into memory.
//! Users can either read the file into a buffer or, for larger archives,
//! memory-map it.
//!
//! [`patch`]: patch/index.html
//! [`ZipError::PatchCountMismatch`]: result/enum.ZipError.html#variant.PatchCountMismatch

pub mod archive;
pub mod banner;
pub mod patch;
pub mod read;
pub mod result;
pub mod rewrite;
pub mod root;
pub mod table;
pub mod write;

pub use archive::{Archive, Entry, EntryMetadata};
pub use format::DosDateTime;
pub use patch::{apply_patches, PatchSpec};
pub use read::{CompressionMethod, ZipArchive};
pub use result::{ZipError, ZipResult};
pub use rewrite::{rewrite, rewrite_bytes, RewriteOptions, RewriteSummary};
pub use table::PatchTable;
pub use write::ZipWriter;

mod arch;
mod format;
