//! Error types and the related `Result<T>`

use camino::Utf8PathBuf;
use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The ZIP archive contained invalid data per the spec.
    #[error("Invalid Zip archive: {0}")]
    InvalidArchive(&'static str),

    /// Decoding a UTF-8 name or comment failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The ZIP archive uses a feature we can't read or write
    #[error("Unsupported Zip archive: {0}")]
    UnsupportedArchive(String),

    /// The ZIP archive is prepended some unknown bytes.
    /// (Use [`ZipArchive::with_prepended_data()`] if this is okay.)
    ///
    /// [`ZipArchive::with_prepended_data()`]: ../read/struct.ZipArchive.html#method.with_prepended_data
    #[error("Archive prepended with {0} unknown bytes")]
    PrependedWithUnknownBytes(usize),

    /// The archive's layout doesn't have the single top-level directory
    /// we expect of a release bundle.
    #[error("Archive contained a strange file hierarchy: {0}")]
    Hierarchy(String),

    /// No top-level directory entry was found, so no paths could be
    /// moved under the canonical root.
    #[error("No top-level directory entry to rewrite as {0}")]
    MissingRootDirectory(String),

    /// A file wasn't found at the provided path
    #[error("No file in the archive with the path {0}")]
    NoSuchFile(Utf8PathBuf),

    /// A patch specification couldn't be parsed.
    #[error("Invalid patch for {target}: {reason}")]
    InvalidPatch { target: String, reason: String },

    /// The number of patches applied across the archive didn't match
    /// the number declared.
    ///
    /// The patch table is out of sync with the archive's contents
    /// and the output must not be used.
    #[error("Applied {applied} patches, but {declared} were declared")]
    PatchCountMismatch { declared: usize, applied: usize },

    /// A cast from a 64-bit int to a usize failed while mapping the file,
    /// probably on a 32-bit system.
    #[error("Zip archive too large for address space")]
    InsufficientAddressSpace,
}
